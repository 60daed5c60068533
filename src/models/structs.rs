use chrono::{DateTime, Utc};

/// One previously used server connection, persisted in the connections file.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionInfo {
    pub server: String,
    pub integrated_security: bool,
    pub user_name: String,
    pub last_used: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(server: String, integrated_security: bool, user_name: String) -> Self {
        Self {
            server,
            integrated_security,
            user_name,
            last_used: Utc::now(),
        }
    }

    /// Entries are matched by (server, user) case-insensitively plus the
    /// security mode, never by timestamp.
    pub fn same_endpoint(&self, server: &str, user_name: &str, integrated_security: bool) -> bool {
        self.server.eq_ignore_ascii_case(server)
            && self.user_name.eq_ignore_ascii_case(user_name)
            && self.integrated_security == integrated_security
    }
}

/// One (server, database) pair selectable for a batch.
#[derive(Clone, Debug)]
pub struct DatabaseTarget {
    pub id: i64,
    pub server: String,
    pub database: String,
    pub checked: bool,
    /// Reset at the start of every batch.
    pub retry_attempt: u32,
}

impl DatabaseTarget {
    pub fn new(id: i64, server: String, database: String) -> Self {
        Self {
            id,
            server,
            database,
            checked: false,
            retry_attempt: 0,
        }
    }
}

/// One column of a result set. `name` is unique within the table; `caption`
/// keeps the name the server actually returned.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultColumn {
    pub name: String,
    pub caption: String,
}

/// One result set read fully into memory, every value already rendered to a
/// string (`NULL` for nulls).
#[derive(Clone, Debug, Default)]
pub struct ResultTable {
    pub name: String,
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<String>>,
}

impl ResultTable {
    pub fn new(name: String) -> Self {
        Self {
            name,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Add a column, renaming duplicates `X` -> `X_1`, `X_2`, ... while the
    /// caption keeps the original name.
    pub fn push_column(&mut self, raw_name: &str) {
        let duplicates = self
            .columns
            .iter()
            .filter(|c| c.caption == raw_name)
            .count();
        let name = if duplicates == 0 {
            raw_name.to_string()
        } else {
            format!("{}_{}", raw_name, duplicates)
        };
        self.columns.push(ResultColumn {
            name,
            caption: raw_name.to_string(),
        });
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// One table rendered to display text: a header line plus row lines.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSection {
    pub header: String,
    row_lines: Vec<String>,
}

impl ResultSection {
    pub fn add_row(&mut self, line: String) {
        self.row_lines.push(line);
    }

    pub fn rows_text(&self) -> String {
        self.row_lines.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.row_lines.is_empty()
    }
}
