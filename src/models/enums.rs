use serde::{Deserialize, Serialize};

use crate::models::structs::ResultTable;

/// Where the results of a batch end up.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ResultDisplayType {
    /// One result tab per database.
    DifferentTabs,
    /// Delimited text accumulated in the results pane.
    Text,
    /// One text file per database in a chosen folder.
    DatabaseFileName,
    /// One combined text file for the whole batch.
    CombinedFile,
    /// Like `Text`, but only the first target's header is shown.
    TextFirstHeaderOnly,
    /// SSMS-style fixed-width text.
    TextSqlFormatted,
}

impl ResultDisplayType {
    pub const ALL: [ResultDisplayType; 6] = [
        ResultDisplayType::DifferentTabs,
        ResultDisplayType::Text,
        ResultDisplayType::DatabaseFileName,
        ResultDisplayType::CombinedFile,
        ResultDisplayType::TextFirstHeaderOnly,
        ResultDisplayType::TextSqlFormatted,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ResultDisplayType::DifferentTabs => "Different Tabs",
            ResultDisplayType::Text => "Text",
            ResultDisplayType::DatabaseFileName => "File Per Database",
            ResultDisplayType::CombinedFile => "Combined File",
            ResultDisplayType::TextFirstHeaderOnly => "Single Header Results",
            ResultDisplayType::TextSqlFormatted => "SQL Formatted",
        }
    }

    /// Whether the results land in the shared text pane.
    pub fn is_results_to_text(&self) -> bool {
        !matches!(self, ResultDisplayType::DifferentTabs)
    }

    /// Whether the delimiter box applies to this display type.
    pub fn uses_delimiter(&self) -> bool {
        matches!(
            self,
            ResultDisplayType::CombinedFile
                | ResultDisplayType::DatabaseFileName
                | ResultDisplayType::Text
                | ResultDisplayType::TextFirstHeaderOnly
        )
    }
}

/// How a server connection authenticates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialMode {
    /// Authenticate as the calling OS user.
    Integrated,
    SqlServer { user: String, password: String },
}

impl CredentialMode {
    pub fn is_integrated(&self) -> bool {
        matches!(self, CredentialMode::Integrated)
    }

    /// User name for persistence; empty for integrated security.
    pub fn user_name(&self) -> &str {
        match self {
            CredentialMode::Integrated => "",
            CredentialMode::SqlServer { user, .. } => user,
        }
    }
}

/// State-change messages emitted by the batch executor. The UI (or a test)
/// owns the receiving end; the executor never touches UI collections.
#[derive(Clone, Debug)]
pub enum BatchEvent {
    TargetStarted {
        target_id: i64,
        server: String,
        database: String,
    },
    TargetFinished {
        target_id: i64,
        server: String,
        database: String,
        tables: Vec<ResultTable>,
    },
    TargetFailed {
        target_id: i64,
        server: String,
        database: String,
        /// Pre-formatted error text (server.database, message, ruler).
        error: String,
    },
    /// Emitted after each successfully delivered target.
    Progress { done: usize, total: usize },
    Cancelled,
    Finished { elapsed: std::time::Duration },
}
