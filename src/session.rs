use std::fs;
use std::path::Path;

use crate::models::enums::CredentialMode;
use crate::models::structs::DatabaseTarget;

/// One connected server and the targets discovered on it.
#[derive(Clone, Debug)]
pub struct ServerSession {
    pub server: String,
    pub credential: CredentialMode,
    pub targets: Vec<DatabaseTarget>,
}

/// All connected servers for this process, plus the owned id sequence for
/// their targets. Sessions live only as long as the process; the persisted
/// state is the connections file, not this.
#[derive(Default)]
pub struct SessionList {
    servers: Vec<ServerSession>,
    next_target_id: i64,
}

impl SessionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a successful server connect and its database list. Targets
    /// get ids from the session-scoped sequence. Reconnecting a known server
    /// replaces its database list (selection is reset).
    pub fn add_server(
        &mut self,
        server: &str,
        credential: CredentialMode,
        databases: Vec<String>,
    ) {
        self.remove_server(server);
        let mut targets = Vec::with_capacity(databases.len());
        for database in databases {
            self.next_target_id += 1;
            targets.push(DatabaseTarget::new(
                self.next_target_id,
                server.to_string(),
                database,
            ));
        }
        self.servers.push(ServerSession {
            server: server.to_string(),
            credential,
            targets,
        });
    }

    pub fn remove_server(&mut self, server: &str) {
        self.servers.retain(|s| !s.server.eq_ignore_ascii_case(server));
    }

    pub fn servers(&self) -> &[ServerSession] {
        &self.servers
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn credential_for(&self, server: &str) -> Option<&CredentialMode> {
        self.servers
            .iter()
            .find(|s| s.server.eq_ignore_ascii_case(server))
            .map(|s| &s.credential)
    }

    pub fn targets(&self) -> impl Iterator<Item = &DatabaseTarget> {
        self.servers.iter().flat_map(|s| s.targets.iter())
    }

    fn targets_mut(&mut self) -> impl Iterator<Item = &mut DatabaseTarget> {
        self.servers.iter_mut().flat_map(|s| s.targets.iter_mut())
    }

    /// The checked targets at this instant, ordered by (server, database),
    /// the order a batch processes them in.
    pub fn checked_targets(&self) -> Vec<DatabaseTarget> {
        let mut checked: Vec<DatabaseTarget> =
            self.targets().filter(|t| t.checked).cloned().collect();
        checked.sort_by(|a, b| a.server.cmp(&b.server).then(a.database.cmp(&b.database)));
        checked
    }

    pub fn matches_filter(target: &DatabaseTarget, filter: &str) -> bool {
        if filter.is_empty() {
            return true;
        }
        let filter = filter.to_uppercase();
        target.database.to_uppercase().contains(&filter)
            || target.server.to_uppercase().contains(&filter)
    }

    pub fn set_checked(&mut self, id: i64, checked: bool) {
        if let Some(target) = self.targets_mut().find(|t| t.id == id) {
            target.checked = checked;
        }
    }

    pub fn uncheck(&mut self, id: i64) {
        self.set_checked(id, false);
    }

    /// Select-all honouring the current filter: only visible rows change.
    pub fn set_all_checked(&mut self, checked: bool, filter: &str) {
        for target in self.targets_mut() {
            if Self::matches_filter(target, filter) {
                target.checked = checked;
            }
        }
    }

    pub fn selected_count_text(&self) -> String {
        let total = self.targets().count();
        let selected = self.targets().filter(|t| t.checked).count();
        format!("Selected {} of {}", selected, total)
    }

    /// Save the checked set as `server\tdatabase` lines for a later session.
    pub fn save_selection(&self, path: &Path) -> Result<(), String> {
        let lines: Vec<String> = self
            .checked_targets()
            .iter()
            .map(|t| format!("{}\t{}", t.server, t.database))
            .collect();
        fs::write(path, lines.join("\n")).map_err(|e| e.to_string())
    }

    /// Check every target named in the file that is currently connected;
    /// unknown entries are ignored.
    pub fn load_selection(&mut self, path: &Path) -> Result<usize, String> {
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        let wanted: Vec<(String, String)> = content
            .lines()
            .filter_map(|line| {
                line.split_once('\t')
                    .map(|(s, d)| (s.to_string(), d.to_string()))
            })
            .collect();
        let mut applied = 0;
        for target in self.targets_mut() {
            let hit = wanted.iter().any(|(s, d)| {
                s.eq_ignore_ascii_case(&target.server) && d == &target.database
            });
            if hit {
                target.checked = true;
                applied += 1;
            }
        }
        Ok(applied)
    }
}
