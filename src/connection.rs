use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config;
use crate::models::structs::ConnectionInfo;

const CONNECTIONS_FILE: &str = "connections.xml";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("xml: {0}")]
    Xml(String),
}

/// On-disk shape: `<Connections><Connection Server=".." UserName=".."
/// IntegratedSecurity="true" LastUsed="<rfc3339>"/></Connections>`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "Connections")]
struct ConnectionsDoc {
    #[serde(rename = "Connection", default)]
    connection: Vec<ConnectionEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConnectionEntry {
    #[serde(rename = "@Server")]
    server: String,
    #[serde(rename = "@UserName")]
    user_name: String,
    #[serde(rename = "@IntegratedSecurity")]
    integrated_security: bool,
    #[serde(rename = "@LastUsed")]
    last_used: String,
}

impl From<&ConnectionInfo> for ConnectionEntry {
    fn from(info: &ConnectionInfo) -> Self {
        Self {
            server: info.server.clone(),
            user_name: info.user_name.clone(),
            integrated_security: info.integrated_security,
            last_used: info.last_used.to_rfc3339(),
        }
    }
}

impl ConnectionEntry {
    fn into_info(self) -> ConnectionInfo {
        let last_used = match DateTime::parse_from_rfc3339(&self.last_used) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                log::warn!("Bad LastUsed value '{}': {}", self.last_used, e);
                DateTime::UNIX_EPOCH
            }
        };
        ConnectionInfo {
            server: self.server,
            integrated_security: self.integrated_security,
            user_name: self.user_name,
            last_used,
        }
    }
}

/// Flat list of previously used server connections in an XML file.
pub struct ConnectionStore {
    path: PathBuf,
}

impl ConnectionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn open_default() -> Self {
        Self::new(config::ensure_data_dir().join(CONNECTIONS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All known connections, most recently used first. A missing file is
    /// created empty; a corrupt one is reported and treated as empty (the
    /// next save rewrites it).
    pub fn load(&self) -> Vec<ConnectionInfo> {
        if !self.path.exists() {
            log::debug!(
                "No connections file found. Creating new file in {}.",
                self.path.display()
            );
            if let Err(e) = self.write_entries(&[]) {
                log::error!("Unable to create {}: {}", self.path.display(), e);
            }
            return Vec::new();
        }

        match self.read_entries() {
            Ok(mut infos) => {
                infos.sort_by(|a, b| b.last_used.cmp(&a.last_used));
                infos
            }
            Err(e) => {
                log::error!(
                    "Unable to parse {}: {}. If the file is corrupt, delete it and a new one will be generated.",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Record a connection as used now: update the matching entry in place
    /// or append a new one, then rewrite the file.
    pub fn save(&self, server: &str, user_name: &str, integrated: bool) -> Result<(), StoreError> {
        log::debug!(
            "Saving connection. Server: {}, Integrated Security: {}, User: {}",
            server,
            integrated,
            user_name
        );
        let mut entries = self.read_entries().unwrap_or_default();
        match entries
            .iter_mut()
            .find(|e| e.same_endpoint(server, user_name, integrated))
        {
            Some(existing) => existing.last_used = Utc::now(),
            None => entries.push(ConnectionInfo::new(
                server.to_string(),
                integrated,
                user_name.to_string(),
            )),
        }
        self.write_entries(&entries)
    }

    fn read_entries(&self) -> Result<Vec<ConnectionInfo>, StoreError> {
        let content = fs::read_to_string(&self.path)?;
        let doc: ConnectionsDoc =
            quick_xml::de::from_str(&content).map_err(|e| StoreError::Xml(e.to_string()))?;
        Ok(doc
            .connection
            .into_iter()
            .map(ConnectionEntry::into_info)
            .collect())
    }

    fn write_entries(&self, entries: &[ConnectionInfo]) -> Result<(), StoreError> {
        let doc = ConnectionsDoc {
            connection: entries.iter().map(ConnectionEntry::from).collect(),
        };
        let mut xml = String::new();
        let mut ser = quick_xml::se::Serializer::with_root(&mut xml, Some("Connections"))
            .map_err(|e| StoreError::Xml(e.to_string()))?;
        ser.indent(' ', 2);
        doc.serialize(ser)
            .map_err(|e| StoreError::Xml(e.to_string()))?;
        fs::write(
            &self.path,
            format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n{}", xml),
        )?;
        Ok(())
    }
}
