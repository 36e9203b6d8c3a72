//! Static peer table
//!
//! The cluster membership is fixed at startup and loaded from a plain-text
//! file, one `<memberId>,<host>,<port>` entry per non-blank, non-comment
//! line. Entry order is preserved.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::MemberId;

/// Default peer table path, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "network.config";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read peer table {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed peer table entry at {path}:{line}: `{text}`")]
    MalformedEntry {
        path: PathBuf,
        line: usize,
        text: String,
    },
    #[error("member {0} is not in the peer table")]
    UnknownMember(MemberId),
}

/// One row of the peer table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerEntry {
    pub id: MemberId,
    pub host: String,
    pub port: u16,
}

impl PeerEntry {
    /// Endpoint in the form `tokio::net` connect/bind helpers accept.
    #[must_use]
    pub fn endpoint(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

/// The member -> address mapping, in file order. Read-only after construction.
#[derive(Clone, Debug, Default)]
pub struct PeerTable {
    entries: Vec<PeerEntry>,
}

impl PeerTable {
    #[must_use]
    pub fn new(entries: Vec<PeerEntry>) -> Self {
        Self { entries }
    }

    /// Load the table from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let malformed = || ConfigError::MalformedEntry {
                path: path.to_owned(),
                line: lineno + 1,
                text: raw.to_owned(),
            };
            let mut parts = line.split(',').map(str::trim);
            let (Some(id), Some(host), Some(port), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(malformed());
            };
            let id: MemberId = id.parse().map_err(|_| malformed())?;
            let port: u16 = port.parse().map_err(|_| malformed())?;
            entries.push(PeerEntry {
                id,
                host: host.to_owned(),
                port,
            });
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn get(&self, id: MemberId) -> Option<&PeerEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<PeerTable, ConfigError> {
        PeerTable::parse(text, Path::new("network.config"))
    }

    #[test]
    fn parses_entries_in_order() {
        let table = parse(
            "# council addresses\n\
             M1,127.0.0.1,9001\n\
             \n\
             M2, 127.0.0.1, 9002\n\
             M9,10.0.0.9,9009\n",
        )
        .unwrap();
        assert_eq!(table.len(), 3);
        let ids: Vec<String> = table.iter().map(|e| e.id.to_string()).collect();
        assert_eq!(ids, ["M1", "M2", "M9"]);
        let m2 = table.get("M2".parse().unwrap()).unwrap();
        assert_eq!(m2.endpoint(), ("127.0.0.1", 9002));
        assert!(table.get("M4".parse().unwrap()).is_none());
    }

    #[test]
    fn rejects_malformed_lines() {
        for bad in [
            "M1,127.0.0.1",
            "M1,127.0.0.1,9001,extra",
            "X1,127.0.0.1,9001",
            "M1,127.0.0.1,port",
        ] {
            let err = parse(bad).unwrap_err();
            assert!(
                matches!(err, ConfigError::MalformedEntry { line: 1, .. }),
                "expected malformed entry for `{bad}`, got {err:?}"
            );
        }
    }

    #[test]
    fn missing_file_reports_path() {
        let err = PeerTable::load("/definitely/not/here.config").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
