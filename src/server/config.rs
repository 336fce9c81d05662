//! Server configuration.

use crate::DEFAULT_PORT;
use std::path::PathBuf;

/// Directory reported by `CONFIG GET dir` when none was given.
pub const DEFAULT_DIR: &str = "/tmp/redis-files";

/// Filename reported by `CONFIG GET dbfilename` when none was given.
pub const DEFAULT_DBFILENAME: &str = "dump.rdb";

/// Server configuration, assembled from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Primary to replicate from; set makes this node a replica
    pub replicaof: Option<(String, u16)>,
    /// Directory holding the startup snapshot
    pub dir: Option<PathBuf>,
    /// Snapshot filename
    pub dbfilename: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            replicaof: None,
            dir: None,
            dbfilename: None,
        }
    }
}

impl Config {
    /// Path of the startup snapshot, when both `--dir` and `--dbfilename`
    /// were provided.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        Some(self.dir.as_ref()?.join(self.dbfilename.as_ref()?))
    }

    /// Value reported by `CONFIG GET dir`.
    pub fn dir_value(&self) -> String {
        self.dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| DEFAULT_DIR.to_string())
    }

    /// Value reported by `CONFIG GET dbfilename`.
    pub fn dbfilename_value(&self) -> String {
        self.dbfilename
            .clone()
            .unwrap_or_else(|| DEFAULT_DBFILENAME.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_path_requires_both_flags() {
        let mut cfg = Config::default();
        assert_eq!(cfg.snapshot_path(), None);

        cfg.dir = Some(PathBuf::from("/data"));
        assert_eq!(cfg.snapshot_path(), None);

        cfg.dbfilename = Some("dump.rdb".to_string());
        assert_eq!(cfg.snapshot_path(), Some(PathBuf::from("/data/dump.rdb")));
    }

    #[test]
    fn config_get_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.dir_value(), DEFAULT_DIR);
        assert_eq!(cfg.dbfilename_value(), DEFAULT_DBFILENAME);
    }
}
