use std::path::Path;

use gkv_repo::RepositoryConfig;
use serde::{Deserialize, Serialize};

use crate::error::DbResult;

/// Database settings, loadable from TOML.
///
/// ```toml
/// gc_batch_size = 50
///
/// [repository]
/// owner = "octo"
/// name = "kv"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub repository: RepositoryConfig,
    /// Keys removed per atomic update during GC.
    pub gc_batch_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            repository: RepositoryConfig::default(),
            gc_batch_size: 50,
        }
    }
}

impl DatabaseConfig {
    pub fn from_toml_str(text: &str) -> DbResult<Self> {
        toml::from_str(text).map_err(|e| gkv_repo::RepoError::Config(e).into())
    }

    pub fn load(path: &Path) -> DbResult<Self> {
        let text = std::fs::read_to_string(path).map_err(gkv_repo::RepoError::Io)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = DatabaseConfig::default();
        assert_eq!(c.gc_batch_size, 50);
        assert_eq!(c.repository, RepositoryConfig::default());
    }

    #[test]
    fn parse_nested_repository() {
        let c = DatabaseConfig::from_toml_str(
            "gc_batch_size = 10\n[repository]\nowner = \"octo\"\nname = \"kv\"\n",
        )
        .unwrap();
        assert_eq!(c.gc_batch_size, 10);
        assert_eq!(c.repository.owner, "octo");
        assert!(DatabaseConfig::from_toml_str("gc_batch_size = \"ten\"").is_err());
    }
}
