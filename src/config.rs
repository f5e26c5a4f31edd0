//! Configuration loading with multi-layer merge

use crate::policy::PolicyGate;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level fragpatch configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Path and extension allow-lists
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Backup storage settings
    #[serde(default)]
    pub backups: BackupConfig,

    /// Lock settings
    #[serde(default)]
    pub locks: LockConfig,
}

/// Allow-list settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Directories documents may live under (empty = unrestricted)
    #[serde(default)]
    pub allowed_roots: Vec<String>,

    /// Filename suffixes the engine may edit
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_roots: Vec::new(),
            allowed_extensions: default_extensions(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["html", "htm", "xml", "txt", "md", "blade.php", "php", "twig", "tpl"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Backup storage settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Directory snapshots and the history index live in
    pub root: Option<String>,
}

impl BackupConfig {
    /// Resolve the backup root, falling back to the user config directory.
    pub fn resolve_root(&self) -> PathBuf {
        if let Some(ref root) = self.root {
            return PathBuf::from(shellexpand::tilde(root).into_owned());
        }
        dirs::config_dir()
            .map(|p| p.join("fragpatch").join("backups"))
            .unwrap_or_else(|| PathBuf::from(".fragpatch/backups"))
    }
}

/// Lock settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// How long an acquire blocks before failing, in seconds
    #[serde(default = "default_lock_timeout")]
    pub timeout_secs: u64,

    /// How long a held lock survives a crashed holder, in seconds
    #[serde(default = "default_lock_ttl")]
    pub ttl_secs: u64,
}

fn default_lock_timeout() -> u64 {
    10
}

fn default_lock_ttl() -> u64 {
    300
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_lock_timeout(),
            ttl_secs: default_lock_ttl(),
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl EngineConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/fragpatch/config.toml
    /// 3. .fragpatch/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_dir
            .map(|p| p.join(".fragpatch/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".fragpatch/config.toml"));

        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/fragpatch/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("fragpatch/config.toml"))
    }

    /// Overlay another config; non-empty fields win.
    pub fn merge(&mut self, other: Self) {
        if !other.policy.allowed_roots.is_empty() {
            self.policy.allowed_roots = other.policy.allowed_roots;
        }
        if other.policy.allowed_extensions != default_extensions() {
            self.policy.allowed_extensions = other.policy.allowed_extensions;
        }
        if other.backups.root.is_some() {
            self.backups.root = other.backups.root;
        }
        if other.locks.timeout_secs != default_lock_timeout() {
            self.locks.timeout_secs = other.locks.timeout_secs;
        }
        if other.locks.ttl_secs != default_lock_ttl() {
            self.locks.ttl_secs = other.locks.ttl_secs;
        }
    }

    /// Build the policy gate, expanding `~` in configured roots.
    pub fn policy_gate(&self) -> PolicyGate {
        let roots = self
            .policy
            .allowed_roots
            .iter()
            .map(|r| PathBuf::from(shellexpand::tilde(r).into_owned()))
            .collect();
        PolicyGate::new(roots, self.policy.allowed_extensions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.policy.allowed_roots.is_empty());
        assert!(config.policy.allowed_extensions.contains(&"html".to_string()));
        assert_eq!(config.locks.timeout_secs, 10);
        assert_eq!(config.locks.ttl_secs, 300);
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[policy]
allowed_roots = ["/var/www"]
allowed_extensions = ["html"]

[locks]
timeout_secs = 3
"#,
        )
        .unwrap();

        let config = EngineConfig::load_file(&path).unwrap();
        assert_eq!(config.policy.allowed_roots, vec!["/var/www"]);
        assert_eq!(config.policy.allowed_extensions, vec!["html"]);
        assert_eq!(config.locks.timeout_secs, 3);
        assert_eq!(config.locks.ttl_secs, 300);
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[polcy]\nallowed_roots = []\n").unwrap();

        assert!(EngineConfig::load_file(&path).is_err());
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = EngineConfig::default();
        let mut overlay = EngineConfig::default();
        overlay.policy.allowed_roots = vec!["/srv/pages".into()];
        overlay.locks.timeout_secs = 1;

        base.merge(overlay);
        assert_eq!(base.policy.allowed_roots, vec!["/srv/pages"]);
        assert_eq!(base.locks.timeout_secs, 1);
        // Untouched fields keep their defaults
        assert_eq!(base.locks.ttl_secs, 300);
    }

    #[test]
    fn test_project_config_discovery() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".fragpatch")).unwrap();
        fs::write(
            dir.path().join(".fragpatch/config.toml"),
            "[locks]\ntimeout_secs = 2\n",
        )
        .unwrap();

        let config = EngineConfig::load(Some(dir.path())).unwrap();
        assert_eq!(config.locks.timeout_secs, 2);
    }

    #[test]
    fn test_backup_root_expansion() {
        let config = BackupConfig {
            root: Some("/tmp/snapshots".into()),
        };
        assert_eq!(config.resolve_root(), PathBuf::from("/tmp/snapshots"));
    }
}
