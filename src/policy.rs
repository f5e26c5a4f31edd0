//! Allow-list policy gate for documents the engine may touch
//!
//! Consulted before any lock or backup is taken. An empty root or extension
//! list means that dimension is unrestricted.

use crate::error::EngineError;
use std::path::{Component, Path, PathBuf};

/// Path and extension allow-lists.
#[derive(Debug, Clone, Default)]
pub struct PolicyGate {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl PolicyGate {
    /// Create a gate from allowed root directories and extensions.
    ///
    /// Extensions are matched as filename suffixes, so multi-part extensions
    /// like `blade.php` work as expected.
    pub fn new(roots: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        let roots = roots.into_iter().map(|r| normalize(&r)).collect();
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self { roots, extensions }
    }

    /// A gate that allows every path and extension. Intended for tests.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Check a document path against both allow-lists.
    pub fn check(&self, path: &Path) -> Result<(), EngineError> {
        if !self.roots.is_empty() {
            let resolved = normalize(path);
            if !self.roots.iter().any(|root| resolved.starts_with(root)) {
                return Err(EngineError::PathNotAllowed {
                    path: path.to_path_buf(),
                });
            }
        }

        if !self.extensions.is_empty() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            let allowed = self
                .extensions
                .iter()
                .any(|ext| name.ends_with(&format!(".{}", ext)));
            if !allowed {
                return Err(EngineError::ExtensionNotAllowed {
                    path: path.to_path_buf(),
                });
            }
        }

        Ok(())
    }
}

/// Absolutize and collapse `.` / `..` components without touching the
/// filesystem, so traversal cannot escape an allowed root.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all_accepts_anything() {
        let gate = PolicyGate::allow_all();
        assert!(gate.check(Path::new("/etc/passwd")).is_ok());
        assert!(gate.check(Path::new("whatever.xyz")).is_ok());
    }

    #[test]
    fn test_root_enforcement() {
        let gate = PolicyGate::new(vec![PathBuf::from("/var/www")], vec![]);
        assert!(gate.check(Path::new("/var/www/pages/index.html")).is_ok());
        assert!(matches!(
            gate.check(Path::new("/etc/passwd")),
            Err(EngineError::PathNotAllowed { .. })
        ));
    }

    #[test]
    fn test_traversal_cannot_escape_root() {
        let gate = PolicyGate::new(vec![PathBuf::from("/var/www")], vec![]);
        let result = gate.check(Path::new("/var/www/../../etc/passwd"));
        assert!(matches!(result, Err(EngineError::PathNotAllowed { .. })));
    }

    #[test]
    fn test_extension_enforcement() {
        let gate = PolicyGate::new(vec![], vec!["html".into(), "blade.php".into()]);
        assert!(gate.check(Path::new("/site/index.html")).is_ok());
        assert!(gate.check(Path::new("/site/home.blade.php")).is_ok());
        assert!(matches!(
            gate.check(Path::new("/site/app.exe")),
            Err(EngineError::ExtensionNotAllowed { .. })
        ));
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        let gate = PolicyGate::new(vec![], vec!["HTML".into()]);
        assert!(gate.check(Path::new("page.html")).is_ok());
        assert!(gate.check(Path::new("PAGE.HTML")).is_ok());
    }

    #[test]
    fn test_plain_php_does_not_match_blade_only() {
        let gate = PolicyGate::new(vec![], vec!["blade.php".into()]);
        assert!(matches!(
            gate.check(Path::new("config.php")),
            Err(EngineError::ExtensionNotAllowed { .. })
        ));
    }
}
