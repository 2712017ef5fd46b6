//! Name validation and sandbox checks.

use crate::error::{Result, StoreError};
use std::path::{Component, Path};

/// Maximum length of a single stored file name.
pub const MAX_NAME_LEN: usize = 255;

/// Sets owner-only permissions on a directory (Unix only).
pub async fn set_secure_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|_e| StoreError::Permission {
                operation: "set secure permissions".to_string(),
                path: path.to_path_buf(),
            })?;
    }

    #[cfg(not(unix))]
    {
        if !path.exists() {
            return Err(StoreError::PathValidation {
                path: path.to_path_buf(),
                reason: "Directory does not exist".to_string(),
            });
        }
    }

    Ok(())
}

/// Validates that `name` is a single, plain path component.
///
/// Rejects empty names, null bytes, separators, `.`/`..`, absolute paths and names that start
/// with a dot (hidden names are reserved for the store itself).
pub fn validate_file_name(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(StoreError::PathValidation {
            path: name.into(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return reject("Empty file name");
    }
    if name.len() > MAX_NAME_LEN {
        return reject("File name too long");
    }
    if name.contains('\0') {
        return reject("File name contains null bytes");
    }
    if name.starts_with('.') {
        return reject("Hidden file names are reserved");
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return reject("File name must be a single path component"),
    }
    if name.contains('/') || name.contains('\\') {
        return reject("File name contains a path separator");
    }

    Ok(())
}

/// Validates that a resolved path is within the sandbox directory, following symlinks.
pub fn validate_path_within_sandbox(resolved_path: &Path, sandbox_base: &Path) -> Result<()> {
    let canonical_base =
        sandbox_base
            .canonicalize()
            .map_err(|e| StoreError::PathValidation {
                path: sandbox_base.to_path_buf(),
                reason: format!("Failed to resolve sandbox base: {e}"),
            })?;

    // Only existing paths can be symlinks; a missing target is checked through its parent.
    let canonical_path = if resolved_path.exists() {
        resolved_path
            .canonicalize()
            .map_err(|e| StoreError::PathValidation {
                path: resolved_path.to_path_buf(),
                reason: format!("Failed to resolve path: {e}"),
            })?
    } else {
        let parent = resolved_path
            .parent()
            .ok_or_else(|| StoreError::PathValidation {
                path: resolved_path.to_path_buf(),
                reason: "Path has no parent directory".to_string(),
            })?;
        let filename = resolved_path
            .file_name()
            .ok_or_else(|| StoreError::PathValidation {
                path: resolved_path.to_path_buf(),
                reason: "Invalid filename".to_string(),
            })?;
        parent
            .canonicalize()
            .map_err(|e| StoreError::PathValidation {
                path: parent.to_path_buf(),
                reason: format!("Failed to resolve parent: {e}"),
            })?
            .join(filename)
    };

    if !canonical_path.starts_with(&canonical_base) {
        return Err(StoreError::PathValidation {
            path: resolved_path.to_path_buf(),
            reason: format!(
                "Path escapes sandbox: resolves to '{}' (outside '{}')",
                canonical_path.display(),
                canonical_base.display()
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("2349.png").is_ok());
        assert!(validate_file_name("sv_mjolk-01.json").is_ok());

        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name(".partial").is_err());
        assert!(validate_file_name("../etc/passwd").is_err());
        assert!(validate_file_name("/etc/passwd").is_err());
        assert!(validate_file_name("a/b.png").is_err());
        assert!(validate_file_name("a\\b.png").is_err());
        assert!(validate_file_name("file\0.png").is_err());
        assert!(validate_file_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn test_validate_path_within_sandbox() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path();

        let inside = base.join("inside.png");
        std::fs::write(&inside, b"data").unwrap();
        assert!(validate_path_within_sandbox(&inside, base).is_ok());
        assert!(validate_path_within_sandbox(&base.join("missing.png"), base).is_ok());

        let outside_dir = tempfile::tempdir().unwrap();
        let outside = outside_dir.path().join("outside.png");
        std::fs::write(&outside, b"data").unwrap();
        assert!(validate_path_within_sandbox(&outside, base).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escaping_sandbox_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let outside_dir = tempfile::tempdir().unwrap();
        let target = outside_dir.path().join("secret.png");
        std::fs::write(&target, b"secret").unwrap();

        let link = temp_dir.path().join("link.png");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(validate_path_within_sandbox(&link, temp_dir.path()).is_err());
    }
}
