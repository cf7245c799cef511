//! Validation of pandoc defaults files.
//!
//! A defaults file is a YAML mapping handed to pandoc via `--defaults`.
//! Its keys are opaque to this server, except that `from` and `to` must
//! not both be present: the conversion direction comes from the tool call.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::DefaultsFileError;

/// Reads and validates a defaults file, returning its top-level mapping.
///
/// # Errors
///
/// Returns a [`DefaultsFileError`] naming `path` if the file is missing,
/// unreadable, malformed, empty, not a mapping, or sets both `from` and
/// `to`.
pub async fn read_defaults(path: &Path) -> Result<Mapping, DefaultsFileError> {
    let is_file = tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file());
    if !is_file {
        return Err(DefaultsFileError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DefaultsFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    parse_defaults(&text, path)
}

/// Validates a defaults file without returning its contents.
///
/// # Errors
///
/// See [`read_defaults`].
pub async fn validate_defaults(path: &Path) -> Result<(), DefaultsFileError> {
    read_defaults(path).await.map(|_| ())
}

/// Parses and validates defaults text. `path` is only used in errors.
///
/// # Errors
///
/// See [`read_defaults`].
pub fn parse_defaults(text: &str, path: &Path) -> Result<Mapping, DefaultsFileError> {
    let path = || path.to_path_buf();

    if text.trim().is_empty() {
        return Err(DefaultsFileError::Empty { path: path() });
    }

    let value: Value = serde_yaml::from_str(text).map_err(|e| DefaultsFileError::Parse {
        path: path(),
        message: e.to_string(),
    })?;

    let mapping = match value {
        Value::Null => return Err(DefaultsFileError::Empty { path: path() }),
        Value::Mapping(mapping) => mapping,
        _ => return Err(DefaultsFileError::NotAMapping { path: path() }),
    };

    if mapping.contains_key("from") && mapping.contains_key("to") {
        return Err(DefaultsFileError::ConflictingDirection { path: path() });
    }

    Ok(mapping)
}

/// Directory used as the extra filter search root for a defaults file.
pub async fn defaults_dir(path: &Path) -> Option<PathBuf> {
    let dir = tokio::fs::canonicalize(path)
        .await
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .or_else(|| path.parent().map(Path::to_path_buf))?;

    if dir.as_os_str().is_empty() {
        Some(PathBuf::from("."))
    } else {
        Some(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[tokio::test]
    async fn valid_mapping_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "defaults.yaml",
            "standalone: true\ntoc: true\nvariables:\n  geometry: margin=2cm\n",
        );

        let mapping = read_defaults(&path).await.unwrap();
        assert_eq!(mapping.get("toc"), Some(&Value::Bool(true)));
        assert!(validate_defaults(&path).await.is_ok());
    }

    #[tokio::test]
    async fn one_direction_key_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "d.yaml", "from: markdown\n");
        assert!(validate_defaults(&path).await.is_ok());
    }

    #[tokio::test]
    async fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_defaults(&dir.path().join("nope.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, DefaultsFileError::NotFound { .. }));
    }

    #[tokio::test]
    async fn directory_is_not_a_defaults_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_defaults(dir.path()).await.unwrap_err();
        assert!(matches!(err, DefaultsFileError::NotFound { .. }));
    }

    #[tokio::test]
    async fn empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "empty.yaml", "");
        let err = read_defaults(&path).await.unwrap_err();
        assert!(matches!(err, DefaultsFileError::Empty { .. }));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn explicit_null_is_empty() {
        let err = parse_defaults("~\n", Path::new("null.yaml")).unwrap_err();
        assert!(matches!(err, DefaultsFileError::Empty { .. }));
    }

    #[tokio::test]
    async fn list_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "list.yaml", "- one\n- two\n");
        let err = read_defaults(&path).await.unwrap_err();
        assert!(matches!(err, DefaultsFileError::NotAMapping { .. }));
        assert!(err.to_string().contains("must contain a YAML object"));
        assert!(err.to_string().contains("list.yaml"));
    }

    #[test]
    fn scalar_document() {
        let err = parse_defaults("just a string\n", Path::new("s.yaml")).unwrap_err();
        assert!(matches!(err, DefaultsFileError::NotAMapping { .. }));
    }

    #[tokio::test]
    async fn both_direction_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "both.yaml", "from: markdown\nto: html\n");
        let err = read_defaults(&path).await.unwrap_err();
        assert!(matches!(err, DefaultsFileError::ConflictingDirection { .. }));
        assert!(err.to_string().contains("'from' and 'to'"));
    }

    #[tokio::test]
    async fn broken_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "broken.yaml", "key: [unclosed\n  other: {\n");
        let err = read_defaults(&path).await.unwrap_err();
        assert!(matches!(err, DefaultsFileError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse"));
    }

    #[tokio::test]
    async fn defaults_dir_of_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "d.yaml", "toc: true\n");
        let found = defaults_dir(&path).await.unwrap();
        assert_eq!(found, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn defaults_dir_of_bare_name() {
        assert_eq!(
            defaults_dir(Path::new("surely-not-here.yaml")).await,
            Some(PathBuf::from("."))
        );
    }
}
