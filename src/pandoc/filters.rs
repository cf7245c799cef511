//! Locating pandoc filters (and other helper files) by name.
//!
//! A name is tried against an ordered list of candidate locations and the
//! first regular file wins:
//!
//! 1. the name as given (for an absolute name, this is the only candidate)
//! 2. `<cwd>/<name>`
//! 3. `<aux>/<name>`, where `aux` is usually the defaults file's directory
//! 4. `<home>/.pandoc/filters/<name>`

use std::path::{Path, PathBuf};

use crate::error::FilterNotFoundError;

/// Per-user filter directory, relative to the home directory.
const USER_FILTER_DIR: [&str; 2] = [".pandoc", "filters"];

/// Resolves filter names against the process and user search roots.
#[derive(Debug, Clone)]
pub struct FilterResolver {
    cwd: PathBuf,
    user_filter_dir: PathBuf,
}

impl FilterResolver {
    /// Creates a resolver with explicit search roots.
    #[must_use]
    pub const fn new(cwd: PathBuf, user_filter_dir: PathBuf) -> Self {
        Self {
            cwd,
            user_filter_dir,
        }
    }

    /// Creates a resolver from the current working directory and home.
    #[must_use]
    pub fn from_env() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(cwd, default_user_filter_dir())
    }

    /// Candidate paths for `name`, in search order.
    #[must_use]
    pub fn candidates(&self, name: &str, aux_dir: Option<&Path>) -> Vec<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return vec![path.to_path_buf()];
        }

        [
            Some(path.to_path_buf()),
            Some(self.cwd.join(path)),
            aux_dir.map(|dir| dir.join(path)),
            Some(self.user_filter_dir.join(path)),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Resolves one filter name to an absolute path.
    ///
    /// The found file is made executable on a best-effort basis; failing to
    /// do so is logged and does not fail resolution.
    ///
    /// # Errors
    ///
    /// Returns [`FilterNotFoundError`] listing every tried path if no
    /// candidate is an existing regular file.
    pub async fn resolve(
        &self,
        name: &str,
        aux_dir: Option<&Path>,
    ) -> Result<PathBuf, FilterNotFoundError> {
        let tried_paths = self.candidates(name, aux_dir);

        for candidate in &tried_paths {
            if !is_regular_file(candidate).await {
                continue;
            }

            let resolved = self.absolutize(candidate);
            make_executable(&resolved).await;
            tracing::debug!(filter = name, path = %resolved.display(), "Resolved filter");
            return Ok(resolved);
        }

        Err(FilterNotFoundError {
            name: name.to_string(),
            tried_paths,
        })
    }

    /// Resolves every name in order, failing on the first miss.
    ///
    /// # Errors
    ///
    /// Returns the error for the first name that cannot be resolved.
    pub async fn resolve_all(
        &self,
        names: &[String],
        aux_dir: Option<&Path>,
    ) -> Result<Vec<PathBuf>, FilterNotFoundError> {
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            resolved.push(self.resolve(name, aux_dir).await?);
        }
        Ok(resolved)
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

impl Default for FilterResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Returns `<home>/.pandoc/filters`.
#[must_use]
pub fn default_user_filter_dir() -> PathBuf {
    USER_FILTER_DIR
        .iter()
        .fold(home_dir(), |dir, part| dir.join(part))
}

fn home_dir() -> PathBuf {
    dirs::home_dir()
        .or_else(home_from_env)
        .unwrap_or_else(root_dir)
}

#[cfg(windows)]
fn home_from_env() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(windows))]
fn home_from_env() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn root_dir() -> PathBuf {
    PathBuf::from("C:\\")
}

#[cfg(not(windows))]
fn root_dir() -> PathBuf {
    PathBuf::from("/")
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

#[cfg(unix)]
async fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let result = async {
        let mut permissions = tokio::fs::metadata(path).await?.permissions();
        let mode = permissions.mode();
        if mode & 0o111 == 0o111 {
            return Ok(());
        }
        permissions.set_mode(mode | 0o111);
        tokio::fs::set_permissions(path, permissions).await
    }
    .await;

    if let Err(e) = result {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "Could not make filter executable"
        );
    }
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    struct Fixture {
        cwd: TempDir,
        user: TempDir,
        aux: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                cwd: tempfile::tempdir().unwrap(),
                user: tempfile::tempdir().unwrap(),
                aux: tempfile::tempdir().unwrap(),
            }
        }

        fn resolver(&self) -> FilterResolver {
            FilterResolver::new(self.cwd.path().to_path_buf(), self.user.path().to_path_buf())
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, "return {}\n").unwrap();
        path
    }

    #[tokio::test]
    async fn absolute_path_resolves_to_itself() {
        let fx = Fixture::new();
        let file = touch(fx.aux.path(), "abs.lua");

        let resolved = fx.resolver().resolve(file.to_str().unwrap(), None).await.unwrap();
        assert_eq!(resolved, file);
    }

    #[tokio::test]
    async fn relative_path_resolves_against_cwd() {
        let fx = Fixture::new();
        let file = touch(fx.cwd.path(), "filters/count.lua");

        let resolved = fx.resolver().resolve("filters/count.lua", None).await.unwrap();
        assert_eq!(resolved, file);
    }

    #[tokio::test]
    async fn bare_name_resolves_against_aux_dir() {
        let fx = Fixture::new();
        let file = touch(fx.aux.path(), "wc.py");

        let resolved = fx
            .resolver()
            .resolve("wc.py", Some(fx.aux.path()))
            .await
            .unwrap();
        assert_eq!(resolved, file);
    }

    #[tokio::test]
    async fn bare_name_resolves_against_user_dir() {
        let fx = Fixture::new();
        let file = touch(fx.user.path(), "upper.lua");

        let resolved = fx.resolver().resolve("upper.lua", None).await.unwrap();
        assert_eq!(resolved, file);
    }

    #[tokio::test]
    async fn cwd_wins_over_aux_and_user() {
        let fx = Fixture::new();
        let in_cwd = touch(fx.cwd.path(), "dup.lua");
        touch(fx.aux.path(), "dup.lua");
        touch(fx.user.path(), "dup.lua");

        let resolved = fx
            .resolver()
            .resolve("dup.lua", Some(fx.aux.path()))
            .await
            .unwrap();
        assert_eq!(resolved, in_cwd);
    }

    #[tokio::test]
    async fn directories_do_not_match() {
        let fx = Fixture::new();
        std::fs::create_dir(fx.user.path().join("dir.lua")).unwrap();

        assert!(fx.resolver().resolve("dir.lua", None).await.is_err());
    }

    #[tokio::test]
    async fn miss_reports_four_paths_in_order() {
        let fx = Fixture::new();

        let err = fx
            .resolver()
            .resolve("missing.lua", Some(fx.aux.path()))
            .await
            .unwrap_err();

        assert_eq!(err.name, "missing.lua");
        assert_eq!(
            err.tried_paths,
            vec![
                PathBuf::from("missing.lua"),
                fx.cwd.path().join("missing.lua"),
                fx.aux.path().join("missing.lua"),
                fx.user.path().join("missing.lua"),
            ]
        );
    }

    #[tokio::test]
    async fn resolve_all_stops_at_first_miss() {
        let fx = Fixture::new();
        touch(fx.user.path(), "a.lua");
        touch(fx.user.path(), "c.lua");
        let names = vec!["a.lua".to_string(), "b.lua".to_string(), "c.lua".to_string()];

        let err = fx.resolver().resolve_all(&names, None).await.unwrap_err();
        assert_eq!(err.name, "b.lua");

        let names = vec!["c.lua".to_string(), "a.lua".to_string()];
        let resolved = fx.resolver().resolve_all(&names, None).await.unwrap();
        assert_eq!(
            resolved,
            vec![fx.user.path().join("c.lua"), fx.user.path().join("a.lua")]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolved_filter_is_made_executable() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        let file = touch(fx.user.path(), "exec.py");
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        fx.resolver().resolve("exec.py", None).await.unwrap();

        let mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn user_filter_dir_ends_with_pandoc_filters() {
        let dir = default_user_filter_dir();
        assert!(dir.ends_with(Path::new(".pandoc").join("filters")));
    }
}
