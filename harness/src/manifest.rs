/*!

Manifests are plain YAML files containing literal placeholder tokens such as `%BACKUP_FILE%`.
Substitution is textual: every exact occurrence of a token is replaced, nothing is escaped or
validated, and a token that does not occur is silently left alone.

!*/

use crate::error::{self, Result};
use log::debug;
use snafu::ResultExt;
use std::path::{Path, PathBuf};

/// Placeholder for the backup archive name in the restore manifest.
pub const TOKEN_BACKUP_FILE: &str = "%BACKUP_FILE%";
/// Placeholder for the restore `prune` flag.
pub const TOKEN_PRUNE: &str = "%PRUNE%";

pub const BACKUP_MANIFEST: &str = "backup.yaml";
pub const RESTORE_MANIFEST: &str = "restore.yaml";
pub const RESOURCE_SET_MANIFEST: &str = "resourceset.yaml";

/// Replace every occurrence of `token` in the file at `path` with `replacement`, in place.
pub fn sed(token: &str, replacement: &str, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path).context(error::FileSnafu {
        action: "read manifest",
        path,
    })?;
    if !content.contains(token) {
        debug!("'{}' does not contain '{}'", path.display(), token);
    }
    std::fs::write(path, substitute(&content, token, replacement)).context(
        error::FileSnafu {
            action: "write manifest",
            path,
        },
    )
}

/// Replace every occurrence of `token` in `content`.
pub fn substitute(content: &str, token: &str, replacement: &str) -> String {
    content.replace(token, replacement)
}

/// Copy the template `name` from `assets_dir` into `dir` and return the path of the copy. Tokens
/// are substituted into the copy, so the shipped template keeps its placeholders.
pub fn stage(assets_dir: &Path, name: &str, dir: &Path) -> Result<PathBuf> {
    let template = assets_dir.join(name);
    let staged = dir.join(name);
    std::fs::copy(&template, &staged).context(error::FileSnafu {
        action: "copy manifest template",
        path: &template,
    })?;
    Ok(staged)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn assets() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets")
    }

    #[test]
    fn restore_template_is_rendered() {
        let dir = TempDir::new().unwrap();
        let staged = stage(&assets(), RESTORE_MANIFEST, dir.path()).unwrap();
        sed(
            TOKEN_BACKUP_FILE,
            "kubewarden-backup-2f1e-2025-01-01T00-00-00Z.tar.gz",
            &staged,
        )
        .unwrap();
        sed(TOKEN_PRUNE, "false", &staged).unwrap();

        let rendered = std::fs::read_to_string(&staged).unwrap();
        assert!(rendered
            .contains("backupFilename: kubewarden-backup-2f1e-2025-01-01T00-00-00Z.tar.gz"));
        assert!(rendered.contains("prune: false"));
        assert!(!rendered.contains('%'));

        // The shipped template still has its tokens.
        let template = std::fs::read_to_string(assets().join(RESTORE_MANIFEST)).unwrap();
        assert!(template.contains(TOKEN_BACKUP_FILE));
        assert!(template.contains(TOKEN_PRUNE));
    }

    #[test]
    fn missing_token_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let staged = stage(&assets(), BACKUP_MANIFEST, dir.path()).unwrap();
        let before = std::fs::read_to_string(&staged).unwrap();
        sed(TOKEN_PRUNE, "true", &staged).unwrap();
        assert_eq!(before, std::fs::read_to_string(&staged).unwrap());
    }

    #[test]
    fn replaces_every_occurrence() {
        assert_eq!(substitute("%A% and %A%", "%A%", "b"), "b and b");
    }

    #[test]
    fn idempotent_only_without_token_in_replacement() {
        let once = substitute("x: %T%", "%T%", "v");
        assert_eq!(substitute(&once, "%T%", "v"), once);

        let once = substitute("x: %T%", "%T%", "[%T%]");
        assert_ne!(substitute(&once, "%T%", "[%T%]"), once);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = sed(TOKEN_PRUNE, "true", &dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.to_string().starts_with("Unable to read manifest"));
        assert!(stage(dir.path(), RESTORE_MANIFEST, dir.path()).is_err());
    }
}
