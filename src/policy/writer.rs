//! Validated atomic publishing
//!
//! The single most important correctness property of the whole system lives
//! here: rendered text is written to a scratch file in the destination
//! directory, locked down to 0440 root:root, run through the external syntax
//! checker, and only on a clean exit renamed over the destination. The rename
//! is same-filesystem and atomic; on any failure the live file is untouched
//! and no scratch remains.

use crate::policy::config::CheckerConfig;
use crate::policy::errors::{ManagerError, PolicyResult};
use crate::policy::paths::{self, SudoPaths};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Publishes rendered sudoers text under an advisory lock
pub struct Publisher {
    lock_path: PathBuf,
    checker: Vec<String>,
    combined_base: Option<PathBuf>,
    apply_ownership: bool,
}

impl Publisher {
    pub fn new(paths: &SudoPaths, config: &CheckerConfig) -> Self {
        Self {
            lock_path: paths.lock_file(),
            checker: config.command.clone(),
            combined_base: config.combined_base.clone(),
            apply_ownership: config.apply_ownership,
        }
    }

    /// Validate and atomically publish `text` as `path`
    pub fn publish(&self, path: &Path, text: &str) -> PolicyResult<()> {
        let _lock = self.acquire_lock()?;

        let scratch = scratch_path(path);
        let result = self.write_validate_rename(path, &scratch, text);
        if result.is_err() {
            // Fail closed: never leave a scratch artifact behind
            let _ = fs::remove_file(&scratch);
            let _ = fs::remove_file(scratch.with_extension("driver.tmp"));
            if let Some(dir) = scratch.parent() {
                let _ = fs::remove_dir_all(dir.join(STAGING_DIR_NAME));
            }
        }
        result
    }

    /// Remove a managed rule file. Infrastructure files (aliases, hardening)
    /// are never removable through this path. Removing a file that does not
    /// exist is a successful no-op; returns whether anything was deleted.
    pub fn remove(&self, path: &Path) -> PolicyResult<bool> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if paths::is_infrastructure(&name) {
            return Err(ManagerError::validation(format!(
                "'{}' is an infrastructure file and cannot be removed",
                name
            )));
        }

        let _lock = self.acquire_lock()?;
        match fs::remove_file(path) {
            Ok(()) => {
                info!(file = %path.display(), "removed rule file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn write_validate_rename(&self, path: &Path, scratch: &Path, text: &str) -> PolicyResult<()> {
        fs::write(scratch, text)?;
        fs::set_permissions(scratch, fs::Permissions::from_mode(0o440))?;
        if self.apply_ownership {
            std::os::unix::fs::chown(scratch, Some(0), Some(0))?;
        }

        self.run_checker(path, scratch)?;

        fs::rename(scratch, path)?;
        info!(file = %path.display(), "published");
        Ok(())
    }

    /// Run the syntax checker against the scratch file, or against a staged
    /// combined view when a combined-check base is configured.
    fn run_checker(&self, path: &Path, scratch: &Path) -> PolicyResult<()> {
        let mut argv = self.checker.iter();
        let program = argv
            .next()
            .ok_or_else(|| ManagerError::usage("checker command is empty"))?;

        let view = match &self.combined_base {
            Some(base) => Some(self.build_combined_view(path, scratch, base)?),
            None => None,
        };
        let target = view.as_ref().map(|v| v.driver.as_path()).unwrap_or(scratch);

        debug!(checker = %program, target = %target.display(), "running syntax checker");
        let output = Command::new(program).args(argv).arg(target).output();

        if let Some(view) = &view {
            view.cleanup();
        }

        let output = output?;
        if output.status.success() {
            return Ok(());
        }

        let diagnostic = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let diagnostic = if diagnostic.is_empty() {
            format!("syntax checker exited with {}", output.status)
        } else {
            diagnostic
        };
        Err(ManagerError::syntax(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            diagnostic,
        ))
    }

    /// Stage the combined view the checker validates: a shadow of the rule
    /// directory with the scratch substituted for the file being replaced, so
    /// the old destination is never visible next to its replacement (sudoers
    /// treats alias redefinition as a hard parse error). The driver replays
    /// the base configuration with its includedir of the live rule directory
    /// redirected to the staged shadow.
    fn build_combined_view(
        &self,
        path: &Path,
        scratch: &Path,
        base: &Path,
    ) -> PolicyResult<CombinedView> {
        let dir = scratch
            .parent()
            .ok_or_else(|| ManagerError::validation("scratch path has no parent directory"))?;
        let dest_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let staging = dir.join(STAGING_DIR_NAME);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            // Dotted names (lock, scratch, driver) are invisible to sudo's
            // include scan and stay out of the view; the destination is
            // represented by the scratch, not its stale content.
            if name == dest_name || name.contains('.') {
                continue;
            }
            fs::copy(entry.path(), staging.join(&name))?;
        }
        fs::copy(scratch, staging.join(&dest_name))?;

        let staging_include = format!("@includedir {}", staging.display());
        let mut text = String::new();
        if base.is_file() {
            for line in fs::read_to_string(base)?.lines() {
                if includedir_target(line).is_some_and(|d| d == dir) {
                    text.push_str(&staging_include);
                } else {
                    text.push_str(line);
                }
                text.push('\n');
            }
        }
        if !text.lines().any(|l| l.trim() == staging_include) {
            text.push_str(&staging_include);
            text.push('\n');
        }

        let driver = scratch.with_extension("driver.tmp");
        fs::write(&driver, text)?;
        Ok(CombinedView { driver, staging })
    }

    /// Exclusive advisory lock held for the whole scratch-write → validate →
    /// rename window. Released when the returned handle drops.
    fn acquire_lock(&self) -> PolicyResult<File> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        lock.lock_exclusive()?;
        Ok(lock)
    }
}

/// Shadow directory for combined syntax checks. The dot keeps it invisible
/// to sudo's include scan and to the rule reader.
const STAGING_DIR_NAME: &str = ".staging.tmp";

/// Scratch artifacts of one combined check
struct CombinedView {
    driver: PathBuf,
    staging: PathBuf,
}

impl CombinedView {
    fn cleanup(&self) {
        let _ = fs::remove_file(&self.driver);
        let _ = fs::remove_dir_all(&self.staging);
    }
}

/// The directory an `@includedir`/`#includedir` line points at, if any
fn includedir_target(line: &str) -> Option<&Path> {
    let trimmed = line.trim();
    ["@includedir", "#includedir"]
        .iter()
        .find_map(|kw| trimmed.strip_prefix(kw))
        .map(|rest| Path::new(rest.trim()))
}

fn scratch_path(path: &Path) -> PathBuf {
    // The dot in the suffix also hides the scratch from sudo's include scan
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::config::CheckerConfig;
    use tempfile::TempDir;

    fn publisher(paths: &SudoPaths, checker: &str) -> Publisher {
        Publisher::new(
            paths,
            &CheckerConfig {
                command: vec![checker.to_string()],
                combined_base: None,
                apply_ownership: false,
            },
        )
    }

    fn fixture() -> (TempDir, SudoPaths) {
        let dir = TempDir::new().unwrap();
        let paths = SudoPaths::under_root(dir.path());
        fs::create_dir_all(&paths.sudoers_dir).unwrap();
        (dir, paths)
    }

    #[test]
    fn test_publish_success() {
        let (_dir, paths) = fixture();
        let target = paths.sudoers_dir.join("alice");

        publisher(&paths, "true")
            .publish(&target, "alice ALL=(root) ALL\n")
            .unwrap();

        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "alice ALL=(root) ALL\n"
        );
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o440);
        assert!(!scratch_path(&target).exists());
    }

    #[test]
    fn test_failed_check_leaves_destination_untouched() {
        let (_dir, paths) = fixture();
        let target = paths.sudoers_dir.join("alice");
        fs::write(&target, "original content\n").unwrap();

        let err = publisher(&paths, "false")
            .publish(&target, "candidate content\n")
            .unwrap_err();

        assert!(matches!(err, ManagerError::Syntax { .. }));
        assert_eq!(fs::read_to_string(&target).unwrap(), "original content\n");
        assert!(!scratch_path(&target).exists(), "scratch must be cleaned up");
    }

    #[test]
    fn test_missing_checker_is_io_error() {
        let (_dir, paths) = fixture();
        let target = paths.sudoers_dir.join("alice");

        let err = publisher(&paths, "/nonexistent/checker-binary")
            .publish(&target, "x\n")
            .unwrap_err();
        assert!(matches!(err, ManagerError::Io(_)));
        assert!(!target.exists());
        assert!(!scratch_path(&target).exists());
    }

    #[test]
    fn test_remove_idempotent() {
        let (_dir, paths) = fixture();
        let p = publisher(&paths, "true");
        let target = paths.sudoers_dir.join("alice");

        fs::write(&target, "x").unwrap();
        assert!(p.remove(&target).unwrap());
        assert!(!p.remove(&target).unwrap());
    }

    #[test]
    fn test_remove_refuses_infrastructure() {
        let (_dir, paths) = fixture();
        let p = publisher(&paths, "true");

        for file in [paths.alias_file(), paths.hardening_file()] {
            let err = p.remove(&file).unwrap_err();
            assert!(matches!(err, ManagerError::Validation(_)));
        }
    }

    #[test]
    fn test_combined_check_artifacts_are_cleaned_up() {
        let (dir, paths) = fixture();
        let base = dir.path().join("base-sudoers");
        fs::write(&base, "Defaults env_reset\n").unwrap();

        let p = Publisher::new(
            &paths,
            &CheckerConfig {
                command: vec!["true".to_string()],
                combined_base: Some(base),
                apply_ownership: false,
            },
        );
        let target = paths.sudoers_dir.join("alice");
        p.publish(&target, "alice ALL=(root) ALL\n").unwrap();

        let leftovers: Vec<_> = fs::read_dir(&paths.sudoers_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.contains("driver") || n.contains(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "leftover scratch: {:?}", leftovers);
    }

    #[test]
    fn test_combined_view_replaces_stale_destination() {
        let (dir, paths) = fixture();
        let alias_file = paths.alias_file();
        fs::write(&alias_file, "Cmnd_Alias OLD = /usr/bin/old\n").unwrap();
        fs::write(paths.sudoers_dir.join("alice"), "alice ALL=(root) ALL\n").unwrap();

        let base = dir.path().join("base-sudoers");
        fs::write(
            &base,
            format!(
                "Defaults env_reset\n@includedir {}\n",
                paths.sudoers_dir.display()
            ),
        )
        .unwrap();

        // The checker snapshots the staged view and the driver it was handed
        let capture = dir.path().join("capture");
        let script = r#"cp -r "$(dirname "$2")/.staging.tmp" "$1" && cp "$2" "$1/driver""#;
        let p = Publisher::new(
            &paths,
            &CheckerConfig {
                command: vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    script.to_string(),
                    "sh".to_string(),
                    capture.to_string_lossy().into_owned(),
                ],
                combined_base: Some(base),
                apply_ownership: false,
            },
        );
        p.publish(&alias_file, "Cmnd_Alias NEW = /usr/bin/new\n")
            .unwrap();

        // The staged view holds the candidate under the destination name,
        // never the stale content, and carries the sibling fragments
        assert_eq!(
            fs::read_to_string(capture.join("00-managed-aliases")).unwrap(),
            "Cmnd_Alias NEW = /usr/bin/new\n"
        );
        assert!(capture.join("alice").exists());

        // The driver replays the base with its includedir redirected at the
        // staged shadow, so the live directory is not validated twice
        let driver = fs::read_to_string(capture.join("driver")).unwrap();
        let staging_include = format!(
            "@includedir {}",
            paths.sudoers_dir.join(".staging.tmp").display()
        );
        assert!(driver.contains("Defaults env_reset"));
        assert!(driver.lines().any(|l| l == staging_include));
        let live_include = format!("@includedir {}", paths.sudoers_dir.display());
        assert!(!driver.lines().any(|l| l == live_include));

        // And everything staged is gone once the publish lands
        assert!(!paths.sudoers_dir.join(".staging.tmp").exists());
        assert_eq!(
            fs::read_to_string(&alias_file).unwrap(),
            "Cmnd_Alias NEW = /usr/bin/new\n"
        );
    }
}
