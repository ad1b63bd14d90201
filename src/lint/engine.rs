//! The external lint engine and the sandbox it runs in.

use super::{parse_engine_output, DiagnosticMap};
use crate::error::{Error, Result};
use crate::util::{run_command_with_timeout, truncate};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Config names the engine would pick up from a checked-out corpus.
const ENGINE_CONFIG_NAMES: [&str; 3] = [".vale.ini", "vale.ini", ".vale"];

/// Token patterns skipped in Markdown and INI sources.
const TOKEN_IGNORES: &str =
    r"(\x60[^\n\x60]+\x60), ([^\n]+=[^\n]*), (\+[^\n]+\+), (http[^\n]+\[)";

/// An external checker that applies a ruleset to a list of files.
pub trait LintEngine: Send + Sync {
    /// Lint `files` using the ruleset configuration at `config`.
    ///
    /// Must give up once `timeout` has elapsed.
    fn check(&self, config: &Path, files: &[PathBuf], timeout: Duration) -> Result<DiagnosticMap>;
}

/// The `vale` command-line checker.
#[derive(Debug, Clone)]
pub struct ValeCli {
    program: String,
}

impl ValeCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl LintEngine for ValeCli {
    fn check(&self, config: &Path, files: &[PathBuf], timeout: Duration) -> Result<DiagnosticMap> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--config")
            .arg(config)
            .args(["--output", "JSON", "--no-exit"])
            .args(files);

        let output = run_command_with_timeout(&mut cmd, None, Some(timeout))
            .map_err(|e| Error::engine(format!("{}: {}", self.program, e)))?;
        if output.timed_out {
            return Err(Error::engine(format!(
                "timed out after {}s",
                timeout.as_secs()
            )));
        }
        if !output.success() && output.stdout.trim().is_empty() {
            return Err(Error::engine(format!(
                "{} exited with {:?}: {}",
                self.program,
                output.exit_code(),
                truncate(output.stderr.trim(), 240)
            )));
        }
        parse_engine_output(&output.stdout)
    }
}

/// Write an engine config that enables only the `namespace` style.
///
/// `styles_path` is written as given, so callers pass an absolute path.
pub fn write_engine_config(dest: &Path, styles_path: &Path, namespace: &str) -> Result<PathBuf> {
    let content = format!(
        "StylesPath = {styles}

MinAlertLevel = suggestion

IgnoredScopes = code, tt, img, url, a, body.id

SkippedScopes = script, style, pre, figure, code, tt, blockquote, listingblock, literalblock

Packages = {ns}

[*.adoc]
BasedOnStyles = {ns}

[*.md]
BasedOnStyles = {ns}
TokenIgnores = {ignores}

[*.ini]
BasedOnStyles = {ns}
TokenIgnores = {ignores}
",
        styles = styles_path.display(),
        ns = namespace,
        ignores = TOKEN_IGNORES,
    );
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, content)?;
    info!("Created temporary lint config: {}", dest.display());
    Ok(dest.to_path_buf())
}

/// Engine configs found in a working copy, renamed aside while a lint runs.
///
/// Dropping the guard puts every config back, whether the run finished,
/// failed, or panicked.
#[derive(Debug)]
pub struct HiddenConfigs {
    moved: Vec<(PathBuf, PathBuf)>,
}

impl HiddenConfigs {
    pub fn hide(root: &Path) -> Result<Self> {
        let mut guard = Self { moved: Vec::new() };
        for name in ENGINE_CONFIG_NAMES {
            let original = root.join(name);
            if !original.exists() {
                continue;
            }
            let hidden = root.join(format!(".{}.tmp-hidden", name));
            info!("Temporarily hiding {}", original.display());
            // On failure the guard drops here and restores what it already moved.
            fs::rename(&original, &hidden)?;
            guard.moved.push((hidden, original));
        }
        Ok(guard)
    }

    pub fn len(&self) -> usize {
        self.moved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moved.is_empty()
    }
}

impl Drop for HiddenConfigs {
    fn drop(&mut self) {
        for (hidden, original) in self.moved.drain(..).rev() {
            if !hidden.exists() {
                continue;
            }
            debug!("Restoring {}", original.display());
            if let Err(err) = fs::rename(&hidden, &original) {
                warn!(
                    "Failed to restore {} from {}: {}",
                    original.display(),
                    hidden.display(),
                    err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_engine_config_enables_only_namespace() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("vale-RedHat-only.ini");
        write_engine_config(&dest, Path::new("/abs/.vale/styles"), "RedHat").unwrap();
        let text = fs::read_to_string(&dest).unwrap();
        assert!(text.starts_with("StylesPath = /abs/.vale/styles\n"));
        assert!(text.contains("Packages = RedHat"));
        assert_eq!(text.matches("BasedOnStyles = RedHat").count(), 3);
        assert_eq!(text.matches("TokenIgnores = ").count(), 2);
        assert!(text.contains(r"(\x60[^\n\x60]+\x60)"));
    }

    #[test]
    fn test_hidden_configs_restored_on_drop() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".vale.ini"), "StylesPath = styles").unwrap();
        fs::create_dir_all(dir.path().join(".vale/styles")).unwrap();

        {
            let guard = HiddenConfigs::hide(dir.path()).unwrap();
            assert_eq!(guard.len(), 2);
            assert!(!dir.path().join(".vale.ini").exists());
            assert!(!dir.path().join(".vale").exists());
            assert!(dir.path().join("..vale.ini.tmp-hidden").exists());
        }

        assert_eq!(
            fs::read_to_string(dir.path().join(".vale.ini")).unwrap(),
            "StylesPath = styles"
        );
        assert!(dir.path().join(".vale/styles").is_dir());
    }

    #[test]
    fn test_hidden_configs_restored_after_panic() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("vale.ini"), "x").unwrap();
        let root = dir.path().to_path_buf();

        let result = std::panic::catch_unwind(move || {
            let _guard = HiddenConfigs::hide(&root).unwrap();
            panic!("lint blew up");
        });
        assert!(result.is_err());
        assert!(dir.path().join("vale.ini").exists());
    }

    #[test]
    fn test_hidden_configs_noop_without_configs() {
        let dir = tempdir().unwrap();
        let guard = HiddenConfigs::hide(dir.path()).unwrap();
        assert!(guard.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_vale_cli_missing_binary_is_engine_error() {
        let engine = ValeCli::new("definitely-not-a-real-vale-binary");
        let err = engine
            .check(
                Path::new("/tmp/none.ini"),
                &[PathBuf::from("a.adoc")],
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
    }
}
