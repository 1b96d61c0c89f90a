//! The `lint` task. Findings are reported, never fatal.

use camino::{Utf8Path, Utf8PathBuf};
use tokio::process::Command;

use crate::config::LintConfig;
use crate::error::LintError;

#[derive(Debug, Default)]
pub struct LintReport {
    pub files: usize,
    /// Output lines of the linter.
    pub findings: Vec<String>,
    /// Whether the linter itself was happy.
    pub clean: bool,
}

/// Runs `<program> <args...> <files...>` over every file matching the lint
/// sources.
pub async fn lint(root: &Utf8Path, config: &LintConfig) -> Result<LintReport, LintError> {
    let patterns: Vec<String> = config
        .sources
        .iter()
        .map(|pattern| root.join(pattern).into_string())
        .collect();

    let files = tokio::task::spawn_blocking(move || -> Result<Vec<Utf8PathBuf>, LintError> {
        let mut files = Vec::new();
        for pattern in &patterns {
            for entry in glob::glob(pattern)? {
                files.push(Utf8PathBuf::try_from(entry?)?);
            }
        }
        files.sort();
        files.dedup();
        Ok(files)
    })
    .await??;

    if files.is_empty() {
        tracing::info!("nothing to lint");
        return Ok(LintReport {
            clean: true,
            ..LintReport::default()
        });
    }

    let relative: Vec<&str> = files
        .iter()
        .map(|file| file.strip_prefix(root).map_or(file.as_str(), Utf8Path::as_str))
        .collect();

    let output = Command::new(&config.program)
        .args(&config.args)
        .args(&relative)
        .current_dir(root)
        .output()
        .await
        .map_err(|source| LintError::Spawn {
            program: config.program.clone(),
            source,
        })?;

    let findings: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .chain(String::from_utf8_lossy(&output.stderr).lines())
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();

    for finding in &findings {
        tracing::warn!("{finding}");
    }

    tracing::info!(
        "linted {} file(s), {} finding(s)",
        files.len(),
        findings.len()
    );

    Ok(LintReport {
        files: files.len(),
        findings,
        clean: output.status.success(),
    })
}
