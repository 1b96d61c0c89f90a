//! One build: compile, localize, write.

use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};

use crate::compiler::Compiler;
use crate::error::{BuildError, CompileError};
use crate::nls::{Artifact, Localization};
use crate::output::OutputSink;

#[derive(Debug, Default)]
pub struct BuildSummary {
    /// Compiled units that reached the output.
    pub units: usize,
    /// Every file written, absolute.
    pub written: Vec<Utf8PathBuf>,
    /// Compile errors tolerated because the build wasn't fail-fast.
    pub compile_errors: Vec<CompileError>,
}

/// Compiles the project, runs the units through the localization strategy and
/// writes everything out.
///
/// Compile errors never stop the stream, so partial output is always written.
/// With `fail_on_error` they are returned once the output is complete,
/// otherwise they end up in the summary. Bundling errors abort immediately.
pub async fn build(
    compiler: &Compiler,
    root: &Utf8Path,
    localization: &Localization,
    fail_on_error: bool,
) -> Result<BuildSummary, BuildError> {
    let s = Instant::now();

    let mut stream = compiler.compile();
    let mut pipeline = localization.pipeline();
    let mut sink = OutputSink::new(root, compiler.out_dir());
    let mut units = 0;

    while let Some(unit) = stream.units.recv().await {
        units += 1;
        for artifact in pipeline.push(Artifact::Unit(unit))? {
            sink.write(artifact)?;
        }
    }

    for artifact in pipeline.finish()? {
        sink.write(artifact)?;
    }

    let written = sink.finish().await?;
    let compile_errors = stream.report.take();

    tracing::info!(
        "built {units} unit(s), wrote {} file(s) {}",
        written.len(),
        crate::utils::as_overhead(s)
    );

    if fail_on_error && !compile_errors.is_empty() {
        return Err(BuildError::Compile(compile_errors));
    }

    if !compile_errors.is_empty() {
        tracing::warn!(
            "build finished with {} compile error(s)",
            compile_errors.len()
        );
    }

    Ok(BuildSummary {
        units,
        written,
        compile_errors,
    })
}

/// Copies files matching `scripts` (globs relative to `root`) into
/// `out_dir`, keeping their path relative to the root.
pub async fn copy_scripts(
    root: &Utf8Path,
    scripts: &[Utf8PathBuf],
    out_dir: &Utf8Path,
) -> Result<Vec<Utf8PathBuf>, BuildError> {
    let patterns: Vec<String> = scripts
        .iter()
        .map(|script| root.join(script).into_string())
        .collect();

    let files = tokio::task::spawn_blocking(move || glob_files(&patterns))
        .await??;

    let mut copied = Vec::with_capacity(files.len());
    for file in files {
        let Ok(relative) = file.strip_prefix(root) else {
            continue;
        };
        let target = out_dir.join(relative);

        let contents = tokio::fs::read(&file).await.map_err(|source| BuildError::Write {
            path: file.clone(),
            source,
        })?;
        crate::output::write_file(&target, &contents).await?;

        // keep the executable bit of shell scripts
        if let Ok(metadata) = tokio::fs::metadata(&file).await {
            let _ = tokio::fs::set_permissions(&target, metadata.permissions())
                .await;
        }

        tracing::debug!("copied {relative}");
        copied.push(target);
    }

    if copied.is_empty() {
        tracing::warn!("no scripts matched {scripts:?}");
    }

    Ok(copied)
}

/// Removes the output root and every file matching `patterns`.
pub async fn clean(
    root: &Utf8Path,
    out_dir: &Utf8Path,
    patterns: Vec<String>,
) -> Result<Vec<Utf8PathBuf>, BuildError> {
    let mut removed = Vec::new();

    let out = root.join(out_dir);
    if tokio::fs::try_exists(&out).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&out)
            .await
            .map_err(|source| BuildError::Remove {
                path: out.clone(),
                source,
            })?;
        removed.push(out);
    }

    let patterns: Vec<String> = patterns
        .iter()
        .map(|pattern| root.join(pattern).into_string())
        .collect();
    let files = tokio::task::spawn_blocking(move || glob_files(&patterns))
        .await??;

    for file in files {
        tokio::fs::remove_file(&file)
            .await
            .map_err(|source| BuildError::Remove {
                path: file.clone(),
                source,
            })?;
        removed.push(file);
    }

    Ok(removed)
}

fn glob_files(patterns: &[String]) -> Result<Vec<Utf8PathBuf>, BuildError> {
    let mut files = Vec::new();
    for pattern in patterns {
        for entry in glob::glob(pattern)? {
            let path = Utf8PathBuf::try_from(entry?)?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}
