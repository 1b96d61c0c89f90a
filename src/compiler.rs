//! Source Compiler Adapter.
//!
//! Wraps an external compiler behind the [`Transpile`] trait and turns a
//! project tree into a stream of [`CompiledUnit`]s. Units are sent as soon as
//! their source was transformed; errors are recorded in a [`CompileReport`]
//! and never stop the stream, so partial output is still produced.

use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::core::BoxFuture;
use crate::error::{CompileError, ConfigError};
use crate::nls::FileMetadata;

/// Subset of a `tsconfig.json` the adapter cares about.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    pub compiler_options: CompilerOptions,
    /// Source globs relative to the workspace root. Empty means every `.ts`
    /// file below `rootDir`.
    pub include: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerOptions {
    pub root_dir: Utf8PathBuf,
    pub out_dir: Utf8PathBuf,
    pub source_map: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            root_dir: "src".into(),
            out_dir: "out".into(),
            source_map: false,
        }
    }
}

impl ProjectConfig {
    /// Reads the project file. A missing file yields the defaults.
    pub fn load(root: &Utf8Path, path: &Utf8Path) -> Result<Self, ConfigError> {
        let path = root.join(path);
        if !path.exists() {
            tracing::debug!("no project file at {path}, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    fn sources(&self) -> Vec<String> {
        if self.include.is_empty() {
            vec![format!("{}/**/*.ts", self.compiler_options.root_dir)]
        } else {
            self.include.clone()
        }
    }
}

/// One source file handed to a [`Transpile`] implementation.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: Utf8PathBuf,
    /// Path relative to `rootDir`.
    pub relative: Utf8PathBuf,
    pub contents: String,
}

/// Version 3 source map, without embedded sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub source_root: String,
    pub sources: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    /// Maps every emitted line onto the same line of the source.
    fn lines(file: &str, source: String, lines: usize) -> Self {
        let mut mappings = String::new();
        for line in 0..lines {
            if line > 0 {
                mappings.push(';');
            }
            mappings.push_str(if line == 0 { "AAAA" } else { "AACA" });
        }

        Self {
            version: 3,
            file: file.to_string(),
            source_root: ".".into(),
            sources: vec![source],
            names: Vec::new(),
            mappings,
        }
    }
}

/// A compiled file, relative to the output root.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledUnit {
    pub path: Utf8PathBuf,
    pub contents: String,
    pub source_map: Option<SourceMap>,
    /// Strings extracted by the localization bundler.
    pub nls: Option<FileMetadata>,
}

impl CompiledUnit {
    pub fn new(path: impl Into<Utf8PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            source_map: None,
            nls: None,
        }
    }

    /// Unit path without its extension, e.g. `sub/extension`.
    pub fn module(&self) -> String {
        self.path.with_extension("").into_string()
    }
}

/// The external compiler seam.
pub trait Transpile: Send + Sync {
    fn transpile<'a>(
        &'a self,
        source: &'a SourceFile,
    ) -> BoxFuture<'a, Result<String, CompileError>>;

    /// Extension of the emitted files, `None` keeps the source extension.
    fn extension(&self) -> Option<&str> {
        Some("js")
    }
}

/// Runs `<program> <args...> <file>` per source and takes stdout as the
/// compiled text.
#[derive(Debug, Clone)]
pub struct ExternalCompiler {
    pub program: String,
    pub args: Vec<String>,
}

impl Transpile for ExternalCompiler {
    fn transpile<'a>(
        &'a self,
        source: &'a SourceFile,
    ) -> BoxFuture<'a, Result<String, CompileError>> {
        Box::pin(async move {
            let output = Command::new(&self.program)
                .args(&self.args)
                .arg(source.path.as_str())
                .output()
                .await
                .map_err(|e| CompileError::Spawn {
                    program: self.program.clone(),
                    source: e,
                })?;

            if !output.status.success() {
                return Err(CompileError::Failed {
                    file: source.path.clone(),
                    message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }
}

/// Copies sources unchanged. Used for projects whose sources are already
/// JavaScript.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopySources;

impl Transpile for CopySources {
    fn transpile<'a>(
        &'a self,
        source: &'a SourceFile,
    ) -> BoxFuture<'a, Result<String, CompileError>> {
        Box::pin(async move { Ok(source.contents.clone()) })
    }

    fn extension(&self) -> Option<&str> {
        None
    }
}

/// Compile errors collected while the stream runs.
#[derive(Debug, Clone, Default)]
pub struct CompileReport(Arc<Mutex<Vec<CompileError>>>);

impl CompileReport {
    fn record(&self, error: CompileError) {
        tracing::error!("{error}");
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.0.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    pub fn take(&self) -> Vec<CompileError> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

pub struct CompileStream {
    pub units: mpsc::Receiver<CompiledUnit>,
    pub report: CompileReport,
}

/// Configured compiler, built once and reused by every build.
#[derive(Clone)]
pub struct Compiler {
    root: Utf8PathBuf,
    project: Arc<ProjectConfig>,
    transpiler: Arc<dyn Transpile>,
}

impl Compiler {
    pub fn new(
        root: impl Into<Utf8PathBuf>,
        project: ProjectConfig,
        transpiler: Arc<dyn Transpile>,
    ) -> Self {
        Self {
            root: root.into(),
            project: Arc::new(project),
            transpiler,
        }
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    /// Absolute output root.
    pub fn out_dir(&self) -> Utf8PathBuf {
        self.root.join(&self.project.compiler_options.out_dir)
    }

    /// Starts compiling the project. Units arrive on the returned channel in
    /// source path order; the report is complete once the channel closed.
    pub fn compile(&self) -> CompileStream {
        let (tx, units) = mpsc::channel(16);
        let report = CompileReport::default();

        let this = self.clone();
        let errors = report.clone();
        tokio::spawn(async move { this.produce(tx, errors).await });

        CompileStream { units, report }
    }

    async fn produce(self, tx: mpsc::Sender<CompiledUnit>, report: CompileReport) {
        let patterns: Vec<String> = self
            .project
            .sources()
            .iter()
            .map(|pattern| self.root.join(pattern).into_string())
            .collect();

        let search = tokio::task::spawn_blocking(move || find_sources(&patterns));
        let files = match search.await {
            Ok(Ok(files)) => files,
            Ok(Err(e)) => return report.record(e),
            Err(e) => {
                tracing::error!("source discovery stopped unexpectedly: {e}");
                return report.record(CompileError::Read {
                    path: self.root.clone(),
                    source: std::io::Error::other(e),
                });
            }
        };

        tracing::debug!("compiling {} source file(s)", files.len());

        for path in files {
            match self.compile_file(&path).await {
                Ok(unit) => {
                    if tx.send(unit).await.is_err() {
                        // receiver gone
                        return;
                    }
                }
                Err(e) => report.record(e),
            }
        }
    }

    async fn compile_file(&self, path: &Utf8Path) -> Result<CompiledUnit, CompileError> {
        let root_dir = self.root.join(&self.project.compiler_options.root_dir);
        let relative = path
            .strip_prefix(&root_dir)
            .map_err(|_| CompileError::OutsideRoot {
                path: path.to_path_buf(),
                root: root_dir.clone(),
            })?
            .to_path_buf();

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CompileError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let source = SourceFile {
            path: path.to_path_buf(),
            relative,
            contents,
        };

        let compiled = self.transpiler.transpile(&source).await?;

        let output = match self.transpiler.extension() {
            Some(extension) => source.relative.with_extension(extension),
            None => source.relative.clone(),
        };

        let source_map = self.project.compiler_options.source_map.then(|| {
            let out_dir = self.project.compiler_options.out_dir.join(&output);
            let out_parent = out_dir.parent().unwrap_or(Utf8Path::new(""));
            let from_root = self
                .project
                .compiler_options
                .root_dir
                .join(&source.relative);
            let file = output.file_name().unwrap_or(output.as_str());
            SourceMap::lines(
                file,
                relative_path(out_parent, &from_root),
                compiled.lines().count(),
            )
        });

        Ok(CompiledUnit {
            path: output,
            contents: compiled,
            source_map,
            nls: None,
        })
    }
}

fn find_sources(patterns: &[String]) -> Result<Vec<Utf8PathBuf>, CompileError> {
    let mut files = Vec::new();
    for pattern in patterns {
        for entry in glob::glob(pattern)? {
            let path = Utf8PathBuf::try_from(entry?)?;
            if path.is_file() && !path.as_str().ends_with(".d.ts") {
                files.push(path);
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Path of `to` as seen from the directory `from`, both relative to the same
/// base.
fn relative_path(from: &Utf8Path, to: &Utf8Path) -> String {
    let from: Vec<_> = from
        .components()
        .filter(|c| *c != Utf8Component::CurDir)
        .collect();
    let to: Vec<_> = to
        .components()
        .filter(|c| *c != Utf8Component::CurDir)
        .collect();

    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend(to[common..].iter().map(|c| c.as_str()));
    parts.join("/")
}
