use camino::Utf8PathBuf;
use thiserror::Error;

pub use anyhow::Error as RuntimeError;

#[derive(Debug, Error)]
pub enum ExtforgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Failed to build runtime")]
    RuntimeBuild(#[from] std::io::Error),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read config file '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't parse config file '{path}'.\n{source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}

/// Errors raised while declaring tasks or resolving names.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Task '{0}' is already declared")]
    Duplicate(String),

    #[error("Declaring '{task}' would create a cycle through '{via}'")]
    Cycle { task: String, via: String },

    #[error("Task '{0}' not found")]
    NotFound(String),

    #[error("Task '{task}' is required by '{required_by}' but was never declared")]
    Undeclared { task: String, required_by: String },

    #[error("Sequence '{sequence}' can't be used as a prerequisite of '{task}'")]
    SequenceAsPrerequisite { task: String, sequence: String },
}

/// One failed task action.
#[derive(Debug, Error)]
#[error("Task '{task}':\n{error:#}")]
pub struct TaskFailure {
    pub task: String,
    pub error: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{} task(s) failed.\n{}", .0.len(), list_failures(.0))]
    Failed(Vec<TaskFailure>),

    #[error(transparent)]
    Sequence(Box<SequenceError>),
}

impl RunError {
    /// Names of all tasks whose action failed.
    pub fn failed_tasks(&self) -> Vec<&str> {
        match self {
            RunError::Failed(failures) => failures.iter().map(|f| f.task.as_str()).collect(),
            RunError::Sequence(sequence) => sequence.source.failed_tasks(),
            RunError::Graph(_) => vec![],
        }
    }
}

impl From<SequenceError> for RunError {
    fn from(value: SequenceError) -> Self {
        RunError::Sequence(Box::new(value))
    }
}

fn list_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A stage of a strictly serial sequence rejected; later stages never ran.
#[derive(Debug, Error)]
#[error("Sequence halted at stage {position} '{stage}':\n{source}")]
pub struct SequenceError {
    pub stage: String,
    pub position: usize,
    pub source: RunError,
}

/// Errors from the external compiler. These never abort the compile stream;
/// they are collected and inspected once the stream completes.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Couldn't read source '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Source '{path}' is outside of the root directory '{root}'")]
    OutsideRoot {
        path: Utf8PathBuf,
        root: Utf8PathBuf,
    },

    #[error("Couldn't start compiler '{program}'.\n{source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{file}: {message}")]
    Failed { file: Utf8PathBuf, message: String },
}

/// Fatal errors of the localization bundler.
#[derive(Debug, Error)]
pub enum BundlingError {
    #[error("{file}:{line}: malformed localize call: {reason}")]
    Malformed {
        file: Utf8PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{file}: duplicate localize key '{key}'")]
    DuplicateKey { file: Utf8PathBuf, key: String },

    #[error("Couldn't read resource file '{path}'.\n{source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed resource file '{path}'.\n{source}")]
    Resource {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },

    #[error("Malformed resource file '{path}': {reason}")]
    ResourceShape { path: Utf8PathBuf, reason: String },

    #[error("Couldn't serialize '{path}'.\n{source}")]
    Serialize {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Couldn't join a blocking task.\n{0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Couldn't write '{path}'.\n{source}")]
    Write {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{} compile error(s):\n{}", .0.len(), list_compile(.0))]
    Compile(Vec<CompileError>),

    #[error(transparent)]
    Bundling(#[from] BundlingError),

    #[error("Couldn't write '{path}'.\n{source}")]
    Write {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't remove '{path}'.\n{source}")]
    Remove {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Output writer stopped unexpectedly.\n{0}")]
    Join(#[from] tokio::task::JoinError),
}

fn list_compile(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Couldn't list dependency root '{path}'.\n{source}")]
    ReadDir {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't stat '{path}'.\n{source}")]
    Stat {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Symbolic link found: {path}")]
    LinkedModule { path: Utf8PathBuf },

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Integrity check stopped unexpectedly.\n{0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum XlfError {
    #[error("Couldn't parse XLF.\n{0}")]
    Parse(String),

    #[error("Couldn't write XLF.\n{0}")]
    Write(String),

    #[error("XLF element <{element}> is missing attribute '{attribute}'")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("XLF file '{original}' doesn't name a path inside the resource folder")]
    UnsafeOriginal { original: String },
}

/// One language that failed to synchronize.
#[derive(Debug, Error)]
#[error("{language}: {error}")]
pub struct LanguageFailure {
    pub language: String,
    pub error: SyncError,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No access token for the translation service, set TRANSIFEX_API_TOKEN")]
    MissingToken,

    #[error("Translation service rejected the credentials ({status}) for {url}")]
    Auth { url: String, status: u16 },

    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed.\n{source}")]
    Http { url: String, source: reqwest::Error },

    #[error(transparent)]
    Xlf(#[from] XlfError),

    #[error(transparent)]
    Bundling(#[from] BundlingError),

    #[error("Couldn't access '{path}'.\n{source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Synchronization stopped unexpectedly.\n{0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{} of {total} language(s) failed:\n{}", failures.len(), list_languages(failures))]
    Partial {
        total: usize,
        failures: Vec<LanguageFailure>,
    },
}

fn list_languages(failures: &[LanguageFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Couldn't read manifest '{path}'.\n{source}")]
    Manifest {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed manifest '{path}'.\n{source}")]
    ManifestFormat {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },

    #[error("Couldn't start '{program}'.\n{source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}.\n{stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum LintError {
    #[error("Couldn't start linter '{program}'.\n{source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Lint stopped unexpectedly.\n{0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),

    #[error(transparent)]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Nothing to watch, none of the source globs resolved")]
    Empty,
}
