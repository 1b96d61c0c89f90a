use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Atomic reference-counted string type used for identifiers.
pub(crate) type ArcStr = Arc<str>;

/// A boxed, sendable future. Used at the trait seams where an external
/// service (compiler, translation service) is driven asynchronously.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result from a single executed task.
pub type TaskResult<T = ()> = anyhow::Result<T>;

/// A 32-byte BLAKE3 hash used for content fingerprints.
///
/// The metadata header carries one of these over the metadata index, so two
/// builds over the same sources produce byte-identical headers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub(crate) fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for &byte in &self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// The mode in which the orchestrator is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run the requested task once and exit.
    Build,
    /// Keep running, re-triggering a task whenever sources change.
    Watch,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Build => f.write_str("build"),
            Mode::Watch => f.write_str("watch"),
        }
    }
}

/// How the scheduler reacts to a failing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure. Tasks still in flight are dropped and the
    /// run reports the failing task.
    #[default]
    FailFast,
    /// Skip everything that depends on the failed task, let independent
    /// branches finish, then report every failure together.
    Continue,
}

/// Global state available to all tasks.
///
/// # Type Parameters
///
/// * `G`: The type of the user-defined global data. Must be `Send + Sync`.
#[derive(Clone)]
pub struct Environment<G: Send + Sync = ()> {
    /// The name of the orchestrator (defaults to "extforge").
    pub generator: &'static str,
    /// The current mode (Build or Watch).
    pub mode: Mode,
    /// User-defined global data.
    pub data: G,
}

impl<G: Send + Sync> Environment<G> {
    pub fn new(mode: Mode, data: G) -> Self {
        Self {
            generator: "extforge",
            mode,
            data,
        }
    }
}

impl<G: Send + Sync> std::fmt::Debug for Environment<G>
where
    G: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("generator", &self.generator)
            .field("mode", &self.mode)
            .field("data", &self.data)
            .finish()
    }
}
