//! Watch mode re-runs a single target task whenever a file matching one of
//! the configured source globs changes.
//!
//! ## The Loop
//!
//! 1. Every glob is split into a static root, which is watched recursively,
//!    and a pattern used to filter incoming events.
//! 2. Filesystem events are debounced by `notify-debouncer-full` and
//!    forwarded to the orchestrator over a channel.
//! 3. When a relevant batch arrives, every batch already queued is drained
//!    into the same burst and the target runs once. Events arriving during
//!    the run form the next burst, so runs are serialized and never stack.
//! 4. A failed run is logged and the loop keeps waiting for changes.

use std::collections::HashSet;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use notify::RecursiveMode;
use notify_debouncer_full::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::engine::Orchestrator;
use crate::error::WatchError;

impl<G: Send + Sync + 'static> Orchestrator<G> {
    /// Watches `sources` (globs relative to `root`) and runs `target` after
    /// each burst of changes. Only returns when the watcher itself fails.
    pub async fn watch<S: AsRef<str>>(
        &self,
        root: &Utf8Path,
        sources: &[S],
        target: &str,
    ) -> Result<(), WatchError> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut debouncer = new_debouncer(
            Duration::from_millis(250),
            None,
            move |result: DebounceEventResult| {
                let _ = tx.send(result);
            },
        )?;

        let mut watched = HashSet::new();
        let mut filters = Vec::new();
        for source in sources {
            match resolve_watch_path(root, source.as_ref()) {
                Ok((path, pattern)) => {
                    watched.insert(path);
                    filters.push(pattern);
                }
                Err(e) => tracing::warn!("not watching {}: {e}", source.as_ref()),
            }
        }

        let watched = collapse_watch_paths(watched);
        if watched.is_empty() {
            return Err(WatchError::Empty);
        }

        for path in watched {
            tracing::info!("watching {path}");
            debouncer.watch(path.as_std_path(), RecursiveMode::Recursive)?;
        }

        self.serve(&mut rx, &filters, target).await;
        Ok(())
    }

    /// Runs `target` once per burst of relevant batches received on `rx`,
    /// until every sender is gone. Returns how many runs were started.
    pub(crate) async fn serve(
        &self,
        rx: &mut UnboundedReceiver<DebounceEventResult>,
        filters: &[Pattern],
        target: &str,
    ) -> usize {
        let mut runs = 0;

        while let Some(batch) = rx.recv().await {
            let mut burst = vec![batch];
            while let Ok(batch) = rx.try_recv() {
                burst.push(batch);
            }

            let mut changed = false;
            for batch in burst {
                match batch {
                    Ok(events) => {
                        changed |= events
                            .iter()
                            .flat_map(|event| &event.event.paths)
                            .any(|path| filters.iter().any(|filter| filter.matches_path(path)));
                    }
                    Err(errors) => {
                        for error in errors {
                            tracing::error!("watch error: {error}");
                        }
                    }
                }
            }

            if !changed {
                continue;
            }

            runs += 1;
            tracing::info!("change detected, re-running {target}...");
            match self.run(target).await {
                Ok(diagnostics) => {
                    tracing::debug!("{diagnostics}");
                    tracing::info!("{target} complete, watching for changes...");
                }
                Err(e) => tracing::error!("{target} failed, watching for changes...\n{e}"),
            }
        }

        runs
    }
}

/// Splits a glob into a canonicalized static root (for watching) and a
/// compiled absolute pattern (for matching). Relative globs are resolved
/// against `root`.
pub(crate) fn resolve_watch_path(
    root: &Utf8Path,
    glob: &str,
) -> Result<(Utf8PathBuf, Pattern), WatchError> {
    let path = root.join(glob);

    let components: Vec<_> = path.components().collect();
    let split = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    let static_part: Utf8PathBuf = components.iter().take(split).collect();
    let suffix: Utf8PathBuf = components.iter().skip(split).collect();

    let absolute = static_part.canonicalize_utf8()?;

    // A concrete file is watched through its parent so that atomic writes,
    // which replace the file, are still seen.
    let (watch_root, pattern) = if suffix.as_str().is_empty() && absolute.is_file() {
        let parent = absolute.parent().unwrap_or(&absolute).to_path_buf();
        (parent, absolute)
    } else {
        let pattern = absolute.join(&suffix);
        (absolute, pattern)
    };

    let pattern = Pattern::new(pattern.as_str())?;
    Ok((watch_root, pattern))
}

/// Reduces a set of paths to the minimal set of recursive watch roots.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered: Vec<Utf8PathBuf> = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use notify::event::ModifyKind;
    use notify::{Event, EventKind};
    use notify_debouncer_full::DebouncedEvent;
    use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

    use super::*;
    use crate::core::{Environment, FailurePolicy, Mode};

    /// Shared with the watched task, which can feed the loop while it runs.
    #[derive(Default)]
    struct Changes {
        runs: AtomicUsize,
        feed: Mutex<Option<UnboundedSender<DebounceEventResult>>>,
    }

    impl Changes {
        /// Queues a change to `path` for the loop.
        fn touch(&self, path: &str) {
            if let Some(tx) = self.feed.lock().unwrap().as_ref() {
                tx.send(change(path)).unwrap();
            }
        }

        /// Drops the last sender so the loop returns once drained.
        fn close(&self) {
            self.feed.lock().unwrap().take();
        }
    }

    fn change(path: &str) -> DebounceEventResult {
        let event = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from(path));
        Ok(vec![DebouncedEvent::new(event, Instant::now())])
    }

    fn filters() -> Vec<Pattern> {
        vec![Pattern::new("/work/src/**/*").unwrap()]
    }

    /// A `dev-build` task whose first run touches sources three times and,
    /// when `fail_first`, fails. Every later run closes the feed.
    fn watched(
        fail_first: bool,
    ) -> (Orchestrator<Changes>, UnboundedReceiver<DebounceEventResult>) {
        let (tx, rx) = unbounded_channel();
        let changes = Changes {
            feed: Mutex::new(Some(tx)),
            ..Changes::default()
        };

        let env = Environment::new(Mode::Watch, changes);
        let mut tasks = Orchestrator::new(env, FailurePolicy::Continue);
        tasks
            .task("dev-build")
            .run(move |ctx| async move {
                let changes = ctx.data();
                let run = changes.runs.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::task::yield_now().await;

                if run > 1 {
                    changes.close();
                    return Ok(());
                }
                for file in ["a.ts", "b.ts", "a.ts"] {
                    changes.touch(&format!("/work/src/{file}"));
                }
                if fail_first {
                    anyhow::bail!("syntax error");
                }
                Ok(())
            })
            .unwrap();

        (tasks, rx)
    }

    #[tokio::test]
    async fn changes_during_a_run_give_one_follow_up() {
        let (tasks, mut rx) = watched(false);
        let changes = &tasks.env().data;
        changes.touch("/work/src/a.ts");
        changes.touch("/work/src/b.ts");

        let runs = tasks.serve(&mut rx, &filters(), "dev-build").await;

        assert_eq!(runs, 2);
        assert_eq!(changes.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_run_keeps_watching() {
        let (tasks, mut rx) = watched(true);
        tasks.env().data.touch("/work/src/a.ts");

        let runs = tasks.serve(&mut rx, &filters(), "dev-build").await;

        assert_eq!(runs, 2);
        assert!(tasks.has_failed());
    }

    #[tokio::test]
    async fn unrelated_changes_do_not_run() {
        let (tasks, mut rx) = watched(false);
        let changes = &tasks.env().data;
        changes.touch("/work/README.md");
        changes.touch("/elsewhere/src/a.ts");
        if let Some(tx) = changes.feed.lock().unwrap().as_ref() {
            let overflow = vec![notify::Error::generic("queue overflow")];
            tx.send(Err(overflow)).unwrap();
        }
        changes.close();

        let runs = tasks.serve(&mut rx, &filters(), "dev-build").await;

        assert_eq!(runs, 0);
        assert_eq!(changes.runs.load(Ordering::SeqCst), 0);
    }

    fn manifest_dir() -> Utf8PathBuf {
        Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .canonicalize_utf8()
            .unwrap()
    }

    #[test]
    fn concrete_file() {
        let root = manifest_dir();
        let (watch, pattern) = resolve_watch_path(&root, "Cargo.toml").unwrap();

        assert_eq!(watch, root);
        assert_eq!(pattern.as_str(), root.join("Cargo.toml"));
    }

    #[test]
    fn concrete_directory() {
        let root = manifest_dir();
        let (watch, pattern) = resolve_watch_path(&root, "src").unwrap();

        assert_eq!(watch, root.join("src"));
        assert_eq!(pattern.as_str(), root.join("src"));
    }

    #[test]
    fn directory_wildcard() {
        let root = manifest_dir();
        let (watch, pattern) = resolve_watch_path(&root, "src/**/*").unwrap();

        assert_eq!(watch, root.join("src"));
        assert_eq!(pattern.as_str(), root.join("src/**/*"));
        assert!(pattern.matches_path(root.join("src/engine/watch.rs").as_std_path()));
    }

    #[test]
    fn missing_root_is_an_error() {
        let root = manifest_dir();
        assert!(resolve_watch_path(&root, "test/**/*").is_err());
    }

    #[test]
    fn collapse_nested() {
        let paths = HashSet::from([
            Utf8PathBuf::from("/a"),
            Utf8PathBuf::from("/a/b"),
            Utf8PathBuf::from("/a/b/c"),
            Utf8PathBuf::from("/b"),
            Utf8PathBuf::from("/c/d"),
        ]);

        assert_eq!(
            collapse_watch_paths(paths),
            vec![
                Utf8PathBuf::from("/a"),
                Utf8PathBuf::from("/b"),
                Utf8PathBuf::from("/c/d")
            ]
        );
    }

    #[test]
    fn collapse_similar_names() {
        let paths = HashSet::from([Utf8PathBuf::from("/foo"), Utf8PathBuf::from("/foo-bar")]);

        // /foo-bar is not inside /foo
        assert_eq!(
            collapse_watch_paths(paths),
            vec![Utf8PathBuf::from("/foo"), Utf8PathBuf::from("/foo-bar")]
        );
    }
}
