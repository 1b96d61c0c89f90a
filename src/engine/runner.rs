use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, Reversed};
use tokio::task::JoinSet;
use tracing::{Instrument, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::{FailurePolicy, TaskResult};
use crate::engine::{Diagnostics, Orchestrator, TaskContext, TaskExecution};
use crate::error::{GraphError, RunError, SequenceError, TaskFailure};

type Outcome = (Instant, Duration, TaskResult);

impl<G: Send + Sync + 'static> Orchestrator<G> {
    /// Runs a declared task after its transitive prerequisites.
    ///
    /// Independent branches run concurrently on the current runtime. With
    /// [`FailurePolicy::FailFast`] the first failing action ends the run and
    /// whatever is still in flight is dropped. With
    /// [`FailurePolicy::Continue`] the dependents of a failed task are
    /// skipped, the rest of the graph runs to completion and all failures are
    /// reported together.
    pub async fn run(&self, name: &str) -> Result<Diagnostics, RunError> {
        let pending = self.closure(name)?;

        let span = tracing::info_span!("run", task = name);
        span.pb_set_length(pending.len() as u64);
        span.pb_set_style(&crate::utils::style_bar());
        span.pb_set_message(&format!("Running {name}"));

        self.schedule(pending).instrument(span).await
    }

    /// Runs tasks strictly one after another. Each stage, including its
    /// prerequisites, completes before the next one begins. The first
    /// rejected stage halts the sequence and is returned.
    pub async fn run_sequence<S: AsRef<str>>(
        &self,
        stages: &[S],
    ) -> Result<Diagnostics, SequenceError> {
        let mut diagnostics = Diagnostics::default();

        for (position, stage) in stages.iter().enumerate() {
            let stage = stage.as_ref();
            tracing::info!("stage {}/{}: {stage}", position + 1, stages.len());

            match self.run(stage).await {
                Ok(done) => diagnostics.merge(done),
                Err(source) => {
                    return Err(SequenceError {
                        stage: stage.to_string(),
                        position: position + 1,
                        source,
                    });
                }
            }
        }

        Ok(diagnostics)
    }

    /// Runs a registered sequence or a declared task, whichever `name` is.
    pub async fn invoke(&self, name: &str) -> Result<Diagnostics, RunError> {
        match self.sequences.get(name) {
            Some(stages) => Ok(self.run_sequence(stages).await?),
            None => self.run(name).await,
        }
    }

    /// Collects `name` and everything it transitively depends on.
    fn closure(&self, name: &str) -> Result<HashSet<NodeIndex>, GraphError> {
        let target = match self.names.get(name) {
            Some(&index) if self.graph[index].declared => index,
            _ => return Err(GraphError::NotFound(name.to_string())),
        };

        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, target);
        let mut pending = HashSet::new();

        while let Some(index) = dfs.next(reversed) {
            if !self.graph[index].declared {
                let required_by = self
                    .graph
                    .neighbors_directed(index, Direction::Outgoing)
                    .find(|dependent| pending.contains(dependent))
                    .map_or(name, |dependent| &*self.graph[dependent].name);

                return Err(GraphError::Undeclared {
                    task: self.graph[index].name.to_string(),
                    required_by: required_by.to_string(),
                });
            }
            pending.insert(index);
        }

        Ok(pending)
    }

    /// Dependency-counting scheduler. A node becomes ready once all of its
    /// prerequisites inside `pending` completed; grouping nodes complete
    /// immediately, actions are spawned and awaited as they finish.
    async fn schedule(&self, pending: HashSet<NodeIndex>) -> Result<Diagnostics, RunError> {
        let mut counts: HashMap<NodeIndex, usize> = pending
            .iter()
            .map(|&index| {
                let count = self
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .filter(|dependency| pending.contains(dependency))
                    .count();
                (index, count)
            })
            .collect();

        let mut ready: VecDeque<NodeIndex> = counts
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(&index, _)| index)
            .collect();

        let mut running: JoinSet<Outcome> = JoinSet::new();
        let mut spawned = HashMap::new();
        let mut skipped = HashSet::new();
        let mut failures = Vec::new();
        let mut diagnostics = Diagnostics::default();
        let style = crate::utils::style_task();

        loop {
            while let Some(index) = ready.pop_front() {
                let node = &self.graph[index];

                let Some(action) = &node.action else {
                    Span::current().pb_inc(1);
                    self.release(index, &pending, &skipped, &mut counts, &mut ready);
                    continue;
                };

                let context = TaskContext {
                    env: self.env.clone(),
                    name: node.name.clone(),
                };
                let future = action(context);

                let span = tracing::info_span!("task", name = &*node.name);
                span.pb_set_style(&style);
                span.pb_set_message(&format!("Running {}", node.name));

                let handle = running.spawn(
                    async move {
                        let start = Instant::now();
                        let result = future.await;
                        (start, start.elapsed(), result)
                    }
                    .instrument(span),
                );
                spawned.insert(handle.id(), index);
            }

            let Some(joined) = running.join_next_with_id().await else {
                break;
            };

            let (id, result) = match joined {
                Ok((id, (start, duration, result))) => {
                    if let Some(&index) = spawned.get(&id) {
                        let name = self.graph[index].name.clone();
                        tracing::debug!("finished {name} in {duration:.2?}");
                        diagnostics
                            .execution_times
                            .insert(name, TaskExecution { start, duration });
                    }
                    (id, result)
                }
                Err(error) => {
                    let id = error.id();
                    let result = Err(match error.try_into_panic() {
                        Ok(panic) => anyhow::anyhow!("Task panicked: {}", panic_message(&*panic)),
                        Err(error) => anyhow::anyhow!("Task was cancelled: {error}"),
                    });
                    (id, result)
                }
            };

            let Some(index) = spawned.remove(&id) else {
                continue;
            };
            Span::current().pb_inc(1);

            let error = match result {
                Ok(()) => {
                    self.release(index, &pending, &skipped, &mut counts, &mut ready);
                    continue;
                }
                Err(error) => error,
            };

            self.failed.store(true, Ordering::SeqCst);
            let task = self.graph[index].name.to_string();
            tracing::error!("task {task} failed: {error:#}");

            let failure = TaskFailure { task, error };

            match self.policy {
                FailurePolicy::FailFast => return Err(RunError::Failed(vec![failure])),
                FailurePolicy::Continue => {
                    failures.push(failure);

                    let mut dfs = Dfs::new(&self.graph, index);
                    dfs.next(&self.graph);
                    while let Some(dependent) = dfs.next(&self.graph) {
                        if pending.contains(&dependent) && skipped.insert(dependent) {
                            let name = self.graph[dependent].name.clone();
                            tracing::warn!("skipping {name}, a prerequisite failed");
                            diagnostics.skipped.push(name);
                        }
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(diagnostics)
        } else {
            Err(RunError::Failed(failures))
        }
    }

    fn release(
        &self,
        index: NodeIndex,
        pending: &HashSet<NodeIndex>,
        skipped: &HashSet<NodeIndex>,
        counts: &mut HashMap<NodeIndex, usize>,
        ready: &mut VecDeque<NodeIndex>,
    ) {
        for dependent in self.graph.neighbors_directed(index, Direction::Outgoing) {
            if !pending.contains(&dependent) || skipped.contains(&dependent) {
                continue;
            }
            if let Some(count) = counts.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(dependent);
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown payload")
    }
}
