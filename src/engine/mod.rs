//! The task graph.
//!
//! Tasks are declared by name with an ordered list of prerequisite names and
//! an optional asynchronous action. Declarations form a Directed Acyclic Graph
//! stored in a `petgraph::Graph`, edges pointing from a prerequisite to the
//! task that depends on it. Cycles are rejected at declaration time, so the
//! runner can always rely on a topological order existing.
//!
//! ## Forward references
//!
//! A prerequisite may be named before it is declared. Such a name becomes a
//! placeholder node; declaring it later fills the node in. Running a task
//! whose prerequisites still contain a placeholder is an error, which keeps
//! typos from silently turning into no-op tasks.
//!
//! ## Sequences
//!
//! Besides tasks, named sequences can be registered. A sequence runs a list of
//! tasks strictly one after another (see [`Orchestrator::run_sequence`]) and
//! can't itself appear as a prerequisite.

mod diagnostics;
mod runner;
#[cfg(feature = "live")]
mod watch;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use petgraph::Graph;
use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;

use crate::core::{ArcStr, BoxFuture, Environment, FailurePolicy, TaskResult};
use crate::error::GraphError;

pub use diagnostics::{Diagnostics, TaskExecution};

/// Type-erased task action.
pub type Action<G> = Arc<dyn Fn(TaskContext<G>) -> BoxFuture<'static, TaskResult> + Send + Sync>;

/// The context passed to every task action.
pub struct TaskContext<G: Send + Sync + 'static = ()> {
    /// Access to global configuration and data.
    pub env: Arc<Environment<G>>,
    /// Name of the running task.
    pub name: ArcStr,
}

impl<G: Send + Sync + 'static> TaskContext<G> {
    /// Shorthand for `ctx.env.data`.
    pub fn data(&self) -> &G {
        &self.env.data
    }
}

pub(crate) struct TaskNode<G: Send + Sync + 'static> {
    pub name: ArcStr,
    /// False for placeholders created by forward references.
    pub declared: bool,
    /// `None` for grouping nodes.
    pub action: Option<Action<G>>,
}

impl<G: Send + Sync + 'static> TaskNode<G> {
    fn placeholder(name: &str) -> Self {
        Self {
            name: name.into(),
            declared: false,
            action: None,
        }
    }
}

impl<G: Send + Sync + 'static> Clone for TaskNode<G> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            declared: self.declared,
            action: self.action.clone(),
        }
    }
}

/// Declares tasks and runs them.
pub struct Orchestrator<G: Send + Sync + 'static = ()> {
    pub(crate) graph: Graph<TaskNode<G>, ()>,
    pub(crate) names: HashMap<ArcStr, NodeIndex>,
    pub(crate) sequences: HashMap<ArcStr, Vec<ArcStr>>,
    pub(crate) env: Arc<Environment<G>>,
    pub(crate) policy: FailurePolicy,
    pub(crate) failed: AtomicBool,
}

impl<G: Send + Sync + 'static> Orchestrator<G> {
    pub fn new(env: Environment<G>, policy: FailurePolicy) -> Self {
        Self {
            graph: Graph::new(),
            names: HashMap::new(),
            sequences: HashMap::new(),
            env: Arc::new(env),
            policy,
            failed: AtomicBool::new(false),
        }
    }

    pub fn env(&self) -> &Environment<G> {
        &self.env
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// True once any task action failed during the lifetime of this
    /// orchestrator.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns true if `name` is a declared task or a registered sequence.
    pub fn contains(&self, name: &str) -> bool {
        self.sequences.contains_key(name)
            || self
                .names
                .get(name)
                .is_some_and(|&index| self.graph[index].declared)
    }

    /// Names of all declared tasks and sequences, sorted.
    pub fn task_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .graph
            .node_weights()
            .filter(|node| node.declared)
            .map(|node| &*node.name)
            .chain(self.sequences.keys().map(|name| &**name))
            .collect();
        names.sort_unstable();
        names
    }

    /// The entry point of the builder-style declaration API.
    ///
    /// ```rust,no_run
    /// # use extforge::{Environment, FailurePolicy, Mode, Orchestrator};
    /// let mut tasks = Orchestrator::new(Environment::new(Mode::Build, ()), FailurePolicy::FailFast);
    /// tasks.task("compile").run(|_| async { Ok(()) })?;
    /// tasks.task("default").depends_on(["compile"]).group()?;
    /// # Ok::<(), extforge::GraphError>(())
    /// ```
    pub fn task(&mut self, name: impl Into<String>) -> TaskDef<'_, G> {
        TaskDef {
            orchestrator: self,
            name: name.into(),
            prerequisites: Vec::new(),
        }
    }

    /// Declares a task. A task without an action is a grouping node that
    /// completes as soon as its prerequisites did.
    pub fn declare_task<I, S>(
        &mut self,
        name: &str,
        prerequisites: I,
        action: Option<Action<G>>,
    ) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.sequences.contains_key(name) {
            return Err(GraphError::Duplicate(name.to_string()));
        }

        // Work on a copy, so a rejected declaration leaves no trace.
        let mut graph = self.graph.clone();
        let mut names = self.names.clone();

        let index = match names.get(name) {
            Some(&index) if graph[index].declared => {
                return Err(GraphError::Duplicate(name.to_string()));
            }
            Some(&index) => index,
            None => {
                let index = graph.add_node(TaskNode::placeholder(name));
                names.insert(name.into(), index);
                index
            }
        };

        for prerequisite in prerequisites {
            let prerequisite = prerequisite.as_ref();

            if self.sequences.contains_key(prerequisite) {
                return Err(GraphError::SequenceAsPrerequisite {
                    task: name.to_string(),
                    sequence: prerequisite.to_string(),
                });
            }

            let dependency = match names.get(prerequisite) {
                Some(&dependency) => dependency,
                None => {
                    let dependency = graph.add_node(TaskNode::placeholder(prerequisite));
                    names.insert(prerequisite.into(), dependency);
                    dependency
                }
            };

            graph.update_edge(dependency, index, ());
        }

        if let Err(cycle) = toposort(&graph, None) {
            return Err(GraphError::Cycle {
                task: name.to_string(),
                via: graph[cycle.node_id()].name.to_string(),
            });
        }

        let node = &mut graph[index];
        node.declared = true;
        node.action = action;

        self.graph = graph;
        self.names = names;

        tracing::trace!("declared task {name}");
        Ok(())
    }

    /// Registers a named, strictly serial sequence of tasks.
    pub fn sequence<I, S>(&mut self, name: &str, stages: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.names.contains_key(name) || self.sequences.contains_key(name) {
            return Err(GraphError::Duplicate(name.to_string()));
        }

        let stages: Vec<ArcStr> = stages
            .into_iter()
            .map(|stage| ArcStr::from(stage.as_ref()))
            .collect();

        // Sequences are flat, a stage is always a task.
        if let Some(stage) = stages
            .iter()
            .find(|stage| &***stage == name || self.sequences.contains_key(&***stage))
        {
            return Err(GraphError::SequenceAsPrerequisite {
                task: name.to_string(),
                sequence: stage.to_string(),
            });
        }

        if let Some((other, _)) = self
            .sequences
            .iter()
            .find(|(_, other)| other.iter().any(|stage| &**stage == name))
        {
            return Err(GraphError::SequenceAsPrerequisite {
                task: other.to_string(),
                sequence: name.to_string(),
            });
        }

        self.sequences.insert(name.into(), stages);
        Ok(())
    }
}

pub struct TaskDef<'a, G: Send + Sync + 'static> {
    orchestrator: &'a mut Orchestrator<G>,
    name: String,
    prerequisites: Vec<String>,
}

impl<G: Send + Sync + 'static> TaskDef<'_, G> {
    pub fn depends_on<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites
            .extend(prerequisites.into_iter().map(Into::into));
        self
    }

    pub fn run<F, Fut>(self, callback: F) -> Result<(), GraphError>
    where
        F: Fn(TaskContext<G>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let action: Action<G> =
            Arc::new(move |ctx| -> BoxFuture<'static, TaskResult> { Box::pin(callback(ctx)) });
        self.orchestrator
            .declare_task(&self.name, &self.prerequisites, Some(action))
    }

    /// Declares the task as a grouping node without an action.
    pub fn group(self) -> Result<(), GraphError> {
        self.orchestrator
            .declare_task(&self.name, &self.prerequisites, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Mode;

    fn orchestrator() -> Orchestrator<()> {
        Orchestrator::new(Environment::new(Mode::Build, ()), FailurePolicy::FailFast)
    }

    #[test]
    fn declares_with_forward_reference() {
        let mut tasks = orchestrator();
        tasks.task("build").depends_on(["copy"]).group().unwrap();

        assert!(tasks.contains("build"));
        assert!(!tasks.contains("copy"));

        tasks.task("copy").run(|_| async { Ok(()) }).unwrap();
        assert!(tasks.contains("copy"));
        assert_eq!(tasks.task_names(), vec!["build", "copy"]);
    }

    #[test]
    fn rejects_duplicates() {
        let mut tasks = orchestrator();
        tasks.task("a").group().unwrap();

        assert_eq!(
            tasks.task("a").group(),
            Err(GraphError::Duplicate("a".into()))
        );
    }

    #[test]
    fn rejects_cycles_at_declaration() {
        let mut tasks = orchestrator();
        tasks.task("a").depends_on(["b"]).group().unwrap();
        tasks.task("b").depends_on(["c"]).group().unwrap();

        let result = tasks.task("c").depends_on(["a"]).group();
        assert!(matches!(result, Err(GraphError::Cycle { ref task, .. }) if task == "c"));

        // the rejected declaration left nothing behind
        assert!(!tasks.contains("c"));
        assert_eq!(tasks.graph.edge_count(), 2);
        tasks.task("c").group().unwrap();
    }

    #[test]
    fn rejects_self_dependency() {
        let mut tasks = orchestrator();
        let result = tasks.task("a").depends_on(["a"]).group();
        assert!(matches!(result, Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn sequences_share_the_namespace() {
        let mut tasks = orchestrator();
        tasks.task("build").group().unwrap();
        tasks.sequence("release", ["build"]).unwrap();

        assert_eq!(
            tasks.sequence("build", ["build"]),
            Err(GraphError::Duplicate("build".into()))
        );
        assert_eq!(
            tasks.task("release").group(),
            Err(GraphError::Duplicate("release".into()))
        );
        assert_eq!(
            tasks.task("after").depends_on(["release"]).group(),
            Err(GraphError::SequenceAsPrerequisite {
                task: "after".into(),
                sequence: "release".into()
            })
        );
        assert!(tasks.contains("release"));
    }
}
