use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use crate::core::ArcStr;

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Run diagnostics and performance metrics.
///
/// Returned by [`Orchestrator::run`](crate::Orchestrator::run), contains the
/// execution times of every action that ran and the names of tasks skipped
/// because a prerequisite failed.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Task name to execution metrics. Grouping nodes don't appear here.
    pub execution_times: HashMap<ArcStr, TaskExecution>,
    /// Tasks never started because something they depend on failed.
    pub skipped: Vec<ArcStr>,
}

impl Diagnostics {
    /// Tasks that ran, in the order they started.
    pub fn timeline(&self) -> Vec<(&str, &TaskExecution)> {
        let mut tasks: Vec<_> = self
            .execution_times
            .iter()
            .map(|(name, exec)| (&**name, exec))
            .collect();
        tasks.sort_by_key(|(name, exec)| (exec.start, *name));
        tasks
    }

    pub fn ran(&self, name: &str) -> bool {
        self.execution_times.contains_key(name)
    }

    pub(crate) fn merge(&mut self, other: Diagnostics) {
        self.execution_times.extend(other.execution_times);
        self.skipped.extend(other.skipped);
    }
}

impl Display for Diagnostics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let timeline = self.timeline();
        let Some(first) = timeline.first() else {
            return writeln!(f, "no tasks ran");
        };

        let origin = first.1.start;
        let width = timeline
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0);

        for (name, exec) in &timeline {
            let offset = exec.start.duration_since(origin);
            writeln!(
                f,
                "{name:<width$}  +{:>8.2?}  {:>10.2?}",
                offset, exec.duration
            )?;
        }

        for name in &self.skipped {
            writeln!(f, "{name:<width$}  skipped")?;
        }

        Ok(())
    }
}
