use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use petgraph::stable_graph::NodeIndex;
use tokio::time::Instant;
use tracing::debug;

use crate::graph::DependencyGraph;
use crate::task::Task;
use crate::{CronductError, ErrorKind, TaskState, TriggerSpec, ValidationError};

/// Mutable bookkeeping kept next to an immutable [`Task`].
#[derive(Debug, Clone)]
pub struct TaskEntry {
    pub task: Arc<Task>,
    pub node: NodeIndex,
    pub state: TaskState,
    /// Current recurring trigger; starts as the task's own and changes on reschedule.
    pub trigger: TriggerSpec,
    pub paused: bool,
    /// Set from dispatch until the cycle's callbacks have returned.
    pub busy: bool,
    /// Attempt number of the running or pending attempt, from 1.
    pub attempt: u32,
    /// Execution time spent by attempts of the current cycle.
    pub cycle_elapsed: Duration,
    /// When the pending retry fire is due, while `Retrying`.
    pub retry_due: Option<Instant>,
    pub last_transition: DateTime<Utc>,
    pub last_error: Option<ErrorKind>,
}

/// Task definitions and their latest state, keyed by id.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, TaskEntry>,
    graph: DependencyGraph,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Task) -> Result<(), ValidationError> {
        if self.entries.contains_key(task.id()) {
            return Err(ValidationError::DuplicateId(task.id().to_string()));
        }

        let node = self.graph.insert(task.id(), task.dependencies())?;
        let id = task.id().to_string();
        let trigger = task.trigger().clone();

        debug!(task = %id, deps = ?task.dependencies(), "registered task");
        self.entries.insert(
            id,
            TaskEntry {
                task: Arc::new(task),
                node,
                state: TaskState::Pending,
                trigger,
                paused: false,
                busy: false,
                attempt: 0,
                cycle_elapsed: Duration::ZERO,
                retry_due: None,
                last_transition: Utc::now(),
                last_error: None,
            },
        );
        Ok(())
    }

    pub fn unregister(&mut self, id: &str) -> Result<TaskEntry, CronductError> {
        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| CronductError::NotFound(id.to_string()))?;
        self.graph.remove(id);
        Ok(entry)
    }

    pub fn get_state(&self, id: &str) -> Result<TaskState, CronductError> {
        self.get(id).map(|e| e.state)
    }

    /// The only state mutator. Stamps the transition time and returns the previous state.
    pub fn set_state(&mut self, id: &str, next: TaskState) -> Result<TaskState, CronductError> {
        let entry = self.get_mut(id)?;
        let prev = entry.state;
        if prev != next && !prev.can_transition_to(next) {
            return Err(CronductError::IllegalTransition {
                task: id.to_string(),
                from: prev,
                to: next,
            });
        }
        entry.state = next;
        entry.last_transition = Utc::now();
        Ok(prev)
    }

    pub fn get(&self, id: &str) -> Result<&TaskEntry, CronductError> {
        self.entries
            .get(id)
            .ok_or_else(|| CronductError::NotFound(id.to_string()))
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut TaskEntry, CronductError> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| CronductError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Latest state of each direct dependency of `id`; `None` for unregistered ids.
    pub fn dependency_states(&self, id: &str) -> Result<Vec<(String, Option<TaskState>)>, CronductError> {
        let entry = self.get(id)?;
        let mut states: Vec<_> = self
            .graph
            .dependencies_of(entry.node)
            .map(|(_, dep)| (dep.to_string(), self.entries.get(dep).map(|e| e.state)))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(states)
    }

    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &TaskEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_in_state(&self, state: TaskState) -> usize {
        self.entries.values().filter(|e| e.state == state).count()
    }

    pub fn render_graph(&self) -> String {
        self.graph.render()
    }
}
