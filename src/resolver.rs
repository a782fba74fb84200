use tracing::debug;

use crate::outcome::SkipReason;
use crate::registry::Registry;
use crate::TaskState;

/// Judges a task's dependencies against the latest recorded state of each.
///
/// A dependency is satisfied only when its latest state is `Success`. There is
/// no same-cycle alignment: whatever the upstream task last recorded is what
/// counts. An upstream task that is still running or retrying is unsatisfied,
/// and unregistered dependencies fail closed.
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn is_satisfied(registry: &Registry, task_id: &str) -> bool {
        Self::check(registry, task_id).is_ok()
    }

    /// Returns the first unsatisfied dependency, in id order. A task that is
    /// not registered itself is reported as missing.
    pub fn check(registry: &Registry, task_id: &str) -> Result<(), SkipReason> {
        let Ok(deps) = registry.dependency_states(task_id) else {
            debug!(task = %task_id, "task not registered");
            return Err(SkipReason::DependencyMissing {
                dependency: task_id.to_string(),
            });
        };

        for (dependency, state) in deps {
            match state {
                Some(TaskState::Success) => {}
                Some(state) => {
                    debug!(task = %task_id, dep = %dependency, %state, "dependency not satisfied");
                    return Err(SkipReason::DependencyUnsatisfied { dependency, state });
                }
                None => {
                    debug!(task = %task_id, dep = %dependency, "dependency not registered");
                    return Err(SkipReason::DependencyMissing { dependency });
                }
            }
        }
        Ok(())
    }
}
