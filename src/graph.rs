use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write;

use petgraph::Direction;
use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use crate::ValidationError;

/// Dependency edges between task ids.
///
/// Edge direction is dependency -> dependent: for `transform` depending on
/// `extract` the graph holds `extract -> transform`. Ids that are referenced as
/// a dependency but not registered yet are kept as placeholder nodes so that a
/// later registration can still be checked for cycles. A placeholder goes away
/// once nothing depends on it.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    registered: HashSet<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn id_of(&self, node: NodeIndex) -> Option<&str> {
        self.graph.node_weight(node).map(String::as_str)
    }

    /// Rejects `deps` for `task` if they contain `task` itself or would close a cycle.
    pub fn check(&self, task: &str, deps: &BTreeSet<String>) -> Result<(), ValidationError> {
        if deps.contains(task) {
            return Err(ValidationError::SelfDependency(task.to_string()));
        }

        // A new edge dep -> task closes a cycle iff task already reaches dep.
        let Some(task_node) = self.index_of(task) else {
            return Ok(());
        };
        for dep in deps {
            if let Some(dep_node) = self.index_of(dep) {
                if has_path_connecting(&self.graph, task_node, dep_node, None) {
                    return Err(ValidationError::CyclicDependency {
                        task: task.to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Adds `task` with its incoming dependency edges.
    pub fn insert(
        &mut self,
        task: &str,
        deps: &BTreeSet<String>,
    ) -> Result<NodeIndex, ValidationError> {
        self.check(task, deps)?;

        let task_node = self.ensure_node(task);
        for dep in deps {
            let dep_node = self.ensure_node(dep);
            self.graph.update_edge(dep_node, task_node, ());
        }
        self.registered.insert(task.to_string());

        debug_assert!(!is_cyclic_directed(&self.graph));
        Ok(task_node)
    }

    /// Drops the dependency edges of `task`. The node survives as a placeholder
    /// while other tasks still depend on it.
    pub fn remove(&mut self, task: &str) {
        let Some(node) = self.index_of(task) else {
            return;
        };
        self.registered.remove(task);

        let incoming: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| (e.id(), e.source()))
            .collect();
        for (edge, _) in &incoming {
            self.graph.remove_edge(*edge);
        }

        self.prune(node);
        for (_, dep) in incoming {
            self.prune(dep);
        }
    }

    /// Drops `node` if it is an unregistered placeholder nothing depends on.
    fn prune(&mut self, node: NodeIndex) {
        let Some(id) = self.id_of(node).map(str::to_string) else {
            return;
        };
        if self.registered.contains(&id)
            || self.graph.neighbors_directed(node, Direction::Outgoing).next().is_some()
        {
            return;
        }
        self.graph.remove_node(node);
        self.index.remove(&id);
    }

    /// Direct dependencies of the node, as (index, id) pairs.
    pub fn dependencies_of(&self, node: NodeIndex) -> impl Iterator<Item = (NodeIndex, &str)> + '_ {
        self.graph
            .neighbors_directed(node, Direction::Incoming)
            .filter_map(move |n| self.id_of(n).map(|id| (n, id)))
    }

    /// Direct dependents of `id`, sorted.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        let Some(node) = self.index_of(id) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .filter_map(|n| self.id_of(n))
            .collect();
        out.sort_unstable();
        out
    }

    /// Renders every root with its chain of dependents.
    pub fn render(&self) -> String {
        let mut roots: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect();
        roots.sort_by_key(|&n| self.id_of(n).unwrap_or_default().to_string());

        let mut out = String::new();
        for root in roots {
            let _ = writeln!(out, "{}", self.id_of(root).unwrap_or_default());
            self.render_chain(root, "  ", &mut out);
        }
        out
    }

    fn render_chain(&self, node: NodeIndex, prefix: &str, out: &mut String) {
        let Some(id) = self.id_of(node) else {
            return;
        };
        for child in self.dependents_of(id) {
            let _ = writeln!(out, "{}└─> {}", prefix, child);
            if let Some(child_node) = self.index_of(child) {
                self.render_chain(child_node, &format!("{}    ", prefix), out);
            }
        }
    }

    fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(node) = self.index_of(id) {
            return node;
        }
        let node = self.graph.add_node(id.to_string());
        self.index.insert(id.to_string(), node);
        node
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use proptest::prelude::*;

    fn deps(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_self_dependency() {
        let graph = DependencyGraph::new();
        assert_eq!(
            graph.check("a", &deps(&["a"])),
            Err(ValidationError::SelfDependency("a".into()))
        );
    }

    #[test]
    fn rejects_cycle_through_placeholder() {
        let mut graph = DependencyGraph::new();
        // b depends on a before a is registered
        graph.insert("b", &deps(&["a"])).unwrap();
        graph.insert("c", &deps(&["b"])).unwrap();

        let err = graph.insert("a", &deps(&["c"])).unwrap_err();
        assert!(matches!(err, ValidationError::CyclicDependency { .. }));

        // the failed insert left nothing behind
        assert!(graph.dependencies_of(graph.index_of("a").unwrap()).next().is_none());
        graph.insert("a", &deps(&[])).unwrap();
    }

    #[test]
    fn remove_keeps_placeholder_for_dependents() {
        let mut graph = DependencyGraph::new();
        graph.insert("extract", &deps(&[])).unwrap();
        graph.insert("transform", &deps(&["extract"])).unwrap();

        graph.remove("extract");
        assert!(graph.index_of("extract").is_some());
        assert_eq!(graph.dependents_of("extract"), vec!["transform"]);

        graph.remove("transform");
        assert!(graph.index_of("transform").is_none());
        assert!(graph.index_of("extract").is_none());
        assert_eq!(graph.render(), "");
    }

    #[test]
    fn remove_keeps_registered_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.insert("extract", &deps(&[])).unwrap();
        graph.insert("transform", &deps(&["extract", "lookup"])).unwrap();

        graph.remove("transform");
        assert!(graph.index_of("extract").is_some());
        // never registered, only referenced
        assert!(graph.index_of("lookup").is_none());
        assert_eq!(graph.render(), "extract\n");
    }

    #[test]
    fn render_lists_chains_from_roots() {
        let mut graph = DependencyGraph::new();
        graph.insert("extract", &deps(&[])).unwrap();
        graph.insert("transform", &deps(&["extract"])).unwrap();
        graph.insert("load", &deps(&["transform"])).unwrap();

        let rendered = graph.render();
        assert_eq!(rendered, "extract\n  └─> transform\n      └─> load\n");
    }

    proptest! {
        #[test]
        fn accepted_edges_never_form_a_cycle(
            tasks in proptest::collection::vec((0u8..8, proptest::collection::vec(0u8..8, 0..4)), 1..24)
        ) {
            let mut graph = DependencyGraph::new();
            let mut registered = HashSet::new();
            for (id, raw_deps) in tasks {
                if !registered.insert(id) {
                    continue;
                }
                let id = format!("t{}", id);
                let deps: BTreeSet<String> = raw_deps.iter().map(|d| format!("t{}", d)).collect();
                match graph.insert(&id, &deps) {
                    Ok(_) => {}
                    Err(ValidationError::SelfDependency(_)) => prop_assert!(deps.contains(&id)),
                    Err(ValidationError::CyclicDependency { .. }) => {}
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }
                prop_assert!(!is_cyclic_directed(&graph.graph));
            }
        }
    }
}
