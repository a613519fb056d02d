//! In-memory dependency graph and cycle checks.
//!
//! The graph maps each task ID to the set of task IDs it depends on
//! (its direct prerequisites). Nothing here touches the database; the
//! dependency store loads the edge set, asks the graph, and only then writes.
//!
//! All traversals use an explicit stack and a visited set, so deep chains
//! cannot overflow the call stack and a graph that already contains a cycle
//! still terminates.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Adjacency map from a task to its direct prerequisites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from `(dependent, prerequisite)` pairs.
    pub fn from_edges<I, A, B>(edges: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let mut graph = Self::new();
        for (dependent, prerequisite) in edges {
            graph.insert(dependent, prerequisite);
        }
        graph
    }

    /// Add an edge. Returns false if it was already present.
    pub fn insert(&mut self, dependent: impl Into<String>, prerequisite: impl Into<String>) -> bool {
        self.edges
            .entry(dependent.into())
            .or_default()
            .insert(prerequisite.into())
    }

    /// Remove an edge. Returns false if it was not present.
    pub fn remove(&mut self, dependent: &str, prerequisite: &str) -> bool {
        let Some(set) = self.edges.get_mut(dependent) else {
            return false;
        };
        let removed = set.remove(prerequisite);
        if set.is_empty() {
            self.edges.remove(dependent);
        }
        removed
    }

    /// Whether `dependent` directly depends on `prerequisite`.
    #[must_use]
    pub fn contains(&self, dependent: &str, prerequisite: &str) -> bool {
        self.edges
            .get(dependent)
            .is_some_and(|set| set.contains(prerequisite))
    }

    /// Direct prerequisites of `node`, in ID order.
    pub fn prerequisites<'a>(&'a self, node: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .get(node)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Whether adding `dependent -> prerequisite` would introduce a cycle.
    ///
    /// True iff `dependent` is reachable from `prerequisite` by following
    /// existing edges, or the two are the same node.
    #[must_use]
    pub fn would_create_cycle(&self, dependent: &str, prerequisite: &str) -> bool {
        if dependent == prerequisite {
            return true;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack = vec![prerequisite];

        while let Some(current) = stack.pop() {
            if current == dependent {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for next in self.prerequisites(current) {
                if !visited.contains(next) {
                    stack.push(next);
                }
            }
        }

        false
    }

    /// A chain of prerequisite edges leading from `from` to `to`.
    ///
    /// The returned path starts with `from` and ends with `to`. When
    /// `from == to` the path is just that node.
    #[must_use]
    pub fn find_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string()]);
        }

        let mut parent: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([from]);
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            for next in self.prerequisites(current) {
                if !visited.insert(next) {
                    continue;
                }
                parent.insert(next, current);
                if next == to {
                    let mut path = vec![to.to_string()];
                    let mut node = to;
                    while let Some(&prev) = parent.get(node) {
                        path.push(prev.to_string());
                        node = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                stack.push(next);
            }
        }

        None
    }

    /// Every task `node` depends on directly or indirectly, in ID order.
    #[must_use]
    pub fn transitive_prerequisites(&self, node: &str) -> Vec<String> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut stack: Vec<&str> = self.prerequisites(node).collect();

        while let Some(current) = stack.pop() {
            if current == node || !seen.insert(current) {
                continue;
            }
            stack.extend(self.prerequisites(current));
        }

        seen.into_iter().map(str::to_string).collect()
    }

    /// Whether the graph contains a cycle of any length.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        // Nodes fully explored without finding a cycle.
        let mut done: HashSet<&str> = HashSet::new();

        for start in self.edges.keys() {
            if done.contains(start.as_str()) {
                continue;
            }
            // (node, prerequisites, next index) frames of the current DFS path.
            let mut on_path: HashSet<&str> = HashSet::from([start.as_str()]);
            let mut stack: Vec<(&str, Vec<&str>, usize)> =
                vec![(start.as_str(), self.prerequisites(start).collect(), 0)];

            while let Some((node, children, idx)) = stack.last_mut() {
                if let Some(&child) = children.get(*idx) {
                    *idx += 1;
                    if on_path.contains(child) {
                        return true;
                    }
                    if done.contains(child) {
                        continue;
                    }
                    on_path.insert(child);
                    let grandchildren = self.prerequisites(child).collect();
                    stack.push((child, grandchildren, 0));
                } else {
                    let node = *node;
                    on_path.remove(node);
                    done.insert(node);
                    stack.pop();
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chain() -> DependencyGraph {
        // t3 -> t2 -> t1
        DependencyGraph::from_edges([("t3", "t2"), ("t2", "t1")])
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let graph = DependencyGraph::new();
        assert!(graph.would_create_cycle("a", "a"));
    }

    #[test]
    fn test_closing_a_chain_is_a_cycle() {
        let graph = chain();
        assert!(graph.would_create_cycle("t1", "t3"));
        assert!(graph.would_create_cycle("t1", "t2"));
        assert!(!graph.would_create_cycle("t3", "t1"));
        assert!(!graph.would_create_cycle("t4", "t3"));
    }

    #[test]
    fn test_two_node_cycle() {
        let graph = DependencyGraph::from_edges([("a", "b")]);
        assert!(graph.would_create_cycle("b", "a"));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let graph = DependencyGraph::from_edges([("d", "b"), ("d", "c"), ("b", "a"), ("c", "a")]);
        assert!(!graph.has_cycle());
        assert!(!graph.would_create_cycle("e", "d"));
        assert!(graph.would_create_cycle("a", "d"));
    }

    #[test]
    fn test_find_path_names_the_chain() {
        let graph = chain();
        assert_eq!(
            graph.find_path("t3", "t1"),
            Some(vec!["t3".to_string(), "t2".to_string(), "t1".to_string()])
        );
        assert_eq!(graph.find_path("t1", "t3"), None);
    }

    #[test]
    fn test_transitive_prerequisites() {
        let graph = DependencyGraph::from_edges([("d", "b"), ("d", "c"), ("b", "a"), ("c", "a")]);
        assert_eq!(graph.transitive_prerequisites("d"), vec!["a", "b", "c"]);
        assert!(graph.transitive_prerequisites("a").is_empty());
    }

    #[test]
    fn test_traversal_terminates_on_existing_cycle() {
        let graph = DependencyGraph::from_edges([("a", "b"), ("b", "c"), ("c", "a")]);
        assert!(graph.has_cycle());
        assert!(!graph.would_create_cycle("x", "a"));
        assert_eq!(graph.transitive_prerequisites("a"), vec!["b", "c"]);
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let n = 50_000;
        let graph = DependencyGraph::from_edges(
            (1..n).map(|i| (format!("n{i}"), format!("n{}", i - 1))),
        );
        assert!(graph.would_create_cycle("n0", &format!("n{}", n - 1)));
        assert!(!graph.has_cycle());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut graph = DependencyGraph::new();
        assert!(graph.insert("a", "b"));
        assert!(!graph.insert("a", "b"));
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.remove("a", "b"));
        assert!(!graph.remove("a", "b"));
        assert!(!graph.contains("a", "b"));
        assert_eq!(graph, DependencyGraph::new());
    }

    proptest! {
        #[test]
        fn accepted_edges_never_form_a_cycle(
            edges in prop::collection::vec((0u8..12, 0u8..12), 0..80)
        ) {
            let mut graph = DependencyGraph::new();
            for (a, b) in edges {
                let (a, b) = (format!("t{a}"), format!("t{b}"));
                if !graph.would_create_cycle(&a, &b) {
                    graph.insert(a, b);
                }
            }
            prop_assert!(!graph.has_cycle());
        }

        #[test]
        fn cycle_check_agrees_with_path_search(
            edges in prop::collection::vec((0u8..10, 0u8..10), 0..40),
            a in 0u8..10,
            b in 0u8..10,
        ) {
            let graph = DependencyGraph::from_edges(
                edges.into_iter().map(|(x, y)| (format!("t{x}"), format!("t{y}"))),
            );
            let (a, b) = (format!("t{a}"), format!("t{b}"));
            prop_assert_eq!(graph.would_create_cycle(&a, &b), graph.find_path(&b, &a).is_some());
        }
    }
}
