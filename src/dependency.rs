//! Dependency snapshot module.
//!
//! Provides the `DependencyGraph` type, a read-only directed graph of which
//! calculation node read which other node during its last evaluation. It is
//! taken from a live `CalculationGraph` and used for diagnostics: finding
//! what a node depends on, what depends on it, and an order in which nodes
//! can be evaluated.

use crate::error::CalcError;
use crate::node::{NodeId, NodeLabel};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// A snapshot of node dependencies.
///
/// Edges point from a dependency to its dependent, so a topological order
/// lists every node after the nodes it reads.
///
/// # Examples
///
/// ```rust
/// use statgraph::{Calculator, CalculatorUpdate, Form, Modifier, NodeType, PathDefinition, Stat};
///
/// let mut calculator = Calculator::default();
/// let life = Stat::new("Life");
/// calculator
///     .update(&CalculatorUpdate::adding(vec![Modifier::constant(life.clone(), Form::BaseAdd, 10.0)]))
///     .unwrap();
/// calculator.value(&life).unwrap();
///
/// let snapshot = calculator.dependency_graph();
/// let total = calculator.node(&life, NodeType::Total, &PathDefinition::main_path());
/// let order = snapshot.evaluation_order().unwrap();
///
/// // The total comes after everything it reads.
/// for dependency in snapshot.dependencies_of(total.default_view().id()) {
///     let position = |id| order.iter().position(|n| *n == id).unwrap();
///     assert!(position(dependency) < position(total.default_view().id()));
/// }
/// ```
pub struct DependencyGraph {
    graph: DiGraph<(NodeId, NodeLabel), ()>,
    node_map: HashMap<NodeId, NodeIndex>,
}

impl DependencyGraph {
    /// Build a snapshot from `(node, label, dependencies)` entries.
    ///
    /// Dependencies on nodes without an entry are ignored.
    pub(crate) fn from_nodes<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, NodeLabel, Vec<NodeId>)>,
    {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();
        let mut edges = Vec::new();

        for (id, label, dependencies) in nodes {
            let index = graph.add_node((id, label));
            node_map.insert(id, index);
            edges.extend(dependencies.into_iter().map(|dependency| (dependency, id)));
        }
        for (dependency, dependent) in edges {
            if let (Some(&from), Some(&to)) = (node_map.get(&dependency), node_map.get(&dependent)) {
                graph.add_edge(from, to, ());
            }
        }

        Self { graph, node_map }
    }

    /// The number of nodes in the snapshot.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// The number of recorded reads.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node_map.contains_key(&id)
    }

    /// What `id` calculates, or `None` if it is not part of the snapshot.
    pub fn label(&self, id: NodeId) -> Option<&NodeLabel> {
        self.node_map.get(&id).map(|&index| &self.graph[index].1)
    }

    /// The nodes `id` read during its last evaluation.
    pub fn dependencies_of(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// The nodes that read `id` during their last evaluation.
    pub fn dependents_of(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        match self.node_map.get(&id) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, direction)
                .map(|neighbor| self.graph[neighbor].0)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Find a dependency cycle, if there is one.
    ///
    /// Uses depth-first search. The returned error lists the labels of the
    /// nodes on the cycle, starting and ending with the same node.
    pub fn detect_cycles(&self) -> Result<(), CalcError> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();

        for index in self.graph.node_indices() {
            if !visited.contains(&index) {
                let mut path = Vec::new();
                if let Some(cycle) = self.find_cycle(index, &mut visited, &mut on_stack, &mut path) {
                    return Err(cycle);
                }
            }
        }
        Ok(())
    }

    fn find_cycle(
        &self,
        index: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        on_stack: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<CalcError> {
        visited.insert(index);
        on_stack.insert(index);
        path.push(index);

        for neighbor in self.graph.neighbors_directed(index, Direction::Outgoing) {
            if !visited.contains(&neighbor) {
                if let Some(cycle) = self.find_cycle(neighbor, visited, on_stack, path) {
                    return Some(cycle);
                }
            } else if on_stack.contains(&neighbor) {
                let start = path.iter().position(|&i| i == neighbor).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|&i| self.graph[i].1.to_string())
                    .collect();
                cycle.push(self.graph[neighbor].1.to_string());
                return Some(CalcError::Cycle { path: cycle });
            }
        }

        on_stack.remove(&index);
        path.pop();
        None
    }

    /// All nodes, each listed after the nodes it reads.
    pub fn evaluation_order(&self) -> Result<Vec<NodeId>, CalcError> {
        self.detect_cycles()?;
        toposort(&self.graph, None)
            .map(|indices| indices.into_iter().map(|index| self.graph[index].0).collect())
            .map_err(|cycle| CalcError::Cycle {
                path: vec![self.graph[cycle.node_id()].1.to_string()],
            })
    }
}
