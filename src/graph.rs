//! Calculation graph module.
//!
//! Provides the `CalculationGraph`, which owns every node of a calculator.
//! Nodes are grouped per stat into subgraphs:
//!
//! ```text
//! Stat ─┬─ stage nodes       (NodeType, PathDefinition) -> node
//!       ├─ form collections  (Form, PathDefinition)     -> modifier nodes
//!       └─ paths             reference-counted PathDefinitions
//! ```
//!
//! Stage nodes and form collections are created on first demand, either
//! by a caller or by a value reading them. Modifier nodes are created when a
//! modifier is added and disposed when it is removed. `prune` disposes stage
//! nodes that nothing observes anymore.
//!
//! Behaviors registered on the graph wrap the calculation of matching stage
//! nodes. Adding or removing one invalidates the nodes it touches.

use crate::aggregate::{AggregationPolicy, StageValue};
use crate::behavior::{Behavior, TransformableValue};
use crate::dependency::DependencyGraph;
use crate::error::CalcError;
use crate::modifier::{Form, Modifier, NodeType};
use crate::node::{CachingNode, CalculationNode, NodeId, NodeLabel, NodeProvider, NodeRepository};
use crate::node_collection::{FormNodeCollection, ModifierNodeCollection};
use crate::path::PathDefinition;
use crate::path_collection::{PathCollectionView, PathDefinitionCollection};
use crate::stat::Stat;
use crate::suspend::{SuspendableEvents, SuspendableEventsComposite};
use crate::value::Value;
use crate::view::CountsSubscribers;
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::debug;

/// Key of a stage node within its stat.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct NodeSelector {
    pub node_type: NodeType,
    pub path: PathDefinition,
}

/// Key of a form collection within its stat.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FormSelector {
    pub form: Form,
    pub path: PathDefinition,
}

/// A stage node together with the value behaviors are applied to.
#[derive(Clone)]
struct StageNode {
    provider: NodeProvider,
    node: Rc<CachingNode>,
    value: Rc<TransformableValue>,
}

/// Everything the graph holds for one stat.
struct StatSubgraph {
    nodes: RefCell<IndexMap<NodeSelector, StageNode>>,
    forms: RefCell<IndexMap<FormSelector, Rc<ModifierNodeCollection>>>,
    paths: PathDefinitionCollection,
    modifier_count: Cell<usize>,
    suspender: Rc<SuspendableEventsComposite>,
}

impl StatSubgraph {
    fn new() -> Self {
        let paths = PathDefinitionCollection::new();
        let suspender = Rc::new(SuspendableEventsComposite::new());
        suspender.add(paths.suspender());
        Self {
            nodes: RefCell::new(IndexMap::new()),
            forms: RefCell::new(IndexMap::new()),
            paths,
            modifier_count: Cell::new(0),
            suspender,
        }
    }

    fn suspender(&self) -> Rc<dyn SuspendableEvents> {
        self.suspender.clone()
    }

    fn form_collection(&self, form: Form, path: &PathDefinition) -> Option<Rc<ModifierNodeCollection>> {
        let selector = FormSelector {
            form,
            path: path.clone(),
        };
        self.forms.borrow().get(&selector).cloned()
    }

    /// Detach and return the stage nodes nobody subscribes to.
    fn take_unused_nodes(&self) -> Vec<NodeProvider> {
        let mut nodes = self.nodes.borrow_mut();
        let unused: Vec<NodeSelector> = nodes
            .iter()
            .filter(|(_, stage)| stage.provider.subscriber_count() == 0)
            .map(|(selector, _)| selector.clone())
            .collect();
        unused
            .iter()
            .filter_map(|selector| nodes.shift_remove(selector))
            .map(|stage| stage.provider)
            .collect()
    }

    /// The stage nodes of this stat `behavior` applies to.
    fn affected_by(&self, stat: &Stat, behavior: &Behavior) -> Vec<StageNode> {
        self.nodes
            .borrow()
            .iter()
            .filter(|(selector, _)| behavior.affects(stat, selector.node_type, &selector.path))
            .map(|(_, stage)| stage.clone())
            .collect()
    }

    /// Detach and return the empty form collections nobody subscribes to.
    fn take_unused_forms(&self) -> Vec<Rc<ModifierNodeCollection>> {
        let mut forms = self.forms.borrow_mut();
        let unused: Vec<FormSelector> = forms
            .iter()
            .filter(|(_, collection)| collection.is_empty() && collection.subscriber_count() == 0)
            .map(|(selector, _)| selector.clone())
            .collect();
        unused
            .iter()
            .filter_map(|selector| forms.shift_remove(selector))
            .collect()
    }

    fn is_unused(&self) -> bool {
        self.modifier_count.get() == 0
            && self.nodes.borrow().is_empty()
            && self.forms.borrow().is_empty()
            && self.paths.is_empty()
            && self.paths.subscriber_count() == 0
    }
}

/// The shared state behind a `CalculationGraph`. Nodes reach it through a
/// weak `NodeRepository` handle.
struct GraphCore {
    this: Weak<GraphCore>,
    policy: Rc<dyn AggregationPolicy>,
    stats: RefCell<IndexMap<Stat, Rc<StatSubgraph>>>,
    suspender: Rc<SuspendableEventsComposite>,
    registry: RefCell<IndexMap<NodeId, Weak<CachingNode>>>,
    behaviors: RefCell<Vec<Rc<Behavior>>>,
}

impl GraphCore {
    fn new(policy: Rc<dyn AggregationPolicy>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            policy,
            stats: RefCell::new(IndexMap::new()),
            suspender: Rc::new(SuspendableEventsComposite::new()),
            registry: RefCell::new(IndexMap::new()),
            behaviors: RefCell::new(Vec::new()),
        })
    }

    fn existing_subgraph(&self, stat: &Stat) -> Option<Rc<StatSubgraph>> {
        self.stats.borrow().get(stat).cloned()
    }

    fn subgraph(&self, stat: &Stat) -> Rc<StatSubgraph> {
        if let Some(subgraph) = self.existing_subgraph(stat) {
            return subgraph;
        }
        let subgraph = Rc::new(StatSubgraph::new());
        self.suspender.add(subgraph.suspender());
        self.stats
            .borrow_mut()
            .insert(stat.clone(), subgraph.clone());
        subgraph
    }

    fn create_node(&self, label: NodeLabel, value: Rc<dyn Value>) -> Rc<CachingNode> {
        let repository: Weak<dyn NodeRepository> = self.this.clone();
        let node = CachingNode::new(label, value, repository);
        self.registry
            .borrow_mut()
            .insert(node.id(), Rc::downgrade(&node));
        node
    }

    fn retire(&self, node: &NodeProvider) {
        node.default_view().dispose();
        self.registry
            .borrow_mut()
            .shift_remove(&node.default_view().id());
    }

    fn stage_node(&self, stat: &Stat, node_type: NodeType, path: &PathDefinition) -> NodeProvider {
        let subgraph = self.subgraph(stat);
        let selector = NodeSelector {
            node_type,
            path: path.clone(),
        };
        if let Some(stage) = subgraph.nodes.borrow().get(&selector) {
            return stage.provider.clone();
        }
        let stage_value = StageValue::new(stat, node_type, path, self.policy.clone());
        let value = Rc::new(TransformableValue::new(Rc::new(stage_value)));
        for behavior in self.behaviors.borrow().iter() {
            if behavior.affects(stat, node_type, path) {
                value.add(behavior.clone());
            }
        }
        let node = self.create_node(NodeLabel::stage(stat, node_type, path), value.clone());
        let provider = CachingNode::provider(&node);
        subgraph.suspender.add(provider.suspender().clone());
        subgraph.nodes.borrow_mut().insert(
            selector,
            StageNode {
                provider: provider.clone(),
                node,
                value,
            },
        );
        provider
    }

    fn form_collection(&self, stat: &Stat, form: Form, path: &PathDefinition) -> Rc<ModifierNodeCollection> {
        let subgraph = self.subgraph(stat);
        if let Some(collection) = subgraph.form_collection(form, path) {
            return collection;
        }
        let collection = Rc::new(ModifierNodeCollection::new());
        subgraph.suspender.add(collection.suspender());
        subgraph.forms.borrow_mut().insert(
            FormSelector {
                form,
                path: path.clone(),
            },
            collection.clone(),
        );
        collection
    }

    fn add_modifier(&self, modifier: &Modifier) {
        let path = modifier.path();
        for stat in modifier.stats() {
            let subgraph = self.subgraph(stat);
            let node = self.create_node(NodeLabel::modifier(stat, modifier), modifier.value().clone());
            let node = CachingNode::provider(&node);
            let collection = self.form_collection(stat, modifier.form(), &path);
            subgraph.modifier_count.set(subgraph.modifier_count.get() + 1);
            subgraph.paths.add(path.clone());
            collection.add_modifier(modifier.clone(), node);
        }
    }

    fn remove_modifier(&self, modifier: &Modifier) -> Result<(), CalcError> {
        let path = modifier.path();
        let unknown = || CalcError::UnknownModifier(modifier.to_string());

        let mut targets = Vec::with_capacity(modifier.stats().len());
        for stat in modifier.stats() {
            let subgraph = self.existing_subgraph(stat).ok_or_else(unknown)?;
            let collection = subgraph
                .form_collection(modifier.form(), &path)
                .filter(|collection| collection.has_modifier(modifier))
                .ok_or_else(unknown)?;
            targets.push((subgraph, collection));
        }

        for (subgraph, collection) in targets {
            let node = collection.remove_modifier(modifier)?;
            self.retire(&node);
            subgraph
                .modifier_count
                .set(subgraph.modifier_count.get().saturating_sub(1));
            subgraph.paths.remove(&path);
        }
        Ok(())
    }

    /// The existing stage nodes `behavior` applies to.
    fn affected_by(&self, behavior: &Behavior) -> Vec<StageNode> {
        behavior
            .affected_stats()
            .iter()
            .filter_map(|stat| {
                self.existing_subgraph(stat)
                    .map(|subgraph| subgraph.affected_by(stat, behavior))
            })
            .flatten()
            .collect()
    }

    fn add_behavior(&self, behavior: Rc<Behavior>) {
        self.behaviors.borrow_mut().push(behavior.clone());
        for stage in self.affected_by(&behavior) {
            stage.value.add(behavior.clone());
            stage.node.invalidate();
        }
    }

    fn remove_behavior(&self, behavior: &Rc<Behavior>) -> Result<(), CalcError> {
        let position = self
            .behaviors
            .borrow()
            .iter()
            .position(|registered| Rc::ptr_eq(registered, behavior))
            .ok_or_else(|| CalcError::UnknownBehavior(behavior.to_string()))?;
        self.behaviors.borrow_mut().remove(position);
        for stage in self.affected_by(behavior) {
            if stage.value.remove(behavior) {
                stage.node.invalidate();
            }
        }
        Ok(())
    }

    fn prune(&self) -> usize {
        let mut pruned = 0;
        loop {
            let mut progressed = false;
            let candidates: Vec<(Stat, Rc<StatSubgraph>)> = self
                .stats
                .borrow()
                .iter()
                .filter(|(_, subgraph)| subgraph.modifier_count.get() == 0)
                .map(|(stat, subgraph)| (stat.clone(), subgraph.clone()))
                .collect();

            for (stat, subgraph) in candidates {
                let nodes = subgraph.take_unused_nodes();
                for node in &nodes {
                    subgraph.suspender.remove(node.suspender());
                    self.retire(node);
                }
                for collection in subgraph.take_unused_forms() {
                    subgraph.suspender.remove(&collection.suspender());
                }
                pruned += nodes.len();
                progressed |= !nodes.is_empty();

                if subgraph.is_unused() {
                    self.stats.borrow_mut().shift_remove(&stat);
                    self.suspender.remove(&subgraph.suspender());
                    progressed = true;
                }
            }

            if !progressed {
                break;
            }
        }
        pruned
    }
}

impl NodeRepository for GraphCore {
    fn node(&self, stat: &Stat, node_type: NodeType, path: &PathDefinition) -> NodeProvider {
        self.stage_node(stat, node_type, path)
    }

    fn form_nodes(&self, stat: &Stat, form: Form, path: &PathDefinition) -> FormNodeCollection {
        self.form_collection(stat, form, path).provider()
    }

    fn paths(&self, stat: &Stat) -> PathCollectionView {
        self.subgraph(stat).paths.provider()
    }
}

/// The nodes of one calculator, grouped per stat.
///
/// Mutations notify the default views of affected nodes immediately.
/// Suspending `suspender()` holds back every suspendable view in the graph,
/// including those of nodes created while suspended.
///
/// # Examples
///
/// ```rust
/// use statgraph::graph::CalculationGraph;
/// use statgraph::aggregate::StandardAggregation;
/// use statgraph::{Form, Modifier, NodeType, NodeValue, PathDefinition, Stat};
/// use std::rc::Rc;
///
/// let mut graph = CalculationGraph::new(Rc::new(StandardAggregation));
/// let armour = Stat::new("Armour");
/// let modifier = Modifier::constant(armour.clone(), Form::BaseAdd, 200.0);
///
/// graph.add_modifier(&modifier);
/// let total = graph.node(&armour, NodeType::Total, &PathDefinition::main_path());
/// assert_eq!(total.default_view().value().unwrap(), Some(NodeValue::from(200.0)));
///
/// graph.remove_modifier(&modifier).unwrap();
/// assert_eq!(total.default_view().value().unwrap(), None);
/// assert!(graph.remove_modifier(&modifier).is_err());
/// ```
pub struct CalculationGraph {
    core: Rc<GraphCore>,
}

impl CalculationGraph {
    /// Create an empty graph.
    ///
    /// # Arguments
    ///
    /// * `policy` - Decides how the stage nodes of each stat combine their inputs
    ///
    /// # Examples
    ///
    /// ```rust
    /// use statgraph::{CalculationGraph, StandardAggregation};
    /// use std::rc::Rc;
    ///
    /// let graph = CalculationGraph::new(Rc::new(StandardAggregation));
    /// assert!(graph.stats().is_empty());
    /// ```
    pub fn new(policy: Rc<dyn AggregationPolicy>) -> Self {
        Self {
            core: GraphCore::new(policy),
        }
    }

    /// Create a node per target stat and attach it to the modifier's form
    /// collection and path.
    pub fn add_modifier(&mut self, modifier: &Modifier) {
        self.core.add_modifier(modifier);
    }

    /// Detach and dispose the most recently added nodes of `modifier`.
    ///
    /// Fails without changing anything if the modifier is not attached to
    /// every one of its stats.
    pub fn remove_modifier(&mut self, modifier: &Modifier) -> Result<(), CalcError> {
        self.core.remove_modifier(modifier)
    }

    /// Register `behavior` and apply it to every matching stage node, now
    /// and when one is created later.
    ///
    /// Nodes it applies to are invalidated.
    pub fn add_behavior(&mut self, behavior: Rc<Behavior>) {
        self.core.add_behavior(behavior);
    }

    /// Unregister `behavior` and take it off every stage node.
    ///
    /// # Returns
    ///
    /// `CalcError::UnknownBehavior` if this instance was not registered.
    pub fn remove_behavior(&mut self, behavior: &Rc<Behavior>) -> Result<(), CalcError> {
        self.core.remove_behavior(behavior)
    }

    /// Number of registered behaviors.
    pub fn behavior_count(&self) -> usize {
        self.core.behaviors.borrow().len()
    }

    /// The stage node of `stat`, created if needed.
    pub fn node(&self, stat: &Stat, node_type: NodeType, path: &PathDefinition) -> NodeProvider {
        self.core.stage_node(stat, node_type, path)
    }

    /// The modifier nodes of one form of `stat` on `path`.
    pub fn form_nodes(&self, stat: &Stat, form: Form, path: &PathDefinition) -> FormNodeCollection {
        self.core.form_nodes(stat, form, path)
    }

    /// The paths carrying modifiers of `stat`.
    pub fn paths(&self, stat: &Stat) -> PathCollectionView {
        self.core.paths(stat)
    }

    /// Number of modifier nodes currently attached to `stat`.
    pub fn modifier_count(&self, stat: &Stat) -> usize {
        self.core
            .existing_subgraph(stat)
            .map_or(0, |subgraph| subgraph.modifier_count.get())
    }

    /// The stats that currently have a subgraph.
    pub fn stats(&self) -> Vec<Stat> {
        self.core.stats.borrow().keys().cloned().collect()
    }

    /// Number of live nodes, stage and modifier nodes alike.
    pub fn node_count(&self) -> usize {
        self.core.registry.borrow().len()
    }

    /// Suspends every suspendable view of the graph.
    pub fn suspender(&self) -> Rc<dyn SuspendableEvents> {
        self.core.suspender.clone()
    }

    /// Dispose stage nodes of stats without modifiers that nothing
    /// subscribes to, until no more can be removed. Stats left without
    /// anything are dropped. Returns the number of disposed nodes.
    pub fn prune(&mut self) -> usize {
        let pruned = self.core.prune();
        if pruned > 0 {
            debug!(pruned, remaining = self.node_count(), "pruned unused nodes");
        }
        pruned
    }

    /// A snapshot of which node read which during its last evaluation.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let nodes: Vec<Rc<CachingNode>> = self
            .core
            .registry
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        DependencyGraph::from_nodes(nodes.iter().map(|node| {
            (
                node.id(),
                node.label().clone(),
                node.dependency_ids(),
            )
        }))
    }
}
