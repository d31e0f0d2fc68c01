//! Calculator module.
//!
//! Provides the `Calculator` type, the entry point of the crate. It owns a
//! calculation graph and applies `CalculatorUpdate`s to it so that external
//! observers only ever see the graph between updates, never in the middle
//! of one.

use crate::aggregate::{AggregationPolicy, StandardAggregation};
use crate::behavior::Behavior;
use crate::dependency::DependencyGraph;
use crate::error::CalcError;
use crate::event::{EventBuffer, SubscriptionId};
use crate::graph::CalculationGraph;
use crate::modifier::{CalculatorUpdate, Form, NodeType};
use crate::node::{CalculationNode, NodeHandle, NodeProvider};
use crate::node_collection::{FormNodeCollection, NodeCollection};
use crate::path::PathDefinition;
use crate::path_collection::PathCollectionView;
use crate::stat::Stat;
use crate::suspend::SuspendGuard;
use crate::value::NodeValue;
use crate::view::EventViewProvider;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::{debug, warn};

/// Tunables of a `Calculator`.
///
/// # Examples
///
/// ```rust
/// use statgraph::calculator::CalculatorOptions;
///
/// let options = CalculatorOptions::from_json(r#"{ "prune_unused_nodes": false }"#).unwrap();
/// assert!(!options.prune_unused_nodes);
///
/// // Missing fields keep their defaults.
/// assert!(CalculatorOptions::from_json("{}").unwrap().prune_unused_nodes);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorOptions {
    /// Dispose nodes of stats without modifiers after each update.
    pub prune_unused_nodes: bool,
}

impl CalculatorOptions {
    /// Parse options from JSON. Missing fields keep their defaults.
    ///
    /// # Returns
    ///
    /// `CalcError::InvalidOptions` if `json` is not a valid options object.
    pub fn from_json(json: &str) -> Result<Self, CalcError> {
        serde_json::from_str(json).map_err(|err| CalcError::InvalidOptions(err.to_string()))
    }
}

impl Default for CalculatorOptions {
    fn default() -> Self {
        Self {
            prune_unused_nodes: true,
        }
    }
}

/// The stats that currently have modifiers, as a default and a buffered
/// view. Each entry is the main-path total node of the stat.
pub type RegisteredStats = EventViewProvider<Rc<NodeCollection<Stat>>>;

/// Applies modifier updates to a calculation graph and exposes its nodes.
///
/// During `update` every suspendable view of the graph is suspended and the
/// calculator's event buffer is buffering. When the update is done, the
/// suspended views are resumed first, then buffered notifications are
/// flushed. Each observer therefore sees at most one notification per
/// update.
///
/// # Examples
///
/// ```rust
/// use statgraph::{Calculator, CalculatorUpdate, Form, Modifier, NodeValue, Stat};
///
/// let mut calculator = Calculator::default();
/// let life = Stat::new("Life");
/// let flat = Modifier::constant(life.clone(), Form::BaseAdd, 50.0);
///
/// calculator
///     .update(&CalculatorUpdate::adding(vec![
///         flat.clone(),
///         Modifier::constant(life.clone(), Form::Increase, 20.0),
///     ]))
///     .unwrap();
/// assert_eq!(calculator.value(&life).unwrap(), Some(NodeValue::from(60.0)));
///
/// calculator.update(&CalculatorUpdate::removing(vec![flat])).unwrap();
/// assert_eq!(calculator.value(&life).unwrap(), None);
/// ```
pub struct Calculator {
    graph: CalculationGraph,
    event_buffer: Rc<EventBuffer>,
    registered_stats: RegisteredStats,
    registered: IndexMap<Stat, NodeProvider>,
    options: CalculatorOptions,
}

impl Calculator {
    /// Create a calculator with default options.
    ///
    /// # Arguments
    ///
    /// * `policy` - How stage nodes combine the values below them
    pub fn new(policy: impl AggregationPolicy + 'static) -> Self {
        Self::with_options(policy, CalculatorOptions::default())
    }

    /// Create a calculator with explicit options.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use statgraph::aggregate::StandardAggregation;
    /// use statgraph::{Calculator, CalculatorOptions};
    ///
    /// let options = CalculatorOptions { prune_unused_nodes: false };
    /// let calculator = Calculator::with_options(StandardAggregation, options);
    /// assert!(!calculator.options().prune_unused_nodes);
    /// ```
    pub fn with_options(policy: impl AggregationPolicy + 'static, options: CalculatorOptions) -> Self {
        let event_buffer = Rc::new(EventBuffer::new());
        let registered_stats = EventViewProvider::new(
            Rc::new(NodeCollection::new(Rc::new(EventBuffer::immediate()))),
            Rc::new(NodeCollection::new(event_buffer.clone())),
        );
        Self {
            graph: CalculationGraph::new(Rc::new(policy)),
            event_buffer,
            registered_stats,
            registered: IndexMap::new(),
            options,
        }
    }

    /// Apply `update` as one batch.
    ///
    /// Added modifiers are attached before removed ones are detached. If a
    /// removed modifier is unknown, the removals after it are skipped and
    /// `CalcError::UnknownModifier` is returned. Everything applied so far
    /// stays applied and is reported as usual.
    ///
    /// # Returns
    ///
    /// `Ok(())`, or the first `CalcError::UnknownModifier` among the removals.
    pub fn update(&mut self, update: &CalculatorUpdate) -> Result<(), CalcError> {
        if update.is_empty() {
            return Ok(());
        }
        debug!(
            added = update.added_modifiers().len(),
            removed = update.removed_modifiers().len(),
            "applying calculator update"
        );

        self.batch(|calculator| {
            for modifier in update.added_modifiers() {
                calculator.graph.add_modifier(modifier);
            }
            let removed = update
                .removed_modifiers()
                .iter()
                .try_for_each(|modifier| calculator.graph.remove_modifier(modifier));
            if let Err(err) = &removed {
                warn!(%err, "update stopped at a modifier that was never added");
            }

            calculator.reconcile_registered_stats(update);
            if calculator.options.prune_unused_nodes {
                calculator.graph.prune();
            }
            removed
        })
    }

    /// Register behaviors as one batch, the same way `update` applies
    /// modifiers.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use statgraph::behavior::{Behavior, BehaviorPathInteraction};
    /// use statgraph::value::{ConstantValue, Value};
    /// use statgraph::{Calculator, NodeType, NodeValue, Stat};
    /// use std::rc::Rc;
    ///
    /// let mut calculator = Calculator::default();
    /// let fixed = Rc::new(Behavior::new(
    ///     vec![Stat::new("Rage")],
    ///     vec![NodeType::Subtotal],
    ///     BehaviorPathInteraction::AllPaths,
    ///     |_: Rc<dyn Value>| Rc::new(ConstantValue::new(5.0)) as Rc<dyn Value>,
    /// ));
    ///
    /// calculator.add_behaviors(&[fixed.clone()]);
    /// assert_eq!(calculator.value(&Stat::new("Rage")).unwrap(), Some(NodeValue::from(5.0)));
    ///
    /// calculator.remove_behaviors(&[fixed]).unwrap();
    /// assert_eq!(calculator.value(&Stat::new("Rage")).unwrap(), None);
    /// ```
    pub fn add_behaviors(&mut self, behaviors: &[Rc<Behavior>]) {
        if behaviors.is_empty() {
            return;
        }
        debug!(count = behaviors.len(), "adding behaviors");
        self.batch(|calculator| {
            for behavior in behaviors {
                calculator.graph.add_behavior(behavior.clone());
            }
        })
    }

    /// Unregister behaviors as one batch.
    ///
    /// Stops at the first behavior that was never added and returns
    /// `CalcError::UnknownBehavior`. The ones before it stay removed.
    pub fn remove_behaviors(&mut self, behaviors: &[Rc<Behavior>]) -> Result<(), CalcError> {
        if behaviors.is_empty() {
            return Ok(());
        }
        debug!(count = behaviors.len(), "removing behaviors");
        self.batch(|calculator| {
            let removed = behaviors
                .iter()
                .try_for_each(|behavior| calculator.graph.remove_behavior(behavior));
            if let Err(err) = &removed {
                warn!(%err, "stopped at a behavior that was never added");
            }
            removed
        })
    }

    /// Run `apply` with the buffer held and the graph's views suspended.
    fn batch<R>(&mut self, apply: impl FnOnce(&mut Self) -> R) -> R {
        // Declared in this order so the views resume before the buffer flushes.
        let _buffering = self.event_buffer.clone().hold();
        let _suspended = SuspendGuard::new(self.graph.suspender());
        apply(self)
    }

    /// Register the touched stats that gained modifiers and unregister
    /// those left without any.
    fn reconcile_registered_stats(&mut self, update: &CalculatorUpdate) {
        let touched: IndexSet<&Stat> = update
            .added_modifiers()
            .iter()
            .chain(update.removed_modifiers())
            .flat_map(|modifier| modifier.stats())
            .collect();

        for stat in touched {
            let backed = self.graph.modifier_count(stat) > 0;
            if backed && !self.registered.contains_key(stat) {
                let total = self.graph.node(stat, NodeType::Total, &PathDefinition::main_path());
                self.registered_stats
                    .default_view()
                    .add(total.default_view().clone(), stat.clone());
                self.registered_stats
                    .buffered_view()
                    .add(total.suspendable_view().clone(), stat.clone());
                self.registered.insert(stat.clone(), total);
            } else if !backed {
                if let Some(total) = self.registered.shift_remove(stat) {
                    self.registered_stats.default_view().remove(total.default_view());
                    self.registered_stats
                        .buffered_view()
                        .remove(total.suspendable_view());
                }
            }
        }
    }

    /// The stage node of `stat`, created if needed.
    pub fn node(&self, stat: &Stat, node_type: NodeType, path: &PathDefinition) -> NodeProvider {
        self.graph.node(stat, node_type, path)
    }

    /// The main-path total of `stat`.
    pub fn value(&self, stat: &Stat) -> Result<Option<NodeValue>, CalcError> {
        self.node(stat, NodeType::Total, &PathDefinition::main_path())
            .default_view()
            .value()
    }

    /// The modifier nodes of `form` on `path` of `stat`.
    pub fn form_nodes(&self, stat: &Stat, form: Form, path: &PathDefinition) -> FormNodeCollection {
        self.graph.form_nodes(stat, form, path)
    }

    /// The paths `stat` currently has.
    pub fn paths(&self, stat: &Stat) -> PathCollectionView {
        self.graph.paths(stat)
    }

    /// The stats currently backed by at least one modifier.
    pub fn explicitly_registered_stats(&self) -> &RegisteredStats {
        &self.registered_stats
    }

    /// Call `handler` with the new value whenever the node changes after an
    /// update.
    ///
    /// The node is evaluated once right away so that its first change is
    /// reported. The subscription ends when the returned `Observation` is
    /// dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use statgraph::{Calculator, CalculatorUpdate, Form, Modifier, NodeType, PathDefinition, Stat};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let mut calculator = Calculator::default();
    /// let mana = Stat::new("Mana");
    /// let seen = Rc::new(RefCell::new(Vec::new()));
    /// let sink = seen.clone();
    ///
    /// let observation = calculator.observe(&mana, NodeType::Total, &PathDefinition::main_path(), move |value| {
    ///     sink.borrow_mut().push(value.unwrap());
    /// });
    ///
    /// calculator
    ///     .update(&CalculatorUpdate::adding(vec![
    ///         Modifier::constant(mana.clone(), Form::BaseAdd, 30.0),
    ///         Modifier::constant(mana.clone(), Form::BaseAdd, 20.0),
    ///     ]))
    ///     .unwrap();
    ///
    /// assert_eq!(seen.borrow().len(), 1);
    /// assert_eq!(observation.current().unwrap().unwrap(), 50.0);
    /// ```
    pub fn observe<F>(&self, stat: &Stat, node_type: NodeType, path: &PathDefinition, handler: F) -> Observation
    where
        F: Fn(Result<Option<NodeValue>, CalcError>) + 'static,
    {
        let node = self.node(stat, node_type, path).suspendable_view().clone();
        let reader = node.clone();
        let subscription = node
            .value_changed()
            .subscribe(move |_| handler(reader.value()));
        if let Err(err) = node.value() {
            debug!(node = %node.id(), %err, "observed node failed to evaluate");
        }
        Observation { node, subscription }
    }

    /// A snapshot of which node read which during its last evaluation.
    pub fn dependency_graph(&self) -> DependencyGraph {
        self.graph.dependency_graph()
    }

    /// The underlying graph.
    pub fn graph(&self) -> &CalculationGraph {
        &self.graph
    }

    /// The options this calculator was created with.
    pub fn options(&self) -> &CalculatorOptions {
        &self.options
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new(StandardAggregation)
    }
}

/// A live subscription created by `Calculator::observe`.
#[must_use = "the observation ends as soon as it is dropped"]
pub struct Observation {
    node: NodeHandle,
    subscription: SubscriptionId,
}

impl Observation {
    /// The current value of the observed node.
    pub fn current(&self) -> Result<Option<NodeValue>, CalcError> {
        self.node.value()
    }

    /// The external view of the observed node.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.node.value_changed().unsubscribe(self.subscription);
    }
}
