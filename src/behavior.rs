//! Behaviors module.
//!
//! A `Behavior` changes how stage nodes of some stats calculate their value.
//! It wraps the node's calculation in another one, for example to cap a
//! subtotal or to replace it outright. Behaviors are registered on the
//! graph and apply to every matching stage node, including nodes created
//! after the behavior was added.

use crate::error::CalcError;
use crate::modifier::NodeType;
use crate::path::PathDefinition;
use crate::stat::Stat;
use crate::value::{NodeValue, Value, ValueContext};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Which paths of the affected stats a behavior applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorPathInteraction {
    AllPaths,
    MainPathOnly,
}

type Transformation = dyn Fn(Rc<dyn Value>) -> Rc<dyn Value>;

/// A transformation of the stage values of some stats.
///
/// Behaviors are identified by instance: remove the same `Rc` that was
/// added.
///
/// # Examples
///
/// ```rust
/// use statgraph::behavior::{Behavior, BehaviorPathInteraction};
/// use statgraph::value::{FunctionalValue, Value};
/// use statgraph::{NodeType, PathDefinition, Stat};
/// use std::rc::Rc;
///
/// // Regeneration can't go above 100 per second.
/// let capped = Behavior::new(
///     vec![Stat::new("LifeRegen")],
///     vec![NodeType::Subtotal],
///     BehaviorPathInteraction::MainPathOnly,
///     |inner: Rc<dyn Value>| {
///         Rc::new(FunctionalValue::new("capped regen", move |context| {
///             Ok(inner.calculate(context)?.map(|v| v.clip(f64::NEG_INFINITY, 100.0)))
///         })) as Rc<dyn Value>
///     },
/// );
///
/// assert!(capped.affects(&Stat::new("LifeRegen"), NodeType::Subtotal, &PathDefinition::main_path()));
/// assert!(!capped.affects(&Stat::new("LifeRegen"), NodeType::Total, &PathDefinition::main_path()));
/// ```
pub struct Behavior {
    affected_stats: Vec<Stat>,
    affected_node_types: Vec<NodeType>,
    path_interaction: BehaviorPathInteraction,
    transformation: Box<Transformation>,
}

impl Behavior {
    /// Create a behavior.
    ///
    /// # Arguments
    ///
    /// * `affected_stats` - The stats whose stage nodes are transformed
    /// * `affected_node_types` - The stages that are transformed
    /// * `path_interaction` - Whether nodes on paths other than the main path
    ///   are transformed
    /// * `transformation` - Builds the new calculation from the current one
    pub fn new<F>(
        affected_stats: Vec<Stat>,
        affected_node_types: Vec<NodeType>,
        path_interaction: BehaviorPathInteraction,
        transformation: F,
    ) -> Self
    where
        F: Fn(Rc<dyn Value>) -> Rc<dyn Value> + 'static,
    {
        Self {
            affected_stats,
            affected_node_types,
            path_interaction,
            transformation: Box::new(transformation),
        }
    }

    /// The stats whose stage nodes are transformed.
    pub fn affected_stats(&self) -> &[Stat] {
        &self.affected_stats
    }

    /// The stages that are transformed.
    pub fn affected_node_types(&self) -> &[NodeType] {
        &self.affected_node_types
    }

    /// Whether local and converted paths are transformed too.
    pub fn path_interaction(&self) -> BehaviorPathInteraction {
        self.path_interaction
    }

    /// Returns `true` if the stage node `(stat, node_type, path)` is
    /// transformed by this behavior.
    pub fn affects(&self, stat: &Stat, node_type: NodeType, path: &PathDefinition) -> bool {
        self.affected_stats.contains(stat)
            && self.affected_node_types.contains(&node_type)
            && (self.path_interaction == BehaviorPathInteraction::AllPaths || path.is_main_path())
    }

    /// Wrap `value` in this behavior's calculation.
    pub fn transform(&self, value: Rc<dyn Value>) -> Rc<dyn Value> {
        (self.transformation)(value)
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats: Vec<String> = self.affected_stats.iter().map(|s| s.to_string()).collect();
        let node_types: Vec<String> = self.affected_node_types.iter().map(|t| t.to_string()).collect();
        write!(f, "{} [{}]", stats.join(", "), node_types.join(", "))
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Behavior")
            .field("affected_stats", &self.affected_stats)
            .field("affected_node_types", &self.affected_node_types)
            .field("path_interaction", &self.path_interaction)
            .finish()
    }
}

/// The value of a stage node with the behaviors applied to it, in the order
/// they were applied.
pub(crate) struct TransformableValue {
    base: Rc<dyn Value>,
    behaviors: RefCell<Vec<Rc<Behavior>>>,
    current: RefCell<Rc<dyn Value>>,
}

impl TransformableValue {
    pub(crate) fn new(base: Rc<dyn Value>) -> Self {
        Self {
            current: RefCell::new(base.clone()),
            base,
            behaviors: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, behavior: Rc<Behavior>) {
        self.behaviors.borrow_mut().push(behavior);
        self.rebuild();
    }

    /// Returns `false` if `behavior` was not applied.
    pub(crate) fn remove(&self, behavior: &Rc<Behavior>) -> bool {
        let removed = {
            let mut behaviors = self.behaviors.borrow_mut();
            match behaviors.iter().position(|b| Rc::ptr_eq(b, behavior)) {
                Some(index) => {
                    behaviors.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.rebuild();
        }
        removed
    }

    fn rebuild(&self) {
        let value = self
            .behaviors
            .borrow()
            .iter()
            .fold(self.base.clone(), |value, behavior| behavior.transform(value));
        *self.current.borrow_mut() = value;
    }
}

impl Value for TransformableValue {
    fn calculate(&self, context: &dyn ValueContext) -> Result<Option<NodeValue>, CalcError> {
        let current = self.current.borrow().clone();
        current.calculate(context)
    }

    fn description(&self) -> String {
        self.current.borrow().description()
    }
}
