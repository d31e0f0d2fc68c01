//! Stage aggregation.
//!
//! Stage nodes don't know how to combine the values below them; they ask an
//! `AggregationPolicy`. The graph treats the policy as opaque, so games with
//! other formulas can supply their own. `StandardAggregation` is the stock
//! policy:
//!
//! ```text
//! Base             = BaseOverride ?? (BaseSet + BaseAdd)
//! UncappedSubtotal = Base * (1 + Increase / 100) * More
//! Subtotal         = sum of UncappedSubtotal over all paths,
//!                    clipped to [Minimum.Total, Maximum.Total]  (main path)
//!                  = UncappedSubtotal                            (other paths)
//! Total            = TotalOverride ?? Subtotal
//! ```
//!
//! `Minimum` and `Maximum` are the bound companions of the stat; a bound
//! without a value leaves that side open. `Int` totals are rounded and `Bool`
//! totals become `1` for anything but zero.

use crate::error::CalcError;
use crate::modifier::{Form, NodeType};
use crate::path::PathDefinition;
use crate::stat::{DataType, Stat};
use crate::value::{NodeValue, Value, ValueContext};
use std::rc::Rc;

/// How the values of one form combine.
///
/// # Examples
///
/// ```rust
/// use statgraph::aggregate::StackRule;
/// use statgraph::NodeValue;
///
/// let values = vec![Some(NodeValue::from(10.0)), Some(NodeValue::from(20.0))];
/// assert_eq!(StackRule::Additive.stack(values.clone()), Some(NodeValue::from(30.0)));
/// assert_eq!(StackRule::Override.stack(values.clone()), Some(NodeValue::from(20.0)));
/// // +10% more and +20% more
/// assert_eq!(StackRule::Multiplicative.stack(values), Some(NodeValue::from(1.32)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackRule {
    /// The last value wins (values are ordered by registration).
    Override,
    /// Values are summed.
    Additive,
    /// Each value is a percentage applied as `1 + v / 100`; the factors are
    /// multiplied.
    Multiplicative,
}

impl StackRule {
    /// The rule the stock policy uses for `form`.
    pub fn for_form(form: Form) -> Self {
        match form {
            Form::BaseOverride | Form::TotalOverride => StackRule::Override,
            Form::BaseSet | Form::BaseAdd | Form::Increase => StackRule::Additive,
            Form::More => StackRule::Multiplicative,
        }
    }

    /// Combine `values`. Absent values are skipped; `None` if none remain.
    pub fn stack<I>(self, values: I) -> Option<NodeValue>
    where
        I: IntoIterator<Item = Option<NodeValue>>,
    {
        match self {
            StackRule::Override => values.into_iter().flatten().last(),
            StackRule::Additive => NodeValue::sum(values),
            StackRule::Multiplicative => {
                NodeValue::product(values.into_iter().map(|v| v.map(|v| v / 100.0 + 1.0)))
            }
        }
    }
}

/// Calculates the value of a stage node from the nodes below it.
pub trait AggregationPolicy {
    fn calculate(
        &self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
        context: &dyn ValueContext,
    ) -> Result<Option<NodeValue>, CalcError>;
}

/// The stock policy described in the module documentation.
///
/// # Examples
///
/// ```rust
/// use statgraph::{Calculator, CalculatorUpdate, Form, Modifier, NodeValue, Stat};
/// use statgraph::aggregate::StandardAggregation;
///
/// let mut calculator = Calculator::new(StandardAggregation);
/// let life = Stat::new("Life");
///
/// calculator
///     .update(&CalculatorUpdate::adding(vec![
///         Modifier::constant(life.clone(), Form::BaseSet, 50.0),
///         Modifier::constant(life.clone(), Form::BaseAdd, 50.0),
///         Modifier::constant(life.clone(), Form::Increase, 50.0),
///         Modifier::constant(life.clone(), Form::More, 10.0),
///     ]))
///     .unwrap();
///
/// assert_eq!(calculator.value(&life).unwrap(), Some(NodeValue::from(165.0)));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAggregation;

impl StandardAggregation {
    fn stacked(
        stat: &Stat,
        form: Form,
        paths: &[PathDefinition],
        context: &dyn ValueContext,
    ) -> Result<Option<NodeValue>, CalcError> {
        let mut values = Vec::new();
        for path in paths {
            values.extend(context.form_values(stat, form, path)?);
        }
        Ok(StackRule::for_form(form).stack(values))
    }

    fn base(
        stat: &Stat,
        path: &PathDefinition,
        context: &dyn ValueContext,
    ) -> Result<Option<NodeValue>, CalcError> {
        if let Some(value) = context.value(stat, NodeType::BaseOverride, path)? {
            return Ok(Some(value));
        }
        let set = context.value(stat, NodeType::BaseSet, path)?;
        let add = context.value(stat, NodeType::BaseAdd, path)?;
        Ok(NodeValue::sum([set, add]))
    }

    fn uncapped_subtotal(
        stat: &Stat,
        path: &PathDefinition,
        context: &dyn ValueContext,
    ) -> Result<Option<NodeValue>, CalcError> {
        let base = match context.value(stat, NodeType::Base, path)? {
            Some(base) => base,
            None => return Ok(None),
        };
        let increase = context
            .value(stat, NodeType::Increase, path)?
            .unwrap_or_else(|| NodeValue::from(0.0));
        let more = context
            .value(stat, NodeType::More, path)?
            .unwrap_or_else(|| NodeValue::from(1.0));
        Ok(Some(base * (increase / 100.0 + 1.0) * more))
    }

    fn subtotal(
        stat: &Stat,
        path: &PathDefinition,
        context: &dyn ValueContext,
    ) -> Result<Option<NodeValue>, CalcError> {
        if !path.is_main_path() {
            return context.value(stat, NodeType::UncappedSubtotal, path);
        }
        let mut values = Vec::new();
        for path in context.paths(stat) {
            values.push(context.value(stat, NodeType::UncappedSubtotal, &path)?);
        }
        match NodeValue::sum(values) {
            Some(value) => Self::clipped(stat, value, context).map(Some),
            None => Ok(None),
        }
    }

    /// Clip `value` to the totals of the bound companions of `stat`.
    fn clipped(stat: &Stat, value: NodeValue, context: &dyn ValueContext) -> Result<NodeValue, CalcError> {
        let main_path = PathDefinition::main_path();
        let lower = match stat.minimum() {
            Some(minimum) => context.value(&minimum, NodeType::Total, &main_path)?,
            None => None,
        };
        let upper = match stat.maximum() {
            Some(maximum) => context.value(&maximum, NodeType::Total, &main_path)?,
            None => None,
        };
        Ok(value.clip(
            lower.map_or(f64::NEG_INFINITY, |v| v.minimum()),
            upper.map_or(f64::INFINITY, |v| v.maximum()),
        ))
    }

    fn total(
        stat: &Stat,
        path: &PathDefinition,
        context: &dyn ValueContext,
    ) -> Result<Option<NodeValue>, CalcError> {
        let total = match context.value(stat, NodeType::TotalOverride, path)? {
            Some(value) => Some(value),
            None => context.value(stat, NodeType::Subtotal, path)?,
        };
        Ok(match stat.data_type() {
            DataType::Double => total,
            DataType::Int => total.map(|v| v.select(f64::round)),
            DataType::Bool => total.map(|v| v.select(|b| if b == 0.0 { 0.0 } else { 1.0 })),
        })
    }
}

impl AggregationPolicy for StandardAggregation {
    fn calculate(
        &self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
        context: &dyn ValueContext,
    ) -> Result<Option<NodeValue>, CalcError> {
        match node_type {
            NodeType::Total => Self::total(stat, path, context),
            NodeType::Subtotal => Self::subtotal(stat, path, context),
            NodeType::UncappedSubtotal => Self::uncapped_subtotal(stat, path, context),
            NodeType::Base => Self::base(stat, path, context),
            NodeType::BaseOverride
            | NodeType::BaseSet
            | NodeType::BaseAdd
            | NodeType::TotalOverride => match node_type.form() {
                Some(form) => Self::stacked(stat, form, std::slice::from_ref(path), context),
                None => Ok(None),
            },
            NodeType::Increase => Self::stacked(stat, Form::Increase, &path.influencing_paths(), context),
            NodeType::More => Self::stacked(stat, Form::More, &path.influencing_paths(), context),
        }
    }
}

/// The value of a stage node: a call into the graph's aggregation policy.
pub(crate) struct StageValue {
    stat: Stat,
    node_type: NodeType,
    path: PathDefinition,
    policy: Rc<dyn AggregationPolicy>,
}

impl StageValue {
    pub(crate) fn new(
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
        policy: Rc<dyn AggregationPolicy>,
    ) -> Self {
        Self {
            stat: stat.clone(),
            node_type,
            path: path.clone(),
            policy,
        }
    }
}

impl Value for StageValue {
    fn calculate(&self, context: &dyn ValueContext) -> Result<Option<NodeValue>, CalcError> {
        self.policy
            .calculate(&self.stat, self.node_type, &self.path, context)
    }

    fn description(&self) -> String {
        format!("{}.{} [{}]", self.stat, self.node_type, self.path)
    }
}
