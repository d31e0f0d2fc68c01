//! Values module.
//!
//! `NodeValue` is the numeric payload flowing through the graph: a closed
//! `[minimum, maximum]` range where a scalar is a range of width zero.
//! `Option<NodeValue>` is used everywhere a value may be absent ("not
//! computed" or "not applicable").
//!
//! The `Value` trait is the calculation attached to a node. Values read
//! other parts of the graph through a `ValueContext`, and every read is
//! recorded so the node is invalidated when what it read changes.

use crate::error::CalcError;
use crate::modifier::{Form, NodeType};
use crate::path::PathDefinition;
use crate::stat::Stat;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Tolerance used when comparing two values.
const EPSILON: f64 = 1e-10;

fn almost_equal(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() <= EPSILON
}

/// A `[minimum, maximum]` range of numbers.
///
/// Arithmetic combines the bounds component-wise and re-orders them, so the
/// result is always a valid range. Equality is approximate.
///
/// # Examples
///
/// ```rust
/// use statgraph::NodeValue;
///
/// let scalar = NodeValue::from(10.0);
/// assert!(scalar.is_scalar());
///
/// let range = NodeValue::new(5.0, 15.0).unwrap();
/// assert_eq!((range + scalar).maximum(), 25.0);
/// assert_eq!(range.to_string(), "5 to 15");
///
/// assert!(NodeValue::new(2.0, 1.0).is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct NodeValue {
    minimum: f64,
    maximum: f64,
}

impl NodeValue {
    /// Create a range. Fails if `minimum > maximum`.
    pub fn new(minimum: f64, maximum: f64) -> Result<Self, CalcError> {
        if minimum > maximum {
            return Err(CalcError::InvalidRange { minimum, maximum });
        }
        Ok(Self { minimum, maximum })
    }

    /// Create a range from two bounds in any order.
    fn ordered(a: f64, b: f64) -> Self {
        if a <= b {
            Self {
                minimum: a,
                maximum: b,
            }
        } else {
            Self {
                minimum: b,
                maximum: a,
            }
        }
    }

    /// The lower end.
    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// The upper end.
    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// Returns `true` if both bounds are the same number.
    pub fn is_scalar(&self) -> bool {
        almost_equal(self.minimum, self.maximum)
    }

    /// Returns `true` if neither bound is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.minimum.is_finite() && self.maximum.is_finite()
    }

    /// Apply `f` to both bounds.
    pub fn select(self, f: impl Fn(f64) -> f64) -> Self {
        Self::ordered(f(self.minimum), f(self.maximum))
    }

    /// Combine two ranges bound by bound.
    pub fn combine(self, other: Self, f: impl Fn(f64, f64) -> f64) -> Self {
        Self::ordered(f(self.minimum, other.minimum), f(self.maximum, other.maximum))
    }

    /// Restrict both bounds to `[lower, upper]`.
    pub fn clip(self, lower: f64, upper: f64) -> Self {
        self.select(|v| v.max(lower).min(upper))
    }

    /// Returns `true` if every number of this range is below every number
    /// of `other`.
    pub fn is_less_than(&self, other: &Self) -> bool {
        self.maximum < other.minimum
    }

    /// Returns `true` if every number of this range is above every number
    /// of `other`.
    pub fn is_greater_than(&self, other: &Self) -> bool {
        self.minimum > other.maximum
    }

    /// Sum present values. Returns `None` if there are none.
    pub fn sum<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<Self>>,
    {
        values.into_iter().flatten().reduce(|acc, v| acc + v)
    }

    /// Multiply present values. Returns `None` if there are none.
    pub fn product<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<Self>>,
    {
        values.into_iter().flatten().reduce(|acc, v| acc * v)
    }
}

impl From<f64> for NodeValue {
    fn from(value: f64) -> Self {
        Self {
            minimum: value,
            maximum: value,
        }
    }
}

impl PartialEq for NodeValue {
    fn eq(&self, other: &Self) -> bool {
        almost_equal(self.minimum, other.minimum) && almost_equal(self.maximum, other.maximum)
    }
}

impl PartialEq<f64> for NodeValue {
    fn eq(&self, other: &f64) -> bool {
        *self == NodeValue::from(*other)
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_scalar() {
            write!(f, "{}", self.minimum)
        } else {
            write!(f, "{} to {}", self.minimum, self.maximum)
        }
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait for NodeValue {
            type Output = NodeValue;

            fn $method(self, other: NodeValue) -> NodeValue {
                self.combine(other, |a, b| a $op b)
            }
        }

        impl $trait<f64> for NodeValue {
            type Output = NodeValue;

            fn $method(self, other: f64) -> NodeValue {
                self.select(|a| a $op other)
            }
        }
    };
}

impl_binary_op!(Add, add, +);
impl_binary_op!(Sub, sub, -);
impl_binary_op!(Mul, mul, *);
impl_binary_op!(Div, div, /);

impl Neg for NodeValue {
    type Output = NodeValue;

    fn neg(self) -> NodeValue {
        self.select(|v| -v)
    }
}

/// Read access to the calculation graph for a value being computed.
///
/// Every read is recorded as a dependency of the node that is computing, so
/// that node is invalidated as soon as anything it read changes.
pub trait ValueContext {
    /// The value of a stage node.
    fn value(
        &self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> Result<Option<NodeValue>, CalcError>;

    /// The values of all modifier nodes of one form on one path, in the
    /// order the modifiers were added.
    fn form_values(
        &self,
        stat: &Stat,
        form: Form,
        path: &PathDefinition,
    ) -> Result<Vec<Option<NodeValue>>, CalcError>;

    /// The paths currently carrying at least one modifier of `stat`.
    fn paths(&self, stat: &Stat) -> Vec<PathDefinition>;
}

/// A calculation attached to a node.
///
/// # Examples
///
/// ```rust
/// use statgraph::value::{ConstantValue, Value};
/// use statgraph::NodeValue;
///
/// let value = ConstantValue::new(25.0);
/// assert_eq!(value.description(), "25");
/// assert_eq!(value.constant(), Some(NodeValue::from(25.0)));
/// ```
pub trait Value {
    /// Calculate the value, reading other nodes through `context`.
    fn calculate(&self, context: &dyn ValueContext) -> Result<Option<NodeValue>, CalcError>;

    /// A human-readable description for labels and logs. It plays no part
    /// in identity: different values may describe themselves the same way.
    fn description(&self) -> String;
}

/// A value that never changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantValue(pub Option<NodeValue>);

impl ConstantValue {
    /// A value that is always `value`.
    pub fn new(value: impl Into<NodeValue>) -> Self {
        Self(Some(value.into()))
    }

    /// A value that is always absent.
    pub fn absent() -> Self {
        Self(None)
    }

    /// The value, or `None` for an absent constant.
    pub fn constant(&self) -> Option<NodeValue> {
        self.0
    }
}

impl Value for ConstantValue {
    fn calculate(&self, _context: &dyn ValueContext) -> Result<Option<NodeValue>, CalcError> {
        Ok(self.0)
    }

    fn description(&self) -> String {
        match self.0 {
            Some(value) => value.to_string(),
            None => String::from("null"),
        }
    }
}

/// A value that reads a stage node of another stat, scaled by a multiplier.
///
/// # Examples
///
/// ```rust
/// use statgraph::value::{StatReference, Value};
/// use statgraph::Stat;
///
/// // 1 Life per 2 Strength
/// let life_from_strength = StatReference::new(Stat::new("Strength")).times(0.5);
/// assert_eq!(life_from_strength.description(), "0.5 * Strength.Total");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StatReference {
    stat: Stat,
    node_type: NodeType,
    path: PathDefinition,
    multiplier: f64,
}

impl StatReference {
    /// Reference the main-path total of `stat`.
    pub fn new(stat: Stat) -> Self {
        Self {
            stat,
            node_type: NodeType::Total,
            path: PathDefinition::main_path(),
            multiplier: 1.0,
        }
    }

    /// Reference another stage of the stat.
    pub fn at(mut self, node_type: NodeType, path: PathDefinition) -> Self {
        self.node_type = node_type;
        self.path = path;
        self
    }

    /// Scale the referenced value by `multiplier`.
    pub fn times(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }
}

impl Value for StatReference {
    fn calculate(&self, context: &dyn ValueContext) -> Result<Option<NodeValue>, CalcError> {
        let value = context.value(&self.stat, self.node_type, &self.path)?;
        Ok(value.map(|v| v * self.multiplier))
    }

    fn description(&self) -> String {
        let reference = if self.path.is_main_path() {
            format!("{}.{}", self.stat, self.node_type)
        } else {
            format!("{}.{}[{}]", self.stat, self.node_type, self.path)
        };
        if self.multiplier == 1.0 {
            reference
        } else {
            format!("{} * {}", self.multiplier, reference)
        }
    }
}

type Calculation = dyn Fn(&dyn ValueContext) -> Result<Option<NodeValue>, CalcError>;

/// A value backed by a closure.
///
/// # Examples
///
/// ```rust
/// use statgraph::value::FunctionalValue;
/// use statgraph::{NodeType, NodeValue, PathDefinition, Stat};
///
/// let doubled_strength = FunctionalValue::new("2 * Strength", |context| {
///     let strength = context.value(&Stat::new("Strength"), NodeType::Total, &PathDefinition::main_path())?;
///     Ok(strength.map(|v| v * 2.0))
/// });
/// ```
pub struct FunctionalValue {
    description: String,
    calculation: Box<Calculation>,
}

impl FunctionalValue {
    /// Create a value from a closure.
    ///
    /// # Arguments
    ///
    /// * `description` - Shown in labels and logs
    /// * `calculation` - Reads other nodes through the context it is given. Every
    ///   node read becomes a dependency.
    pub fn new<F>(description: &str, calculation: F) -> Self
    where
        F: Fn(&dyn ValueContext) -> Result<Option<NodeValue>, CalcError> + 'static,
    {
        Self {
            description: description.to_string(),
            calculation: Box::new(calculation),
        }
    }
}

impl Value for FunctionalValue {
    fn calculate(&self, context: &dyn ValueContext) -> Result<Option<NodeValue>, CalcError> {
        (self.calculation)(context)
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

impl fmt::Debug for FunctionalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionalValue")
            .field("description", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoGraph;

    impl ValueContext for NoGraph {
        fn value(
            &self,
            _stat: &Stat,
            _node_type: NodeType,
            _path: &PathDefinition,
        ) -> Result<Option<NodeValue>, CalcError> {
            Ok(Some(NodeValue::from(4.0)))
        }

        fn form_values(
            &self,
            _stat: &Stat,
            _form: Form,
            _path: &PathDefinition,
        ) -> Result<Vec<Option<NodeValue>>, CalcError> {
            Ok(Vec::new())
        }

        fn paths(&self, _stat: &Stat) -> Vec<PathDefinition> {
            Vec::new()
        }
    }

    #[test]
    fn test_invalid_range() {
        let err = NodeValue::new(3.0, 1.0).unwrap_err();
        assert_eq!(
            err,
            CalcError::InvalidRange {
                minimum: 3.0,
                maximum: 1.0
            }
        );
    }

    #[test]
    fn test_arithmetic_keeps_range_ordered() {
        let range = NodeValue::new(1.0, 3.0).unwrap();
        let negated = range * -2.0;
        assert_eq!(negated.minimum(), -6.0);
        assert_eq!(negated.maximum(), -2.0);
        assert_eq!(-range, NodeValue::new(-3.0, -1.0).unwrap());
    }

    #[test]
    fn test_approximate_equality() {
        assert_eq!(NodeValue::from(0.1 + 0.2), NodeValue::from(0.3));
        assert_ne!(NodeValue::from(0.3), NodeValue::from(0.31));
        assert!(NodeValue::from(2.0) == 2.0);
    }

    #[test]
    fn test_clip_and_comparisons() {
        let range = NodeValue::new(-5.0, 150.0).unwrap();
        assert_eq!(range.clip(0.0, 100.0), NodeValue::new(0.0, 100.0).unwrap());
        assert!(NodeValue::from(1.0).is_less_than(&NodeValue::from(2.0)));
        assert!(!range.is_greater_than(&NodeValue::from(0.0)));
    }

    #[test]
    fn test_sum_and_product_skip_absent_values() {
        let values = vec![Some(NodeValue::from(2.0)), None, Some(NodeValue::from(3.0))];
        assert_eq!(NodeValue::sum(values.clone()), Some(NodeValue::from(5.0)));
        assert_eq!(NodeValue::product(values), Some(NodeValue::from(6.0)));
        assert_eq!(NodeValue::sum(vec![None, None]), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeValue::from(12.5).to_string(), "12.5");
        assert_eq!(NodeValue::new(1.0, 2.0).unwrap().to_string(), "1 to 2");
    }

    #[test]
    fn test_stat_reference_scales_value() {
        let reference = StatReference::new(Stat::new("Strength")).times(0.5);
        assert_eq!(reference.calculate(&NoGraph).unwrap(), Some(NodeValue::from(2.0)));
    }

    #[test]
    fn test_functional_value() {
        let value = FunctionalValue::new("always 7", |_| Ok(Some(NodeValue::from(7.0))));
        assert_eq!(value.description(), "always 7");
        assert_eq!(value.calculate(&NoGraph).unwrap(), Some(NodeValue::from(7.0)));
    }
}
