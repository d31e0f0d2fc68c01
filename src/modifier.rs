//! Modifier module.
//!
//! A `Modifier` is one contribution to one or more stats: a value written
//! into a specific stage (`Form`) on the path of its source. Producers
//! describe their changes to a calculator as a `CalculatorUpdate`, a pair
//! of added and removed modifiers.

use crate::path::{ModifierSource, PathDefinition};
use crate::stat::Stat;
use crate::value::{ConstantValue, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// The stage a modifier writes into.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Form {
    /// Replaces the base value. The last override wins.
    BaseOverride,
    /// Sets the base value. Summed.
    BaseSet,
    /// Adds to the base value. Summed.
    BaseAdd,
    /// Percentage increase, summed before applying.
    Increase,
    /// Percentage multiplier, each applied separately.
    More,
    /// Replaces the total. The last override wins.
    TotalOverride,
}

impl Form {
    pub const ALL: [Form; 6] = [
        Form::BaseOverride,
        Form::BaseSet,
        Form::BaseAdd,
        Form::Increase,
        Form::More,
        Form::TotalOverride,
    ];
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The kind of a stage node.
///
/// ```text
/// Total <- TotalOverride
///       <- Subtotal <- UncappedSubtotal (per path) <- Base <- BaseOverride
///                                                          <- BaseSet
///                                                          <- BaseAdd
///                                                  <- Increase
///                                                  <- More
/// ```
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    Total,
    TotalOverride,
    Subtotal,
    UncappedSubtotal,
    Base,
    BaseOverride,
    BaseSet,
    BaseAdd,
    Increase,
    More,
}

impl NodeType {
    /// The form whose modifiers this node aggregates, if any.
    pub fn form(self) -> Option<Form> {
        match self {
            NodeType::TotalOverride => Some(Form::TotalOverride),
            NodeType::BaseOverride => Some(Form::BaseOverride),
            NodeType::BaseSet => Some(Form::BaseSet),
            NodeType::BaseAdd => Some(Form::BaseAdd),
            NodeType::Increase => Some(Form::Increase),
            NodeType::More => Some(Form::More),
            NodeType::Total | NodeType::Subtotal | NodeType::UncappedSubtotal | NodeType::Base => {
                None
            }
        }
    }
}

impl From<Form> for NodeType {
    fn from(form: Form) -> Self {
        match form {
            Form::BaseOverride => NodeType::BaseOverride,
            Form::BaseSet => NodeType::BaseSet,
            Form::BaseAdd => NodeType::BaseAdd,
            Form::Increase => NodeType::Increase,
            Form::More => NodeType::More,
            Form::TotalOverride => NodeType::TotalOverride,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A contribution to one or more stats.
///
/// Modifiers are cheap to clone, and clones share their value. Equality is
/// by instance: a modifier equals its clones, while two modifiers built
/// separately are different even if they print the same. Adding the same
/// modifier twice creates two independent contributions, which are removed
/// again one at a time, most recent first.
///
/// # Examples
///
/// ```rust
/// use statgraph::{Form, LocalSource, Modifier, ModifierSource, Stat};
///
/// let flat_life = Modifier::constant(Stat::new("Life"), Form::BaseAdd, 40.0)
///     .with_source(ModifierSource::Local(LocalSource::Item("Helmet".to_string())));
///
/// assert_eq!(flat_life.stats(), &[Stat::new("Life")]);
/// assert!(!flat_life.path().is_main_path());
/// assert_eq!(flat_life, flat_life.clone());
///
/// // Built separately, so a different contribution.
/// assert_ne!(
///     Modifier::constant(Stat::new("Life"), Form::BaseAdd, 40.0),
///     Modifier::constant(Stat::new("Life"), Form::BaseAdd, 40.0),
/// );
/// ```
#[derive(Clone)]
pub struct Modifier {
    stats: Vec<Stat>,
    form: Form,
    value: Rc<dyn Value>,
    source: ModifierSource,
}

impl Modifier {
    /// Create a modifier.
    ///
    /// # Arguments
    ///
    /// * `stats` - The stats the value is applied to
    /// * `form` - The stage the value is written into
    /// * `value` - The calculation; shared by all clones of this modifier
    /// * `source` - Where the modifier comes from; decides its path
    pub fn new(stats: Vec<Stat>, form: Form, value: Rc<dyn Value>, source: ModifierSource) -> Self {
        Self {
            stats,
            form,
            value,
            source,
        }
    }

    /// A global modifier applying `value` to a single stat.
    pub fn single(stat: Stat, form: Form, value: impl Value + 'static) -> Self {
        Self::new(vec![stat], form, Rc::new(value), ModifierSource::Global)
    }

    /// A global modifier with a constant value.
    pub fn constant(stat: Stat, form: Form, value: f64) -> Self {
        Self::single(stat, form, ConstantValue::new(value))
    }

    /// Move the modifier to another source.
    ///
    /// The result is a different modifier than `self`.
    pub fn with_source(mut self, source: ModifierSource) -> Self {
        self.source = source;
        self
    }

    /// The stats this modifier applies to.
    pub fn stats(&self) -> &[Stat] {
        &self.stats
    }

    /// How the value is combined with others of the same stat.
    pub fn form(&self) -> Form {
        self.form
    }

    /// The shared value. Clones of this modifier hold the same one.
    pub fn value(&self) -> &Rc<dyn Value> {
        &self.value
    }

    /// Where the modifier comes from.
    pub fn source(&self) -> &ModifierSource {
        &self.source
    }

    /// The path this modifier's nodes are attached to.
    pub fn path(&self) -> PathDefinition {
        PathDefinition::new(self.source.clone())
    }
}

impl PartialEq for Modifier {
    fn eq(&self, other: &Self) -> bool {
        self.stats == other.stats
            && self.form == other.form
            && self.source == other.source
            && Rc::ptr_eq(&self.value, &other.value)
    }
}

impl Eq for Modifier {}

impl Hash for Modifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stats.hash(state);
        self.form.hash(state);
        self.source.hash(state);
        (Rc::as_ptr(&self.value) as *const () as usize).hash(state);
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats: Vec<String> = self.stats.iter().map(|s| s.to_string()).collect();
        write!(
            f,
            "{} {} {} ({})",
            stats.join(", "),
            self.form,
            self.value.description(),
            self.source
        )
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modifier")
            .field("stats", &self.stats)
            .field("form", &self.form)
            .field("value", &self.value.description())
            .field("source", &self.source)
            .finish()
    }
}

/// A batch of modifier changes applied to a calculator at once.
///
/// # Examples
///
/// ```rust
/// use statgraph::{CalculatorUpdate, Form, Modifier, Stat};
///
/// assert!(CalculatorUpdate::empty().is_empty());
///
/// let update = CalculatorUpdate::new(
///     vec![Modifier::constant(Stat::new("Life"), Form::BaseSet, 50.0)],
///     Vec::new(),
/// );
/// assert!(!update.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CalculatorUpdate {
    added_modifiers: Vec<Modifier>,
    removed_modifiers: Vec<Modifier>,
}

impl CalculatorUpdate {
    /// Create an update.
    ///
    /// # Arguments
    ///
    /// * `added_modifiers` - Modifiers to add, in order
    /// * `removed_modifiers` - Modifiers to remove, in order, after the additions
    pub fn new(added_modifiers: Vec<Modifier>, removed_modifiers: Vec<Modifier>) -> Self {
        Self {
            added_modifiers,
            removed_modifiers,
        }
    }

    /// The update that changes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// An update that only adds.
    pub fn adding(modifiers: Vec<Modifier>) -> Self {
        Self::new(modifiers, Vec::new())
    }

    /// An update that only removes.
    pub fn removing(modifiers: Vec<Modifier>) -> Self {
        Self::new(Vec::new(), modifiers)
    }

    pub fn added_modifiers(&self) -> &[Modifier] {
        &self.added_modifiers
    }

    pub fn removed_modifiers(&self) -> &[Modifier] {
        &self.removed_modifiers
    }

    /// Returns `true` if the update neither adds nor removes anything.
    pub fn is_empty(&self) -> bool {
        self.added_modifiers.is_empty() && self.removed_modifiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StatReference;
    use std::collections::HashSet;

    #[test]
    fn test_form_maps_to_node_type() {
        for form in Form::ALL {
            assert_eq!(NodeType::from(form).form(), Some(form));
        }
        assert_eq!(NodeType::Total.form(), None);
        assert_eq!(NodeType::UncappedSubtotal.form(), None);
    }

    #[test]
    fn test_identity_is_shared_by_clones_only() {
        let a = Modifier::constant(Stat::new("Life"), Form::BaseAdd, 10.0);
        let b = Modifier::constant(Stat::new("Life"), Form::BaseAdd, 10.0);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        let set: HashSet<Modifier> = vec![a.clone(), a, b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_same_description_is_not_same_modifier() {
        let strength = Stat::new("Strength");
        let as_double = Modifier::single(Stat::new("Life"), Form::BaseAdd, StatReference::new(strength.clone()));
        let as_int = Modifier::single(
            Stat::new("Life"),
            Form::BaseAdd,
            StatReference::new(strength.with_data_type(crate::stat::DataType::Int)),
        );
        assert_eq!(as_double.value().description(), as_int.value().description());
        assert_ne!(as_double, as_int);
    }

    #[test]
    fn test_shared_value_with_other_stats_is_different() {
        let value: Rc<dyn Value> = Rc::new(ConstantValue::new(5.0));
        let life = Modifier::new(vec![Stat::new("Life")], Form::BaseAdd, value.clone(), ModifierSource::Global);
        let mana = Modifier::new(vec![Stat::new("Mana")], Form::BaseAdd, value, ModifierSource::Global);
        assert_ne!(life, mana);
    }

    #[test]
    fn test_source_is_part_of_identity() {
        let global = Modifier::constant(Stat::new("Life"), Form::BaseAdd, 10.0);
        let given = global
            .clone()
            .with_source(ModifierSource::Local(crate::path::LocalSource::Given));
        assert_ne!(global, given);
        assert!(global.path().is_main_path());
    }

    #[test]
    fn test_display() {
        let modifier = Modifier::constant(Stat::new("Life"), Form::Increase, 15.0);
        assert_eq!(modifier.to_string(), "Life Increase 15 (Global)");
    }
}
