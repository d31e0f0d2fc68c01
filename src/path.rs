//! Modifier sources and calculation paths.
//!
//! A stat is not calculated along a single chain of stages. Modifiers from
//! a local source (an item, a skill) form their own *path* that is combined
//! with the global one, and conversions open further paths. A
//! `PathDefinition` names one of these chains.

use crate::stat::Stat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a local modifier comes from.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocalSource {
    /// Granted unconditionally, e.g. base values of the character.
    Given,
    /// A passive tree node, by id.
    PassiveNode(u16),
    /// An item in a named slot.
    Item(String),
    /// A skill, by name.
    Skill(String),
    /// Entered manually by the user.
    UserSpecified,
}

/// The origin of a modifier.
///
/// # Examples
///
/// ```rust
/// use statgraph::{LocalSource, ModifierSource};
///
/// let item = ModifierSource::Local(LocalSource::Item("BodyArmour".to_string()));
/// assert_eq!(
///     item.influencing_sources(),
///     vec![item.clone(), ModifierSource::Global]
/// );
/// assert_eq!(ModifierSource::Global.influencing_sources(), vec![ModifierSource::Global]);
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModifierSource {
    Global,
    Local(LocalSource),
}

impl ModifierSource {
    /// Sources whose increase and more modifiers apply to values from this
    /// source: the source itself, then `Global` for local sources.
    pub fn influencing_sources(&self) -> Vec<ModifierSource> {
        match self {
            ModifierSource::Global => vec![ModifierSource::Global],
            ModifierSource::Local(_) => vec![self.clone(), ModifierSource::Global],
        }
    }

    /// Returns `true` for `ModifierSource::Global`.
    pub fn is_global(&self) -> bool {
        matches!(self, ModifierSource::Global)
    }
}

impl Default for ModifierSource {
    fn default() -> Self {
        ModifierSource::Global
    }
}

impl fmt::Display for ModifierSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifierSource::Global => f.write_str("Global"),
            ModifierSource::Local(LocalSource::Given) => f.write_str("Given"),
            ModifierSource::Local(LocalSource::PassiveNode(id)) => write!(f, "PassiveNode {}", id),
            ModifierSource::Local(LocalSource::Item(slot)) => write!(f, "Item {}", slot),
            ModifierSource::Local(LocalSource::Skill(name)) => write!(f, "Skill {}", name),
            ModifierSource::Local(LocalSource::UserSpecified) => f.write_str("UserSpecified"),
        }
    }
}

/// One calculation path of a stat: a modifier source plus the stats the
/// values were converted from (empty for unconverted paths).
///
/// # Examples
///
/// ```rust
/// use statgraph::{ModifierSource, PathDefinition, Stat};
///
/// let main = PathDefinition::main_path();
/// assert!(main.is_main_path());
///
/// let converted = PathDefinition::new(ModifierSource::Global)
///     .converted_from(vec![Stat::new("PhysicalDamage")]);
/// assert!(!converted.is_main_path());
/// assert_eq!(converted.to_string(), "Global via PhysicalDamage");
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathDefinition {
    modifier_source: ModifierSource,
    conversion_stats: Vec<Stat>,
}

impl PathDefinition {
    /// An unconverted path of `modifier_source`.
    pub fn new(modifier_source: ModifierSource) -> Self {
        Self {
            modifier_source,
            conversion_stats: Vec::new(),
        }
    }

    /// The global, unconverted path every stat has.
    pub fn main_path() -> Self {
        Self::new(ModifierSource::Global)
    }

    /// The same path, converted from `conversion_stats`.
    pub fn converted_from(mut self, conversion_stats: Vec<Stat>) -> Self {
        self.conversion_stats = conversion_stats;
        self
    }

    pub fn modifier_source(&self) -> &ModifierSource {
        &self.modifier_source
    }

    pub fn conversion_stats(&self) -> &[Stat] {
        &self.conversion_stats
    }

    /// Returns `true` for the global, unconverted path.
    pub fn is_main_path(&self) -> bool {
        self.modifier_source.is_global() && self.conversion_stats.is_empty()
    }

    /// The paths whose increase and more modifiers apply to this path.
    pub fn influencing_paths(&self) -> Vec<PathDefinition> {
        self.modifier_source
            .influencing_sources()
            .into_iter()
            .map(|source| PathDefinition {
                modifier_source: source,
                conversion_stats: self.conversion_stats.clone(),
            })
            .collect()
    }
}

impl Default for PathDefinition {
    fn default() -> Self {
        Self::main_path()
    }
}

impl fmt::Display for PathDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.modifier_source)?;
        if !self.conversion_stats.is_empty() {
            let stats: Vec<String> = self.conversion_stats.iter().map(|s| s.to_string()).collect();
            write!(f, " via {}", stats.join(", "))?;
        }
        Ok(())
    }
}
