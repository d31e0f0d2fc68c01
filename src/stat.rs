//! Stat module.
//!
//! Provides the `Stat` type, the key every node of the calculation graph is
//! grouped under. A stat is identified by an interned name together with
//! the entity it belongs to, so "Life" of the character and "Life" of a
//! minion are different stats.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The game entity a stat belongs to.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Entity {
    Character,
    Totem,
    Minion,
    Enemy,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Character => "Character",
            Entity::Totem => "Totem",
            Entity::Minion => "Minion",
            Entity::Enemy => "Enemy",
        };
        f.write_str(name)
    }
}

/// How the values of a stat are interpreted.
///
/// The stock aggregation rounds `Int` totals and turns `Bool` totals into
/// `0` or `1`.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    Double,
    Int,
    Bool,
}

/// Which limit of another stat a bound stat holds.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatBound {
    Minimum,
    Maximum,
}

impl fmt::Display for StatBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An immutable stat key.
///
/// Uses `Arc<str>` for the identity so clones are cheap and comparison is
/// fast. Two stats are equal when identity, entity, data type and bound
/// match.
///
/// Every stat has a `minimum()` and a `maximum()` companion. Modifiers of the
/// companions set the range the stock aggregation clips the stat's subtotal
/// to. Companions have no companions of their own.
///
/// # Examples
///
/// ```rust
/// use statgraph::{DataType, Entity, Stat};
///
/// let life = Stat::new("Life");
/// assert_eq!(life.identity(), "Life");
/// assert_eq!(life.entity(), Entity::Character);
///
/// let minion_life = Stat::new("Life").with_entity(Entity::Minion);
/// assert_ne!(life, minion_life);
///
/// let charges = Stat::new("PowerCharges").with_data_type(DataType::Int);
/// assert_eq!(charges.data_type(), DataType::Int);
///
/// let cap = life.maximum().unwrap();
/// assert_eq!(cap.to_string(), "Life.Maximum");
/// assert!(cap.maximum().is_none());
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stat {
    identity: Arc<str>,
    entity: Entity,
    data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bound: Option<StatBound>,
}

impl Stat {
    /// Create a `Double` stat of the character.
    pub fn new(identity: &str) -> Self {
        Self {
            identity: Arc::from(identity),
            entity: Entity::Character,
            data_type: DataType::Double,
            bound: None,
        }
    }

    /// Move this stat to another entity.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = entity;
        self
    }

    /// Change how values of this stat are interpreted.
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// How values of this stat are interpreted.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// The limit this stat holds, if it is a companion of another stat.
    pub fn bound(&self) -> Option<StatBound> {
        self.bound
    }

    /// The stat holding the lower limit of this one.
    ///
    /// # Returns
    ///
    /// `None` if this stat is itself a minimum or maximum.
    pub fn minimum(&self) -> Option<Stat> {
        self.companion(StatBound::Minimum)
    }

    /// The stat holding the upper limit of this one.
    ///
    /// # Returns
    ///
    /// `None` if this stat is itself a minimum or maximum.
    pub fn maximum(&self) -> Option<Stat> {
        self.companion(StatBound::Maximum)
    }

    fn companion(&self, bound: StatBound) -> Option<Stat> {
        if self.bound.is_some() {
            return None;
        }
        Some(Self {
            bound: Some(bound),
            ..self.clone()
        })
    }
}

impl From<&str> for Stat {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entity {
            Entity::Character => write!(f, "{}", self.identity)?,
            entity => write!(f, "{}.{}", entity, self.identity)?,
        }
        match self.bound {
            Some(bound) => write!(f, ".{}", bound),
            None => Ok(()),
        }
    }
}
