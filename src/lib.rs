//! # statgraph - Incremental Stat Calculation Graph
//!
//! A stat calculation engine for character builds that provides:
//! - **Incremental** recalculation (a node is only recalculated after something it read changed)
//! - **Batched** updates (observers see one consolidated notification per update)
//! - **Suspendable** change propagation (notifications are held back, then collapsed)
//! - **Pluggable** aggregation of modifier forms into stat values
//!
//! ## Core Concepts
//!
//! ### Calculation Graph
//!
//! Every stat is calculated through a chain of stage nodes:
//!
//! ```text
//! [Modifiers] → Base → UncappedSubtotal (per path) → Subtotal → Total
//!                 ↑            ↑
//!          BaseSet/BaseAdd  Increase/More
//! ```
//!
//! 1. **Modifiers** write values into one `Form` of one or more stats
//! 2. **Stage nodes** read modifier nodes and other stage nodes, and cache the result
//! 3. **Paths** separate modifiers by source, so local modifiers only affect their own source
//! 4. **Bounds** (`Stat::minimum`, `Stat::maximum`) are stats of their own that clip the subtotal
//! 5. **Behaviors** wrap the calculation of chosen stage nodes
//!
//! ### Views
//!
//! Nodes and collections come with two views. The default view reports
//! changes immediately and is used inside the graph. The suspendable (or
//! buffered) view is for external observers: while a `Calculator` applies an
//! update, it reports nothing, and afterwards it reports each change at
//! most once.
//!
//! ## Example
//!
//! ```rust
//! use statgraph::*;
//!
//! let mut calculator = Calculator::default();
//! let life = Stat::new("Life");
//!
//! calculator
//!     .update(&CalculatorUpdate::adding(vec![
//!         Modifier::constant(life.clone(), Form::BaseAdd, 100.0),
//!         Modifier::constant(life.clone(), Form::BaseAdd, 50.0),
//!         Modifier::constant(life.clone(), Form::Increase, 50.0),
//!     ]))
//!     .unwrap();
//!
//! assert_eq!(calculator.value(&life).unwrap(), Some(NodeValue::from(225.0))); // (100 + 50) * 1.5
//! ```
//!
//! ## Modules
//!
//! - [`stat`] - Stat identity
//! - [`value`] - Node values and value expressions
//! - [`path`] - Modifier sources and calculation paths
//! - [`modifier`] - Modifiers, forms, node types and updates
//! - [`event`] - Events and the event buffer
//! - [`suspend`] - Suspendable events
//! - [`view`] - Default and buffered/suspendable view pairs
//! - [`collection`] - Observable collections
//! - [`node`] - Calculation nodes
//! - [`node_collection`] - Node collections
//! - [`path_collection`] - Reference-counted path collections
//! - [`aggregate`] - Aggregation of forms into stages
//! - [`behavior`] - Transformations of stage values
//! - [`graph`] - The calculation graph
//! - [`dependency`] - Dependency snapshots
//! - [`calculator`] - Update orchestration
//! - [`error`] - Error types

pub mod aggregate;
pub mod behavior;
pub mod calculator;
pub mod collection;
pub mod dependency;
pub mod error;
pub mod event;
pub mod graph;
pub mod modifier;
pub mod node;
pub mod node_collection;
pub mod path;
pub mod path_collection;
pub mod stat;
pub mod suspend;
pub mod value;
pub mod view;

// Re-export main types for convenience
pub use calculator::{Calculator, CalculatorOptions, Observation};
pub use error::CalcError;
pub use modifier::{CalculatorUpdate, Form, Modifier, NodeType};
pub use path::{LocalSource, ModifierSource, PathDefinition};
pub use stat::{DataType, Entity, Stat, StatBound};
pub use value::{ConstantValue, FunctionalValue, NodeValue, StatReference, Value, ValueContext};

// Re-export events and views
pub use collection::{CollectionChange, ObservableCollection, SuspendableObservableCollection};
pub use event::{BufferingGuard, Event, EventBuffer, SubscriptionId};
pub use suspend::{NullSuspendableEvents, SuspendGuard, SuspendableEvents, SuspendableEventsComposite};
pub use view::{EventViewProvider, SuspendableEventViewProvider};

// Re-export graph types
pub use aggregate::{AggregationPolicy, StandardAggregation};
pub use behavior::{Behavior, BehaviorPathInteraction};
pub use dependency::DependencyGraph;
pub use graph::CalculationGraph;
pub use node::{CalculationNode, NodeHandle, NodeId, NodeLabel, NodeProvider};
