//! Calculation nodes.
//!
//! A node is a cached, lazily evaluated vertex of the calculation graph.
//! When anything a node read during its last evaluation changes, the node
//! drops its cache and notifies its own dependents right away, so a cascade
//! of invalidations is complete before control returns to the caller.
//!
//! Every node is exposed through two handles:
//!
//! - the *default view* notifies immediately and is used by other nodes;
//! - the *suspendable view* is used by code outside the graph. While it is
//!   suspended, any number of invalidations result in a single notification
//!   when it is resumed.

use crate::collection::ObservableCollection;
use crate::error::CalcError;
use crate::event::{Event, SubscriptionId};
use crate::modifier::{Form, Modifier, NodeType};
use crate::node_collection::{FormNodeCollection, NodeCollection};
use crate::path::PathDefinition;
use crate::path_collection::PathCollectionView;
use crate::stat::Stat;
use crate::suspend::{SuspendableEvents, Suspension};
use crate::value::{NodeValue, Value, ValueContext};
use crate::view::{CountsSubscribers, SuspendableEventViewProvider};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Identity of a calculation node.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// A fresh id, unique within the process. Custom `CalculationNode`
    /// implementations take theirs from here.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A cached, invalidatable vertex of the calculation graph.
pub trait CalculationNode {
    fn id(&self) -> NodeId;

    /// The current value, calculated on demand and cached until invalidated.
    fn value(&self) -> Result<Option<NodeValue>, CalcError>;

    /// Raised when a previously calculated value became invalid.
    fn value_changed(&self) -> &Event<()>;

    /// Detach the node from everything it depends on.
    fn dispose(&self) {}
}

/// A shared handle to a calculation node, compared by identity.
///
/// The two views of one node are different handles.
#[derive(Clone)]
pub struct NodeHandle(Rc<dyn CalculationNode>);

impl NodeHandle {
    /// Wrap a node in a handle.
    ///
    /// # Arguments
    ///
    /// * `node` - The node. Two handles are equal only if they wrap the same
    ///   allocation.
    pub fn new(node: Rc<dyn CalculationNode>) -> Self {
        Self(node)
    }

    fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl Deref for NodeHandle {
    type Target = dyn CalculationNode;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for NodeHandle {}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHandle({})", self.0.id())
    }
}

impl CountsSubscribers for NodeHandle {
    fn subscriber_count(&self) -> usize {
        self.value_changed().subscriber_count()
    }
}

/// Both views of a node plus the handle suspending its external view.
pub type NodeProvider = SuspendableEventViewProvider<NodeHandle>;

/// What a node calculates, for diagnostics and dependency snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeLabel {
    /// An aggregating stage of a stat.
    Stage {
        stat: Stat,
        node_type: NodeType,
        path: PathDefinition,
    },
    /// The value of one modifier for one of its stats.
    Modifier {
        stat: Stat,
        form: Form,
        path: PathDefinition,
        value: String,
    },
}

impl NodeLabel {
    /// The label of the `node_type` stage of `stat` on `path`.
    pub fn stage(stat: &Stat, node_type: NodeType, path: &PathDefinition) -> Self {
        NodeLabel::Stage {
            stat: stat.clone(),
            node_type,
            path: path.clone(),
        }
    }

    /// The label of the node of `modifier` for `stat`.
    pub fn modifier(stat: &Stat, modifier: &Modifier) -> Self {
        NodeLabel::Modifier {
            stat: stat.clone(),
            form: modifier.form(),
            path: modifier.path(),
            value: modifier.value().description(),
        }
    }

    /// The stat the labelled node belongs to.
    pub fn stat(&self) -> &Stat {
        match self {
            NodeLabel::Stage { stat, .. } | NodeLabel::Modifier { stat, .. } => stat,
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeLabel::Stage {
                stat,
                node_type,
                path,
            } => {
                write!(f, "{}.{}", stat, node_type)?;
                if !path.is_main_path() {
                    write!(f, " [{}]", path)?;
                }
                Ok(())
            }
            NodeLabel::Modifier {
                stat,
                form,
                path,
                value,
            } => write!(f, "{}.{} {} [{}]", stat, form, value, path),
        }
    }
}

/// Where nodes look up the parts of the graph their values read.
///
/// Implementations create what is requested on first demand.
pub trait NodeRepository {
    fn node(&self, stat: &Stat, node_type: NodeType, path: &PathDefinition) -> NodeProvider;

    fn form_nodes(&self, stat: &Stat, form: Form, path: &PathDefinition) -> FormNodeCollection;

    fn paths(&self, stat: &Stat) -> PathCollectionView;
}

/// Something a node read while calculating.
enum Dependency {
    Node(NodeHandle),
    Forms(Rc<NodeCollection<Modifier>>),
    Paths(Rc<ObservableCollection<PathDefinition>>),
}

impl Dependency {
    fn changed(&self) -> &Event<()> {
        match self {
            Dependency::Node(node) => node.value_changed(),
            Dependency::Forms(collection) => collection.changed_event(),
            Dependency::Paths(collection) => collection.changed_event(),
        }
    }

    fn key(&self) -> usize {
        self.changed() as *const Event<()> as usize
    }
}

/// Gives a value access to the graph and records what it reads.
struct NodeValueContext<'a> {
    repository: &'a dyn NodeRepository,
    dependencies: RefCell<IndexMap<usize, Dependency>>,
}

impl<'a> NodeValueContext<'a> {
    fn new(repository: &'a dyn NodeRepository) -> Self {
        Self {
            repository,
            dependencies: RefCell::new(IndexMap::new()),
        }
    }

    fn record(&self, dependency: Dependency) {
        self.dependencies
            .borrow_mut()
            .entry(dependency.key())
            .or_insert(dependency);
    }

    fn into_dependencies(self) -> Vec<Dependency> {
        self.dependencies.into_inner().into_values().collect()
    }
}

impl ValueContext for NodeValueContext<'_> {
    fn value(
        &self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> Result<Option<NodeValue>, CalcError> {
        let node = self.repository.node(stat, node_type, path).default_view().clone();
        self.record(Dependency::Node(node.clone()));
        node.value()
    }

    fn form_values(
        &self,
        stat: &Stat,
        form: Form,
        path: &PathDefinition,
    ) -> Result<Vec<Option<NodeValue>>, CalcError> {
        let collection = self.repository.form_nodes(stat, form, path).default_view().clone();
        self.record(Dependency::Forms(collection.clone()));
        collection
            .nodes()
            .into_iter()
            .map(|node| {
                self.record(Dependency::Node(node.clone()));
                node.value()
            })
            .collect()
    }

    fn paths(&self, stat: &Stat) -> Vec<PathDefinition> {
        let paths = self.repository.paths(stat).default_view().clone();
        self.record(Dependency::Paths(paths.clone()));
        paths.items()
    }
}

#[derive(Debug, Clone, Copy)]
enum NodeState {
    Dirty,
    Cached(Option<NodeValue>),
    Failed,
}

/// The node implementation used for every stage and modifier node.
///
/// A successful evaluation is cached. A failed one is not, but the node
/// still tracks what it read, so it is reported as changed once the cause
/// of the failure may be gone.
pub struct CachingNode {
    id: NodeId,
    label: NodeLabel,
    value: Rc<dyn Value>,
    repository: Weak<dyn NodeRepository>,
    this: Weak<CachingNode>,
    state: Cell<NodeState>,
    computing: Cell<bool>,
    dependencies: RefCell<Vec<(Dependency, SubscriptionId)>>,
    value_changed: Event<()>,
    external_changed: Event<()>,
    suspension: Suspension<()>,
}

impl CachingNode {
    /// Create a dirty node.
    ///
    /// # Arguments
    ///
    /// * `label` - What the node calculates
    /// * `value` - The calculation
    /// * `repository` - Resolves the nodes `value` reads. Once the repository
    ///   is dropped, evaluation fails with `CalcError::Evaluation`.
    ///
    /// # Returns
    ///
    /// The node. It calculates nothing until its value is first requested.
    pub fn new(label: NodeLabel, value: Rc<dyn Value>, repository: Weak<dyn NodeRepository>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            id: NodeId::next(),
            label,
            value,
            repository,
            this: this.clone(),
            state: Cell::new(NodeState::Dirty),
            computing: Cell::new(false),
            dependencies: RefCell::new(Vec::new()),
            value_changed: Event::new(),
            external_changed: Event::new(),
            suspension: Suspension::new(),
        })
    }

    /// Both views of `node`, with the node itself as suspender.
    pub fn provider(node: &Rc<CachingNode>) -> NodeProvider {
        SuspendableEventViewProvider::new(
            NodeHandle::new(node.clone()),
            NodeHandle::new(Rc::new(SuspendableView(node.clone()))),
            node.clone(),
        )
    }

    /// What the node calculates.
    pub fn label(&self) -> &NodeLabel {
        &self.label
    }

    /// Returns `true` if the node holds a calculated value.
    pub fn is_cached(&self) -> bool {
        matches!(self.state.get(), NodeState::Cached(_))
    }

    /// The nodes this node read during its last evaluation.
    pub fn dependency_ids(&self) -> Vec<NodeId> {
        self.dependencies
            .borrow()
            .iter()
            .filter_map(|(dependency, _)| match dependency {
                Dependency::Node(node) => Some(node.id()),
                _ => None,
            })
            .collect()
    }

    fn evaluate(&self) -> Result<Option<NodeValue>, CalcError> {
        if let NodeState::Cached(value) = self.state.get() {
            return Ok(value);
        }
        if self.computing.get() {
            return Err(CalcError::CircularEvaluation(self.label.to_string()));
        }
        let repository = self.repository.upgrade().ok_or_else(|| CalcError::Evaluation {
            node: self.label.to_string(),
            message: String::from("the calculation graph was dropped"),
        })?;

        self.computing.set(true);
        let context = NodeValueContext::new(&*repository);
        let result = self.value.calculate(&context);
        self.computing.set(false);
        self.resubscribe(context.into_dependencies());

        let result = match result {
            Ok(Some(value)) if !value.is_finite() => {
                Err(CalcError::Unrepresentable(self.label.to_string()))
            }
            other => other,
        };
        match &result {
            Ok(value) => self.state.set(NodeState::Cached(*value)),
            Err(_) => self.state.set(NodeState::Failed),
        }
        result
    }

    /// Drop the cached value and notify dependents, unless the node is
    /// already dirty.
    pub(crate) fn invalidate(&self) {
        if matches!(self.state.get(), NodeState::Dirty) {
            return;
        }
        self.state.set(NodeState::Dirty);
        trace!(node = %self.label, "invalidated");
        self.value_changed.raise(&[()]);
        if self.suspension.intercept(()).is_some() {
            self.external_changed.raise(&[()]);
        }
    }

    fn resubscribe(&self, dependencies: Vec<Dependency>) {
        self.release_dependencies();
        let subscriptions: Vec<(Dependency, SubscriptionId)> = dependencies
            .into_iter()
            .map(|dependency| {
                let this = self.this.clone();
                let id = dependency.changed().subscribe(move |_| {
                    if let Some(node) = this.upgrade() {
                        node.invalidate();
                    }
                });
                (dependency, id)
            })
            .collect();
        *self.dependencies.borrow_mut() = subscriptions;
    }

    fn release_dependencies(&self) {
        let previous = std::mem::take(&mut *self.dependencies.borrow_mut());
        for (dependency, id) in previous {
            dependency.changed().unsubscribe(id);
        }
    }
}

impl CalculationNode for CachingNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn value(&self) -> Result<Option<NodeValue>, CalcError> {
        self.evaluate()
    }

    fn value_changed(&self) -> &Event<()> {
        &self.value_changed
    }

    fn dispose(&self) {
        self.release_dependencies();
        self.state.set(NodeState::Dirty);
        self.suspension.resume();
    }
}

impl SuspendableEvents for CachingNode {
    fn suspend_events(&self) {
        self.suspension.suspend();
    }

    fn resume_events(&self) {
        if self.suspension.resume().is_some() {
            self.external_changed.raise(&[()]);
        }
    }
}

impl fmt::Debug for CachingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingNode")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.state.get())
            .finish()
    }
}

/// The external view of a `CachingNode`.
struct SuspendableView(Rc<CachingNode>);

impl CalculationNode for SuspendableView {
    fn id(&self) -> NodeId {
        self.0.id
    }

    fn value(&self) -> Result<Option<NodeValue>, CalcError> {
        self.0.evaluate()
    }

    fn value_changed(&self) -> &Event<()> {
        &self.0.external_changed
    }

    fn dispose(&self) {
        self.0.dispose();
    }
}
