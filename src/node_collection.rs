//! Node collections.
//!
//! A `NodeCollection` is an observable set of node handles, each tagged with
//! a payload (the modifier that created it, or the stat it totals).
//! `ModifierNodeCollection` keeps the nodes of one form of one stat on one
//! path, both as an immediate and as a suspendable collection.

use crate::collection::{ChangeNotifier, CollectionChange};
use crate::error::CalcError;
use crate::event::{Event, EventBuffer, SubscriptionId};
use crate::modifier::Modifier;
use crate::node::{NodeHandle, NodeProvider};
use crate::suspend::{SuspendableEvents, SuspendableEventsComposite};
use crate::view::{CountsSubscribers, SuspendableEventViewProvider};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Deref;
use std::rc::Rc;

/// An observable set of nodes with a payload per node.
///
/// Adding a node that is already present, or removing one that is absent,
/// changes nothing and reports nothing.
pub struct NodeCollection<P> {
    entries: RefCell<IndexMap<NodeHandle, P>>,
    notifier: ChangeNotifier<CollectionChange<NodeHandle>>,
}

impl<P: Clone> NodeCollection<P> {
    /// A collection raising its events through `buffer`.
    pub fn new(buffer: Rc<EventBuffer>) -> Self {
        Self::with_notifier(ChangeNotifier::new(buffer))
    }

    fn with_notifier(notifier: ChangeNotifier<CollectionChange<NodeHandle>>) -> Self {
        Self {
            entries: RefCell::new(IndexMap::new()),
            notifier,
        }
    }

    /// Add `node` with its payload. Returns `false`, and reports nothing, if already present.
    pub fn add(&self, node: NodeHandle, payload: P) -> bool {
        let inserted = {
            let mut entries = self.entries.borrow_mut();
            if entries.contains_key(&node) {
                false
            } else {
                entries.insert(node.clone(), payload);
                true
            }
        };
        if inserted {
            self.notifier.notify(CollectionChange::Added(node));
        }
        inserted
    }

    /// Remove `node`. Returns `false`, and reports nothing, if absent.
    pub fn remove(&self, node: &NodeHandle) -> bool {
        let removed = self.entries.borrow_mut().shift_remove(node).is_some();
        if removed {
            self.notifier.notify(CollectionChange::Removed(node.clone()));
        }
        removed
    }

    pub fn contains(&self, node: &NodeHandle) -> bool {
        self.entries.borrow().contains_key(node)
    }

    /// The number of nodes.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// The nodes in the order they were added.
    pub fn nodes(&self) -> Vec<NodeHandle> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// The nodes with their payloads, in the order they were added.
    pub fn node_properties(&self) -> Vec<(NodeHandle, P)> {
        self.entries
            .borrow()
            .iter()
            .map(|(node, payload)| (node.clone(), payload.clone()))
            .collect()
    }

    /// The payload stored with `node`.
    pub fn payload(&self, node: &NodeHandle) -> Option<P> {
        self.entries.borrow().get(node).cloned()
    }

    /// Register a handler for the typed changes.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&[CollectionChange<NodeHandle>]) + 'static,
    {
        self.notifier.changes().subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.changes().unsubscribe(id)
    }

    /// Register a handler that is only told that something changed.
    pub fn subscribe_untyped<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&[()]) + 'static,
    {
        self.notifier.changed().subscribe(handler)
    }

    pub fn unsubscribe_untyped(&self, id: SubscriptionId) -> bool {
        self.notifier.changed().unsubscribe(id)
    }

    pub(crate) fn changed_event(&self) -> &Event<()> {
        self.notifier.changed()
    }
}

impl<P: Clone> CountsSubscribers for NodeCollection<P> {
    fn subscriber_count(&self) -> usize {
        self.notifier.subscriber_count()
    }
}

/// A `NodeCollection` whose notifications can be suspended.
pub struct SuspendableNodeCollection<P>(NodeCollection<P>);

impl<P: Clone> SuspendableNodeCollection<P> {
    /// A collection raising its events through `buffer` that can be suspended.
    pub fn new(buffer: Rc<EventBuffer>) -> Self {
        Self(NodeCollection::with_notifier(ChangeNotifier::suspendable(
            buffer,
        )))
    }
}

impl<P> Deref for SuspendableNodeCollection<P> {
    type Target = NodeCollection<P>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<P: Clone> SuspendableEvents for SuspendableNodeCollection<P> {
    fn suspend_events(&self) {
        self.0.notifier.suspend();
    }

    fn resume_events(&self) {
        self.0.notifier.resume();
    }
}

impl<P: Clone> CountsSubscribers for SuspendableNodeCollection<P> {
    fn subscriber_count(&self) -> usize {
        self.0.subscriber_count()
    }
}

/// Both views of the modifier nodes of one form, plus their suspender.
pub type FormNodeCollection =
    SuspendableEventViewProvider<Rc<NodeCollection<Modifier>>, Rc<SuspendableNodeCollection<Modifier>>>;

/// The modifier nodes of one form of one stat on one path.
///
/// Nodes added through `add_modifier` are stacked per modifier instance, so
/// a modifier added several times is removed most recent first.
///
/// # Examples
///
/// ```rust
/// use statgraph::node_collection::ModifierNodeCollection;
/// use statgraph::CalcError;
/// use statgraph::{Form, Modifier, Stat};
///
/// let collection = ModifierNodeCollection::new();
/// let modifier = Modifier::constant(Stat::new("Life"), Form::BaseAdd, 10.0);
///
/// let err = collection.remove_modifier(&modifier).err().unwrap();
/// assert!(matches!(err, CalcError::UnknownModifier(_)));
/// ```
pub struct ModifierNodeCollection {
    default_view: Rc<NodeCollection<Modifier>>,
    suspendable_view: Rc<SuspendableNodeCollection<Modifier>>,
    suspender: Rc<SuspendableEventsComposite>,
    stacks: RefCell<HashMap<Modifier, Vec<NodeProvider>>>,
}

impl ModifierNodeCollection {
    /// An empty collection delivering its events immediately.
    pub fn new() -> Self {
        let buffer = Rc::new(EventBuffer::immediate());
        let suspendable_view = Rc::new(SuspendableNodeCollection::new(buffer.clone()));
        let suspender = Rc::new(SuspendableEventsComposite::new());
        suspender.add(suspendable_view.clone());
        Self {
            default_view: Rc::new(NodeCollection::new(buffer)),
            suspendable_view,
            suspender,
            stacks: RefCell::new(HashMap::new()),
        }
    }

    /// Attach `node` to both views and include its suspender.
    pub fn add(&self, node: &NodeProvider, modifier: Modifier) {
        self.suspender.add(node.suspender().clone());
        self.default_view
            .add(node.default_view().clone(), modifier.clone());
        self.suspendable_view
            .add(node.suspendable_view().clone(), modifier);
    }

    /// Detach `node` from both views and drop its suspender.
    pub fn remove(&self, node: &NodeProvider) {
        self.default_view.remove(node.default_view());
        self.suspendable_view.remove(node.suspendable_view());
        self.suspender.remove(node.suspender());
    }

    /// Attach `node` and push it onto the stack of `modifier`.
    pub fn add_modifier(&self, modifier: Modifier, node: NodeProvider) {
        self.stacks
            .borrow_mut()
            .entry(modifier.clone())
            .or_default()
            .push(node.clone());
        self.add(&node, modifier);
    }

    /// Pop the most recently added node of `modifier` and detach it.
    pub fn remove_modifier(&self, modifier: &Modifier) -> Result<NodeProvider, CalcError> {
        let node = {
            let mut stacks = self.stacks.borrow_mut();
            let (node, now_empty) = match stacks.get_mut(modifier) {
                Some(stack) => (stack.pop(), stack.is_empty()),
                None => (None, false),
            };
            if now_empty {
                stacks.remove(modifier);
            }
            node
        };
        let node = node.ok_or_else(|| CalcError::UnknownModifier(modifier.to_string()))?;
        self.remove(&node);
        Ok(node)
    }

    /// Returns `true` if `modifier` has at least one node here.
    pub fn has_modifier(&self, modifier: &Modifier) -> bool {
        self.stacks
            .borrow()
            .get(modifier)
            .map_or(false, |stack| !stack.is_empty())
    }

    /// The number of attached nodes, across all modifiers.
    pub fn len(&self) -> usize {
        self.default_view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.default_view.is_empty()
    }

    /// The view the graph uses internally.
    pub fn default_view(&self) -> &Rc<NodeCollection<Modifier>> {
        &self.default_view
    }

    /// The view for code outside the graph.
    pub fn suspendable_view(&self) -> &Rc<SuspendableNodeCollection<Modifier>> {
        &self.suspendable_view
    }

    /// Suspends the external view and every attached node.
    pub fn suspender(&self) -> Rc<dyn SuspendableEvents> {
        self.suspender.clone()
    }

    /// Both views and the suspender in one provider.
    pub fn provider(&self) -> FormNodeCollection {
        SuspendableEventViewProvider::new(
            self.default_view.clone(),
            self.suspendable_view.clone(),
            self.suspender(),
        )
    }
}

impl Default for ModifierNodeCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl CountsSubscribers for ModifierNodeCollection {
    fn subscriber_count(&self) -> usize {
        self.default_view.subscriber_count() + self.suspendable_view.subscriber_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::Form;
    use crate::node::{CalculationNode, NodeId};
    use crate::stat::Stat;
    use crate::suspend::NullSuspendableEvents;
    use crate::value::NodeValue;
    use std::cell::Cell;

    struct StubNode {
        id: NodeId,
        changed: Event<()>,
    }

    impl CalculationNode for StubNode {
        fn id(&self) -> NodeId {
            self.id
        }

        fn value(&self) -> Result<Option<NodeValue>, CalcError> {
            Ok(None)
        }

        fn value_changed(&self) -> &Event<()> {
            &self.changed
        }
    }

    #[derive(Default)]
    struct CountingSuspender {
        suspended: Cell<usize>,
    }

    impl SuspendableEvents for CountingSuspender {
        fn suspend_events(&self) {
            self.suspended.set(self.suspended.get() + 1);
        }

        fn resume_events(&self) {}
    }

    fn stub(id: NodeId) -> NodeHandle {
        NodeHandle::new(Rc::new(StubNode {
            id,
            changed: Event::new(),
        }))
    }

    fn provider() -> NodeProvider {
        let id = NodeId::next();
        SuspendableEventViewProvider::new(stub(id), stub(id), Rc::new(NullSuspendableEvents))
    }

    fn life() -> Modifier {
        Modifier::constant(Stat::new("Life"), Form::BaseAdd, 10.0)
    }

    #[test]
    fn test_node_collection_is_a_set() {
        let collection = NodeCollection::new(Rc::new(EventBuffer::immediate()));
        let changes = Rc::new(Cell::new(0));
        let sink = changes.clone();
        collection.subscribe(move |batch| sink.set(sink.get() + batch.len()));
        let node = provider().default_view().clone();

        assert!(collection.add(node.clone(), "first"));
        assert!(!collection.add(node.clone(), "second"));
        assert_eq!(collection.payload(&node), Some("first"));
        assert_eq!(collection.node_properties(), vec![(node.clone(), "first")]);
        assert!(collection.remove(&node));
        assert!(!collection.remove(&node));

        assert_eq!(changes.get(), 2);
    }

    #[test]
    fn test_add_attaches_to_both_views() {
        let collection = ModifierNodeCollection::new();
        let node = provider();

        collection.add(&node, life());

        assert!(collection.default_view().contains(node.default_view()));
        assert!(collection.suspendable_view().contains(node.suspendable_view()));
        assert!(!collection.default_view().contains(node.suspendable_view()));

        collection.remove(&node);
        assert!(collection.is_empty());
        assert!(collection.suspendable_view().is_empty());
    }

    #[test]
    fn test_add_registers_node_suspender() {
        let collection = ModifierNodeCollection::new();
        let suspender = Rc::new(CountingSuspender::default());
        let node = SuspendableEventViewProvider::new(
            provider().default_view().clone(),
            provider().suspendable_view().clone(),
            suspender.clone(),
        );

        collection.add(&node, life());
        collection.suspender().suspend_events();
        assert_eq!(suspender.suspended.get(), 1);

        collection.remove(&node);
        collection.suspender().suspend_events();
        assert_eq!(suspender.suspended.get(), 1);
    }

    #[test]
    fn test_modifier_stack_is_lifo() {
        let collection = ModifierNodeCollection::new();
        let modifier = life();
        let first = provider();
        let second = provider();

        collection.add_modifier(modifier.clone(), first.clone());
        collection.add_modifier(modifier.clone(), second.clone());
        assert_eq!(collection.len(), 2);

        let removed = collection.remove_modifier(&modifier).unwrap();
        assert_eq!(removed.default_view(), second.default_view());
        assert!(collection.default_view().contains(first.default_view()));

        let removed = collection.remove_modifier(&modifier).unwrap();
        assert_eq!(removed.default_view(), first.default_view());
        assert!(!collection.has_modifier(&modifier));
        assert!(collection.remove_modifier(&modifier).is_err());
    }

    #[test]
    fn test_lookalike_modifiers_have_separate_stacks() {
        let collection = ModifierNodeCollection::new();
        let kept = provider();
        collection.add_modifier(life(), kept.clone());

        assert!(!collection.has_modifier(&life()));
        assert!(collection.remove_modifier(&life()).is_err());
        assert!(collection.default_view().contains(kept.default_view()));
    }

    #[test]
    fn test_suspended_view_holds_back_changes() {
        let collection = ModifierNodeCollection::new();
        let changes = Rc::new(Cell::new(0));
        let sink = changes.clone();
        collection
            .suspendable_view()
            .subscribe(move |batch| sink.set(sink.get() + batch.len()));

        collection.suspender().suspend_events();
        collection.add_modifier(life(), provider());
        assert_eq!(changes.get(), 0);
        collection.suspender().resume_events();

        assert_eq!(changes.get(), 1);
    }
}
