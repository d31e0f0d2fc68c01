use statgraph::node_collection::{ModifierNodeCollection, NodeCollection};
use statgraph::path_collection::PathDefinitionCollection;
use statgraph::*;
use std::cell::RefCell;
use std::rc::Rc;

/// A node with a fixed value, for collections that only care about identity.
struct FixedNode {
    id: NodeId,
    changed: Event<()>,
}

impl CalculationNode for FixedNode {
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

fn fixed_node() -> NodeHandle {
    NodeHandle::new(Rc::new(FixedNode {
        id: NodeId::next(),
        changed: Event::new(),
    }))
}

fn provider() -> NodeProvider {
    NodeProvider::new(fixed_node(), fixed_node(), Rc::new(NullSuspendableEvents))
}

fn recording<T>(collection: &ObservableCollection<T>) -> Rc<RefCell<Vec<CollectionChange<T>>>>
where
    T: Clone + Eq + std::hash::Hash + 'static,
{
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    collection.subscribe(move |changes| sink.borrow_mut().extend(changes.iter().cloned()));
    seen
}

// ============================================================================
// Suspend/Resume Collapsing
// ============================================================================

#[test]
fn test_add_then_remove_while_suspended_collapses() {
    let collection = SuspendableObservableCollection::<&str>::new(Rc::new(EventBuffer::immediate()));
    let seen = recording(&collection);

    collection.suspend_events();
    collection.add("a");
    collection.remove(&"a");
    collection.resume_events();

    assert_eq!(*seen.borrow(), vec![CollectionChange::Reset]);
}

#[test]
fn test_single_change_while_suspended_is_kept() {
    let collection = SuspendableObservableCollection::<&str>::new(Rc::new(EventBuffer::immediate()));
    let seen = recording(&collection);

    collection.suspend_events();
    collection.add("a");
    assert!(seen.borrow().is_empty());
    collection.resume_events();

    assert_eq!(*seen.borrow(), vec![CollectionChange::Added("a")]);
}

#[test]
fn test_resume_without_changes_is_silent() {
    let collection = SuspendableObservableCollection::<&str>::new(Rc::new(EventBuffer::immediate()));
    let seen = recording(&collection);

    collection.suspend_events();
    collection.resume_events();

    assert!(seen.borrow().is_empty());
}

#[test]
fn test_untyped_signal_is_reported_once() {
    let collection = SuspendableObservableCollection::<i32>::new(Rc::new(EventBuffer::immediate()));
    let signals = Rc::new(RefCell::new(0));
    let sink = signals.clone();
    collection.subscribe_untyped(move |batch| *sink.borrow_mut() += batch.len());

    collection.suspend_events();
    collection.add(1);
    collection.add(2);
    collection.add(3);
    collection.resume_events();

    assert_eq!(*signals.borrow(), 1);
    assert_eq!(collection.items(), vec![1, 2, 3]);
}

#[test]
fn test_composite_suspends_children_added_later() {
    let composite = SuspendableEventsComposite::new();
    let collection = Rc::new(SuspendableObservableCollection::<i32>::new(Rc::new(
        EventBuffer::immediate(),
    )));
    let seen = recording(&collection);

    composite.suspend_events();
    composite.add(collection.clone());
    collection.add(7);
    assert!(seen.borrow().is_empty());

    composite.resume_events();
    assert_eq!(*seen.borrow(), vec![CollectionChange::Added(7)]);
}

#[test]
fn test_buffered_collection_batches_changes() {
    let buffer = Rc::new(EventBuffer::new());
    let collection = ObservableCollection::<i32>::new(buffer.clone());
    let batches = Rc::new(RefCell::new(Vec::new()));
    let sink = batches.clone();
    collection.subscribe(move |changes| sink.borrow_mut().push(changes.len()));

    {
        let _buffering = buffer.clone().hold();
        collection.add(1);
        collection.add(2);
        collection.remove(&1);
    }

    assert_eq!(*batches.borrow(), vec![3]);
}

// ============================================================================
// Path Reference Counting
// ============================================================================

#[test]
fn test_path_visible_while_referenced() {
    let paths = PathDefinitionCollection::new();
    let path = PathDefinition::new(ModifierSource::Local(LocalSource::Item("Helmet".to_string())));

    paths.add(path.clone());
    paths.add(path.clone());
    paths.remove(&path);
    assert!(paths.provider().default_view().contains(&path));

    paths.remove(&path);
    assert!(!paths.provider().default_view().contains(&path));

    // Extra removals do not go negative.
    paths.remove(&path);
    paths.add(path.clone());
    assert!(paths.provider().default_view().contains(&path));
}

#[test]
fn test_path_views_stay_in_sync() {
    let paths = PathDefinitionCollection::new();
    let provider = paths.provider();
    paths.add(PathDefinition::main_path());

    assert_eq!(
        provider.default_view().items(),
        provider.suspendable_view().items()
    );
}

// ============================================================================
// Modifier Stacking
// ============================================================================

#[test]
fn test_duplicate_modifiers_are_removed_last_in_first_out() {
    let collection = ModifierNodeCollection::new();
    let modifier = Modifier::constant(Stat::new("Life"), Form::BaseAdd, 10.0);
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
    assert!(collection.is_empty());

    assert!(matches!(
        collection.remove_modifier(&modifier),
        Err(CalcError::UnknownModifier(_))
    ));
}

#[test]
fn test_modifier_views_hold_matching_handles() {
    let collection = ModifierNodeCollection::new();
    let modifier = Modifier::constant(Stat::new("Mana"), Form::More, 20.0);
    let node = provider();
    collection.add_modifier(modifier.clone(), node.clone());

    assert!(collection.default_view().contains(node.default_view()));
    assert!(collection.suspendable_view().contains(node.suspendable_view()));
    assert!(!collection.default_view().contains(node.suspendable_view()));
    assert_eq!(collection.default_view().payload(node.default_view()), Some(modifier));
}

#[test]
fn test_node_collection_ignores_repeated_membership_changes() {
    let collection = NodeCollection::<Stat>::new(Rc::new(EventBuffer::immediate()));
    let node = fixed_node();
    let changes = Rc::new(RefCell::new(0));
    let sink = changes.clone();
    collection.subscribe(move |batch| *sink.borrow_mut() += batch.len());

    assert!(collection.add(node.clone(), Stat::new("Life")));
    assert!(!collection.add(node.clone(), Stat::new("Life")));
    assert!(collection.remove(&node));
    assert!(!collection.remove(&node));

    assert_eq!(*changes.borrow(), 2);
}
