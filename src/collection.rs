//! Observable collections.
//!
//! An `ObservableCollection` is an insertion-ordered set that reports every
//! effective change twice: as a typed `CollectionChange` and as an untyped
//! "changed" signal. Adding a present element or removing an absent one is a
//! no-op and reports nothing.

use crate::event::{Event, EventBuffer, SubscriptionId};
use crate::suspend::{ResettableChange, Suspension, SuspendableEvents};
use crate::view::CountsSubscribers;
use indexmap::IndexSet;
use std::cell::RefCell;
use std::hash::Hash;
use std::ops::Deref;
use std::rc::Rc;

/// A change of an observable collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange<T> {
    Added(T),
    Removed(T),
    /// Several changes happened and were collapsed; re-read the collection.
    Reset,
}

impl<T: PartialEq> ResettableChange for CollectionChange<T> {
    fn reset() -> Self {
        CollectionChange::Reset
    }
}

/// Raises the typed and untyped events of a collection through its buffer,
/// optionally holding them back while suspended.
pub(crate) struct ChangeNotifier<C> {
    buffer: Rc<EventBuffer>,
    changes: Rc<Event<C>>,
    changed: Rc<Event<()>>,
    suspension: Option<(Suspension<C>, Suspension<()>)>,
}

impl<C: ResettableChange + 'static> ChangeNotifier<C> {
    pub(crate) fn new(buffer: Rc<EventBuffer>) -> Self {
        Self {
            buffer,
            changes: Rc::new(Event::new()),
            changed: Rc::new(Event::new()),
            suspension: None,
        }
    }

    pub(crate) fn suspendable(buffer: Rc<EventBuffer>) -> Self {
        Self {
            suspension: Some((Suspension::new(), Suspension::new())),
            ..Self::new(buffer)
        }
    }

    pub(crate) fn notify(&self, change: C) {
        let (change, signal) = match &self.suspension {
            Some((typed, untyped)) => (typed.intercept(change), untyped.intercept(())),
            None => (Some(change), Some(())),
        };
        self.deliver(change, signal);
    }

    fn deliver(&self, change: Option<C>, signal: Option<()>) {
        if let Some(change) = change {
            self.buffer.buffer(&self.changes, change);
        }
        if let Some(signal) = signal {
            self.buffer.buffer(&self.changed, signal);
        }
    }

    pub(crate) fn suspend(&self) {
        if let Some((typed, untyped)) = &self.suspension {
            typed.suspend();
            untyped.suspend();
        }
    }

    pub(crate) fn resume(&self) {
        if let Some((typed, untyped)) = &self.suspension {
            let change = typed.resume();
            let signal = untyped.resume();
            self.deliver(change, signal);
        }
    }

    pub(crate) fn changes(&self) -> &Event<C> {
        &self.changes
    }

    pub(crate) fn changed(&self) -> &Event<()> {
        &self.changed
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.changes.subscriber_count() + self.changed.subscriber_count()
    }
}

/// An insertion-ordered set that reports its changes.
///
/// # Examples
///
/// ```rust
/// use statgraph::{CollectionChange, EventBuffer, ObservableCollection};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let collection = ObservableCollection::<&str>::new(Rc::new(EventBuffer::new()));
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let sink = seen.clone();
/// collection.subscribe(move |changes| sink.borrow_mut().extend(changes.iter().cloned()));
///
/// assert!(collection.add("a"));
/// assert!(!collection.add("a"));
/// assert!(collection.remove(&"a"));
/// assert!(!collection.remove(&"a"));
///
/// assert_eq!(
///     *seen.borrow(),
///     vec![CollectionChange::Added("a"), CollectionChange::Removed("a")]
/// );
/// ```
pub struct ObservableCollection<T> {
    items: RefCell<IndexSet<T>>,
    notifier: ChangeNotifier<CollectionChange<T>>,
}

impl<T> ObservableCollection<T>
where
    T: Clone + Eq + Hash + 'static,
{
    /// A collection raising its events through `buffer`.
    pub fn new(buffer: Rc<EventBuffer>) -> Self {
        Self::with_notifier(ChangeNotifier::new(buffer))
    }

    fn with_notifier(notifier: ChangeNotifier<CollectionChange<T>>) -> Self {
        Self {
            items: RefCell::new(IndexSet::new()),
            notifier,
        }
    }

    /// Add `item`. Returns `false`, and reports nothing, if already present.
    pub fn add(&self, item: T) -> bool {
        let inserted = self.items.borrow_mut().insert(item.clone());
        if inserted {
            self.notifier.notify(CollectionChange::Added(item));
        }
        inserted
    }

    /// Remove `item`. Returns `false`, and reports nothing, if absent.
    pub fn remove(&self, item: &T) -> bool {
        let removed = self.items.borrow_mut().shift_remove(item);
        if removed {
            self.notifier.notify(CollectionChange::Removed(item.clone()));
        }
        removed
    }

    /// Returns `true` if `item` is present.
    pub fn contains(&self, item: &T) -> bool {
        self.items.borrow().contains(item)
    }

    /// The number of items.
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Returns `true` if there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// The current elements in insertion order.
    pub fn items(&self) -> Vec<T> {
        self.items.borrow().iter().cloned().collect()
    }

    /// Subscribe to typed changes.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&[CollectionChange<T>]) + 'static,
    {
        self.notifier.changes().subscribe(handler)
    }

    /// Remove a handler added with `subscribe`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.changes().unsubscribe(id)
    }

    /// Subscribe to the untyped "changed" signal.
    pub fn subscribe_untyped<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&[()]) + 'static,
    {
        self.notifier.changed().subscribe(handler)
    }

    /// Remove a handler added with `subscribe_untyped`.
    pub fn unsubscribe_untyped(&self, id: SubscriptionId) -> bool {
        self.notifier.changed().unsubscribe(id)
    }

    pub(crate) fn changed_event(&self) -> &Event<()> {
        self.notifier.changed()
    }
}

impl<T> CountsSubscribers for ObservableCollection<T>
where
    T: Clone + Eq + Hash + 'static,
{
    fn subscriber_count(&self) -> usize {
        self.notifier.subscriber_count()
    }
}

/// An `ObservableCollection` whose notifications can be suspended.
///
/// While suspended, a single change is delivered precisely on resume. Two
/// or more different changes are delivered as one `CollectionChange::Reset`.
///
/// # Examples
///
/// ```rust
/// use statgraph::{CollectionChange, EventBuffer, SuspendableEvents, SuspendableObservableCollection};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let collection = SuspendableObservableCollection::<i32>::new(Rc::new(EventBuffer::immediate()));
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = seen.clone();
/// collection.subscribe(move |changes| sink.borrow_mut().extend(changes.iter().cloned()));
///
/// collection.suspend_events();
/// collection.add(1);
/// collection.remove(&1);
/// assert!(seen.borrow().is_empty());
///
/// collection.resume_events();
/// assert_eq!(*seen.borrow(), vec![CollectionChange::Reset]);
/// ```
pub struct SuspendableObservableCollection<T>(ObservableCollection<T>);

impl<T> SuspendableObservableCollection<T>
where
    T: Clone + Eq + Hash + 'static,
{
    /// A collection raising its events through `buffer` that can be suspended.
    pub fn new(buffer: Rc<EventBuffer>) -> Self {
        Self(ObservableCollection::with_notifier(
            ChangeNotifier::suspendable(buffer),
        ))
    }
}

impl<T> Deref for SuspendableObservableCollection<T> {
    type Target = ObservableCollection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> SuspendableEvents for SuspendableObservableCollection<T>
where
    T: Clone + Eq + Hash + 'static,
{
    fn suspend_events(&self) {
        self.0.notifier.suspend();
    }

    fn resume_events(&self) {
        self.0.notifier.resume();
    }
}

impl<T> CountsSubscribers for SuspendableObservableCollection<T>
where
    T: Clone + Eq + Hash + 'static,
{
    fn subscriber_count(&self) -> usize {
        self.0.subscriber_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting<T>(collection: &ObservableCollection<T>) -> Rc<RefCell<Vec<CollectionChange<T>>>>
    where
        T: Clone + Eq + Hash + 'static,
    {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        collection.subscribe(move |changes| sink.borrow_mut().extend(changes.iter().cloned()));
        seen
    }

    #[test]
    fn test_untyped_signal_follows_effective_changes() {
        let collection = ObservableCollection::<i32>::new(Rc::new(EventBuffer::immediate()));
        let signals = Rc::new(Cell::new(0));
        let sink = signals.clone();
        collection.subscribe_untyped(move |batch| sink.set(sink.get() + batch.len()));

        collection.add(1);
        collection.add(1);
        collection.add(2);
        collection.remove(&3);

        assert_eq!(signals.get(), 2);
        assert_eq!(collection.items(), vec![1, 2]);
        assert_eq!(collection.subscriber_count(), 1);
    }

    #[test]
    fn test_batched_buffer_groups_changes() {
        let buffer = Rc::new(EventBuffer::new());
        let collection = ObservableCollection::<&str>::new(buffer.clone());
        let batches = Rc::new(Cell::new(0));
        let sink = batches.clone();
        collection.subscribe(move |_| sink.set(sink.get() + 1));
        let seen = counting(&collection);

        buffer.start_buffering();
        collection.add("x");
        collection.add("y");
        assert!(seen.borrow().is_empty());
        buffer.release();

        assert_eq!(batches.get(), 1);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_suspended_single_change_is_precise() {
        let collection = SuspendableObservableCollection::<i32>::new(Rc::new(EventBuffer::immediate()));
        let seen = counting(&collection);

        collection.suspend_events();
        collection.add(5);
        assert!(seen.borrow().is_empty());
        collection.resume_events();
        collection.resume_events();

        assert_eq!(*seen.borrow(), vec![CollectionChange::Added(5)]);
    }

    #[test]
    fn test_resume_without_changes_raises_nothing() {
        let collection = SuspendableObservableCollection::<u8>::new(Rc::new(EventBuffer::immediate()));
        let seen = counting(&collection);
        let signals = Rc::new(Cell::new(0));
        let sink = signals.clone();
        collection.subscribe_untyped(move |_| sink.set(sink.get() + 1));

        collection.suspend_events();
        collection.resume_events();

        assert!(seen.borrow().is_empty());
        assert_eq!(signals.get(), 0);
    }
}
