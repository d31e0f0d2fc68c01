//! Suspendable events.
//!
//! While suspended, an observable holds back its notifications. At most one
//! notification is kept: a repeat of the same notification is absorbed, a
//! different one collapses both into the type's reset notification. Resuming
//! delivers what was kept, once.

use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Something whose notifications can be held back.
pub trait SuspendableEvents {
    fn suspend_events(&self);
    fn resume_events(&self);
}

/// A notification type with a generic "something changed" value, used when
/// several different notifications were held back.
pub trait ResettableChange: PartialEq {
    fn reset() -> Self;
}

impl ResettableChange for () {
    fn reset() -> Self {}
}

/// Suspending and resuming does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSuspendableEvents;

impl SuspendableEvents for NullSuspendableEvents {
    fn suspend_events(&self) {}

    fn resume_events(&self) {}
}

/// Holds back at most one notification while suspended.
pub(crate) struct Suspension<C> {
    suspended: Cell<bool>,
    pending: RefCell<Option<C>>,
}

impl<C: ResettableChange> Suspension<C> {
    pub(crate) fn new() -> Self {
        Self {
            suspended: Cell::new(false),
            pending: RefCell::new(None),
        }
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.suspended.get()
    }

    /// Returns the change if it should be delivered now, or keeps it.
    pub(crate) fn intercept(&self, change: C) -> Option<C> {
        if !self.suspended.get() {
            return Some(change);
        }
        let mut pending = self.pending.borrow_mut();
        let merged = match pending.take() {
            None => change,
            Some(previous) if previous == change => previous,
            Some(_) => C::reset(),
        };
        *pending = Some(merged);
        None
    }

    pub(crate) fn suspend(&self) {
        self.suspended.set(true);
    }

    /// Stop suspending and hand out the kept notification, if any.
    pub(crate) fn resume(&self) -> Option<C> {
        self.suspended.set(false);
        self.pending.borrow_mut().take()
    }
}

fn address(child: &Rc<dyn SuspendableEvents>) -> usize {
    Rc::as_ptr(child) as *const () as usize
}

/// Forwards suspend and resume to a changing set of children.
///
/// A child added while the composite is suspended is suspended right away,
/// so everything reachable from the composite resumes together.
///
/// # Examples
///
/// ```rust
/// use statgraph::{NullSuspendableEvents, SuspendableEvents, SuspendableEventsComposite};
/// use std::rc::Rc;
///
/// let composite = SuspendableEventsComposite::new();
/// let child: Rc<dyn SuspendableEvents> = Rc::new(NullSuspendableEvents);
///
/// assert!(composite.add(child.clone()));
/// assert!(!composite.add(child.clone()));
/// assert_eq!(composite.len(), 1);
///
/// composite.suspend_events();
/// composite.resume_events();
///
/// assert!(composite.remove(&child));
/// assert!(composite.is_empty());
/// ```
#[derive(Default)]
pub struct SuspendableEventsComposite {
    children: RefCell<IndexMap<usize, Rc<dyn SuspendableEvents>>>,
    suspended: Cell<bool>,
}

impl SuspendableEventsComposite {
    /// An empty, unsuspended composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a child. Returns `false` if it is already part of the composite.
    pub fn add(&self, child: Rc<dyn SuspendableEvents>) -> bool {
        let key = address(&child);
        let inserted = {
            let mut children = self.children.borrow_mut();
            if children.contains_key(&key) {
                false
            } else {
                children.insert(key, child.clone());
                true
            }
        };
        if inserted && self.suspended.get() {
            child.suspend_events();
        }
        inserted
    }

    /// Remove a child. Returns `false` if it was not part of the composite.
    pub fn remove(&self, child: &Rc<dyn SuspendableEvents>) -> bool {
        self.children
            .borrow_mut()
            .shift_remove(&address(child))
            .is_some()
    }

    /// Returns `true` if `child` is part of the composite.
    pub fn contains(&self, child: &Rc<dyn SuspendableEvents>) -> bool {
        self.children.borrow().contains_key(&address(child))
    }

    /// The number of children.
    pub fn len(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.borrow().is_empty()
    }

    fn snapshot(&self) -> Vec<Rc<dyn SuspendableEvents>> {
        self.children.borrow().values().cloned().collect()
    }
}

impl SuspendableEvents for SuspendableEventsComposite {
    fn suspend_events(&self) {
        self.suspended.set(true);
        for child in self.snapshot() {
            child.suspend_events();
        }
    }

    fn resume_events(&self) {
        self.suspended.set(false);
        for child in self.snapshot() {
            child.resume_events();
        }
    }
}

/// Suspends its target until dropped.
///
/// # Examples
///
/// ```rust
/// use statgraph::{NullSuspendableEvents, SuspendGuard};
/// use std::rc::Rc;
///
/// {
///     let _suspended = SuspendGuard::new(Rc::new(NullSuspendableEvents));
///     // notifications are held back here
/// }
/// // and delivered here
/// ```
#[must_use = "events are resumed as soon as the guard is dropped"]
pub struct SuspendGuard {
    target: Rc<dyn SuspendableEvents>,
}

impl SuspendGuard {
    /// Suspend `target` now and resume it on drop.
    ///
    /// # Arguments
    ///
    /// * `target` - The events to hold back
    pub fn new(target: Rc<dyn SuspendableEvents>) -> Self {
        target.suspend_events();
        Self { target }
    }
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        self.target.resume_events();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        suspended: Cell<usize>,
        resumed: Cell<usize>,
    }

    impl SuspendableEvents for Counter {
        fn suspend_events(&self) {
            self.suspended.set(self.suspended.get() + 1);
        }

        fn resume_events(&self) {
            self.resumed.set(self.resumed.get() + 1);
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Change {
        Added(u8),
        Removed(u8),
        Reset,
    }

    impl ResettableChange for Change {
        fn reset() -> Self {
            Change::Reset
        }
    }

    #[test]
    fn test_suspension_passes_through_when_not_suspended() {
        let suspension = Suspension::new();
        assert_eq!(suspension.intercept(Change::Added(1)), Some(Change::Added(1)));
        assert_eq!(suspension.resume(), None);
    }

    #[test]
    fn test_suspension_keeps_single_change() {
        let suspension = Suspension::new();
        suspension.suspend();
        assert!(suspension.is_suspended());
        assert_eq!(suspension.intercept(Change::Added(1)), None);
        assert_eq!(suspension.intercept(Change::Added(1)), None);
        assert_eq!(suspension.resume(), Some(Change::Added(1)));
        assert_eq!(suspension.resume(), None);
    }

    #[test]
    fn test_suspension_collapses_different_changes() {
        let suspension = Suspension::new();
        suspension.suspend();
        suspension.intercept(Change::Added(1));
        suspension.intercept(Change::Removed(1));
        suspension.intercept(Change::Added(2));
        assert_eq!(suspension.resume(), Some(Change::Reset));
    }

    #[test]
    fn test_composite_forwards_to_children() {
        let composite = SuspendableEventsComposite::new();
        let first = Rc::new(Counter::default());
        let second = Rc::new(Counter::default());
        composite.add(first.clone());

        composite.suspend_events();
        composite.add(second.clone());
        composite.resume_events();

        assert_eq!(first.suspended.get(), 1);
        assert_eq!(first.resumed.get(), 1);
        assert_eq!(second.suspended.get(), 1);
        assert_eq!(second.resumed.get(), 1);
    }

    #[test]
    fn test_removed_child_is_not_resumed() {
        let composite = SuspendableEventsComposite::new();
        let child = Rc::new(Counter::default());
        let handle: Rc<dyn SuspendableEvents> = child.clone();
        composite.add(handle.clone());
        assert!(composite.contains(&handle));

        composite.suspend_events();
        composite.remove(&handle);
        composite.resume_events();

        assert_eq!(child.suspended.get(), 1);
        assert_eq!(child.resumed.get(), 0);
    }

    #[test]
    fn test_guard_resumes_on_drop() {
        let counter = Rc::new(Counter::default());
        {
            let _guard = SuspendGuard::new(counter.clone());
            assert_eq!(counter.suspended.get(), 1);
            assert_eq!(counter.resumed.get(), 0);
        }
        assert_eq!(counter.resumed.get(), 1);
    }
}
