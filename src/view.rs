//! Dual-view providers.
//!
//! Most observable parts of the graph are exposed twice. The *default* view
//! notifies immediately and is what the graph uses internally to keep caches
//! correct. The other view is for code outside the graph: it is either
//! *buffered* (batched until the calculator flushes) or *suspendable* (held
//! back while an update runs).

use crate::suspend::SuspendableEvents;
use std::rc::Rc;

/// Reports how many handlers are currently attached.
pub trait CountsSubscribers {
    fn subscriber_count(&self) -> usize;
}

impl<T: CountsSubscribers + ?Sized> CountsSubscribers for Rc<T> {
    fn subscriber_count(&self) -> usize {
        (**self).subscriber_count()
    }
}

/// An immediate view paired with a buffered view of the same data.
#[derive(Debug, Clone)]
pub struct EventViewProvider<V> {
    default_view: V,
    buffered_view: V,
}

impl<V> EventViewProvider<V> {
    /// Pair two views of the same data.
    ///
    /// # Arguments
    ///
    /// * `default_view` - Notifies immediately
    /// * `buffered_view` - Notifies when the event buffer is flushed
    pub fn new(default_view: V, buffered_view: V) -> Self {
        Self {
            default_view,
            buffered_view,
        }
    }

    /// The immediate view.
    pub fn default_view(&self) -> &V {
        &self.default_view
    }

    /// The buffered view.
    pub fn buffered_view(&self) -> &V {
        &self.buffered_view
    }
}

impl<V: CountsSubscribers> CountsSubscribers for EventViewProvider<V> {
    fn subscriber_count(&self) -> usize {
        self.default_view.subscriber_count() + self.buffered_view.subscriber_count()
    }
}

/// An immediate view paired with a suspendable view, plus the handle that
/// suspends the latter.
///
/// For a calculation node both views are `NodeHandle`s. For collections the
/// suspendable view has its own type.
pub struct SuspendableEventViewProvider<D, S = D> {
    default_view: D,
    suspendable_view: S,
    suspender: Rc<dyn SuspendableEvents>,
}

impl<D, S> SuspendableEventViewProvider<D, S> {
    /// Pair two views of the same data with the suspender of the second.
    ///
    /// # Arguments
    ///
    /// * `default_view` - Notifies immediately
    /// * `suspendable_view` - Holds notifications back while suspended
    /// * `suspender` - Suspends and resumes `suspendable_view`
    pub fn new(default_view: D, suspendable_view: S, suspender: Rc<dyn SuspendableEvents>) -> Self {
        Self {
            default_view,
            suspendable_view,
            suspender,
        }
    }

    /// The immediate view.
    pub fn default_view(&self) -> &D {
        &self.default_view
    }

    /// The view that can be suspended.
    pub fn suspendable_view(&self) -> &S {
        &self.suspendable_view
    }

    /// Suspends and resumes the suspendable view.
    pub fn suspender(&self) -> &Rc<dyn SuspendableEvents> {
        &self.suspender
    }
}

impl<D: Clone, S: Clone> Clone for SuspendableEventViewProvider<D, S> {
    fn clone(&self) -> Self {
        Self {
            default_view: self.default_view.clone(),
            suspendable_view: self.suspendable_view.clone(),
            suspender: self.suspender.clone(),
        }
    }
}

impl<D: CountsSubscribers, S: CountsSubscribers> CountsSubscribers
    for SuspendableEventViewProvider<D, S>
{
    fn subscriber_count(&self) -> usize {
        self.default_view.subscriber_count() + self.suspendable_view.subscriber_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suspend::NullSuspendableEvents;
    use std::cell::Cell;

    struct Fixed(Cell<usize>);

    impl CountsSubscribers for Fixed {
        fn subscriber_count(&self) -> usize {
            self.0.get()
        }
    }

    #[test]
    fn test_subscriber_count_sums_both_views() {
        let provider = EventViewProvider::new(Rc::new(Fixed(Cell::new(2))), Rc::new(Fixed(Cell::new(3))));
        assert_eq!(provider.subscriber_count(), 5);

        let suspendable = SuspendableEventViewProvider::new(
            Fixed(Cell::new(1)),
            Fixed(Cell::new(0)),
            Rc::new(NullSuspendableEvents),
        );
        assert_eq!(suspendable.subscriber_count(), 1);
        suspendable.suspendable_view().0.set(4);
        assert_eq!(suspendable.subscriber_count(), 5);
    }
}
