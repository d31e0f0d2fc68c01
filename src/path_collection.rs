//! Reference-counted path collections.
//!
//! Every modifier node attaches its path to the stat it modifies. Many
//! modifiers share a path, so the collection counts how often each path was
//! added and only reports a path when it first appears and when its last
//! reference goes away.

use crate::collection::{ObservableCollection, SuspendableObservableCollection};
use crate::event::EventBuffer;
use crate::path::PathDefinition;
use crate::suspend::SuspendableEvents;
use crate::view::{CountsSubscribers, SuspendableEventViewProvider};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::warn;

/// Both views of the paths of a stat, plus their suspender.
pub type PathCollectionView = SuspendableEventViewProvider<
    Rc<ObservableCollection<PathDefinition>>,
    Rc<SuspendableObservableCollection<PathDefinition>>,
>;

/// The paths of one stat, each visible while it has at least one reference.
///
/// # Examples
///
/// ```rust
/// use statgraph::path_collection::PathDefinitionCollection;
/// use statgraph::PathDefinition;
///
/// let paths = PathDefinitionCollection::new();
/// let main = PathDefinition::main_path();
///
/// assert!(paths.add(main.clone()));
/// assert!(!paths.add(main.clone()));
/// assert!(!paths.remove(&main));
/// assert!(paths.provider().default_view().contains(&main));
///
/// assert!(paths.remove(&main));
/// assert!(!paths.provider().default_view().contains(&main));
/// ```
pub struct PathDefinitionCollection {
    default_view: Rc<ObservableCollection<PathDefinition>>,
    suspendable_view: Rc<SuspendableObservableCollection<PathDefinition>>,
    counts: RefCell<HashMap<PathDefinition, usize>>,
}

impl PathDefinitionCollection {
    /// An empty collection.
    pub fn new() -> Self {
        let buffer = Rc::new(EventBuffer::immediate());
        Self {
            default_view: Rc::new(ObservableCollection::new(buffer.clone())),
            suspendable_view: Rc::new(SuspendableObservableCollection::new(buffer)),
            counts: RefCell::new(HashMap::new()),
        }
    }

    /// Add a reference to `path`. Returns `true` if the path became visible.
    pub fn add(&self, path: PathDefinition) -> bool {
        let first = {
            let mut counts = self.counts.borrow_mut();
            let count = counts.entry(path.clone()).or_insert(0);
            *count += 1;
            *count == 1
        };
        if first {
            self.default_view.add(path.clone());
            self.suspendable_view.add(path);
        }
        first
    }

    /// Drop a reference to `path`. Returns `true` if the path disappeared.
    ///
    /// Removing a path without references does nothing.
    pub fn remove(&self, path: &PathDefinition) -> bool {
        let last = {
            let mut counts = self.counts.borrow_mut();
            let remaining = match counts.get_mut(path) {
                Some(count) => {
                    *count -= 1;
                    *count
                }
                None => {
                    warn!(%path, "removing a path that has no references");
                    return false;
                }
            };
            if remaining == 0 {
                counts.remove(path);
            }
            remaining == 0
        };
        if last {
            self.default_view.remove(path);
            self.suspendable_view.remove(path);
        }
        last
    }

    /// How many references `path` has.
    pub fn count(&self, path: &PathDefinition) -> usize {
        self.counts.borrow().get(path).copied().unwrap_or(0)
    }

    /// The visible paths, in the order they appeared.
    pub fn paths(&self) -> Vec<PathDefinition> {
        self.default_view.items()
    }

    pub fn is_empty(&self) -> bool {
        self.default_view.is_empty()
    }

    /// Suspends the external view.
    pub fn suspender(&self) -> Rc<dyn SuspendableEvents> {
        self.suspendable_view.clone()
    }

    /// Both views and the suspender in one provider.
    pub fn provider(&self) -> PathCollectionView {
        SuspendableEventViewProvider::new(
            self.default_view.clone(),
            self.suspendable_view.clone(),
            self.suspender(),
        )
    }
}

impl Default for PathDefinitionCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl CountsSubscribers for PathDefinitionCollection {
    fn subscriber_count(&self) -> usize {
        self.default_view.subscriber_count() + self.suspendable_view.subscriber_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionChange;
    use crate::path::{LocalSource, ModifierSource};
    use std::cell::Cell;

    fn local() -> PathDefinition {
        PathDefinition::new(ModifierSource::Local(LocalSource::Given))
    }

    #[test]
    fn test_counts_references() {
        let paths = PathDefinitionCollection::new();
        paths.add(local());
        paths.add(local());
        paths.add(PathDefinition::main_path());

        assert_eq!(paths.count(&local()), 2);
        assert_eq!(paths.paths(), vec![local(), PathDefinition::main_path()]);

        paths.remove(&local());
        assert_eq!(paths.count(&local()), 1);
        assert_eq!(paths.paths().len(), 2);
    }

    #[test]
    fn test_only_visibility_changes_are_reported() {
        let paths = PathDefinitionCollection::new();
        let changes = Rc::new(Cell::new(0));
        let sink = changes.clone();
        paths
            .provider()
            .default_view()
            .subscribe(move |batch| sink.set(sink.get() + batch.len()));

        paths.add(local());
        paths.add(local());
        paths.remove(&local());
        assert_eq!(changes.get(), 1);

        paths.remove(&local());
        assert_eq!(changes.get(), 2);
    }

    #[test]
    fn test_remove_without_references_is_a_no_op() {
        let paths = PathDefinitionCollection::new();
        assert!(!paths.remove(&local()));
        assert!(paths.is_empty());
        assert_eq!(paths.count(&local()), 0);
    }

    #[test]
    fn test_suspended_add_and_remove_collapse_to_reset() {
        let paths = PathDefinitionCollection::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        paths
            .provider()
            .suspendable_view()
            .subscribe(move |batch| sink.borrow_mut().extend(batch.iter().cloned()));

        paths.suspender().suspend_events();
        paths.add(local());
        paths.remove(&local());
        paths.suspender().resume_events();

        assert_eq!(*seen.borrow(), vec![CollectionChange::Reset]);
    }
}
