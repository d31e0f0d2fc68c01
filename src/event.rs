//! Event module.
//!
//! Provides `Event<T>`, a single-threaded multicast event whose handlers
//! receive whole batches of arguments, and `EventBuffer`, which decides
//! whether a raised argument is delivered right away or queued until the
//! next flush.
//!
//! ## Buffering
//!
//! ```text
//! pass-through:  buffer(e, a) -> e.invoke([a])
//! batching:      buffer(e, a); buffer(e, b); buffer(f, c)
//!                flush()      -> e.invoke([a, b]); f.invoke([c])
//! ```
//!
//! A flush keeps draining until no sender has pending arguments, so
//! handlers may raise further buffered events while a flush is running.

use indexmap::IndexMap;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

fn next_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Identity of an event, used to group buffered arguments by sender.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    /// Allocate a new, never before used id.
    pub fn next() -> Self {
        Self(next_id())
    }
}

/// Handle returned by `Event::subscribe`, used to unsubscribe again.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Handler<T> = Rc<dyn Fn(&[T])>;

/// A multicast event delivering batches of `T`.
///
/// Handlers may subscribe, unsubscribe or raise events while they run: the
/// handler list is snapshotted before each delivery.
///
/// # Examples
///
/// ```rust
/// use statgraph::Event;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let event = Event::<i32>::new();
/// let total = Rc::new(Cell::new(0));
///
/// let sink = total.clone();
/// let subscription = event.subscribe(move |batch| sink.set(sink.get() + batch.iter().sum::<i32>()));
///
/// event.raise(&[1, 2, 3]);
/// assert_eq!(total.get(), 6);
///
/// event.unsubscribe(subscription);
/// event.raise(&[10]);
/// assert_eq!(total.get(), 6);
/// ```
pub struct Event<T> {
    id: EventId,
    handlers: RefCell<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T> Event<T> {
    /// Create an event without subscribers.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use statgraph::Event;
    ///
    /// let event = Event::<u32>::new();
    /// assert_eq!(event.subscriber_count(), 0);
    /// event.raise(&[1]);
    /// ```
    pub fn new() -> Self {
        Self {
            id: EventId::next(),
            handlers: RefCell::new(Vec::new()),
        }
    }

    /// The key this event is buffered under.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Register a handler. It is called once per delivered batch.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&[T]) + 'static,
    {
        let id = SubscriptionId(next_id());
        self.handlers.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    /// The number of subscribed handlers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Deliver `batch` to every handler subscribed at the time of the call.
    pub fn raise(&self, batch: &[T]) {
        let handlers: Vec<Handler<T>> = self
            .handlers
            .borrow()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(batch);
        }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An event that can be driven by an `EventBuffer`.
pub trait BufferableEvent<T> {
    fn event_id(&self) -> EventId;

    /// Deliver one batch of arguments.
    fn invoke(&self, batch: Vec<T>);
}

impl<T> BufferableEvent<T> for Event<T> {
    fn event_id(&self) -> EventId {
        self.id
    }

    fn invoke(&self, batch: Vec<T>) {
        self.raise(&batch);
    }
}

/// Arguments queued for one sender, with their type erased so batches of
/// different events can share one queue.
trait PendingBatch {
    fn deliver(self: Box<Self>);
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Batch<T> {
    sender: Rc<dyn BufferableEvent<T>>,
    values: Vec<T>,
}

impl<T: 'static> PendingBatch for Batch<T> {
    fn deliver(self: Box<Self>) {
        let Batch { sender, values } = *self;
        sender.invoke(values);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Batching,
    Immediate,
}

/// Routes raised arguments to their events, either right away or batched
/// per sender until `flush`.
///
/// # Examples
///
/// ```rust
/// use statgraph::{Event, EventBuffer};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let buffer = EventBuffer::new();
/// let event = Rc::new(Event::<&str>::new());
/// let batches = Rc::new(RefCell::new(Vec::new()));
///
/// let sink = batches.clone();
/// event.subscribe(move |batch| sink.borrow_mut().push(batch.to_vec()));
///
/// buffer.start_buffering();
/// buffer.buffer(&event, "a");
/// buffer.buffer(&event, "b");
/// assert!(batches.borrow().is_empty());
///
/// buffer.release();
/// assert_eq!(*batches.borrow(), vec![vec!["a", "b"]]);
/// ```
pub struct EventBuffer {
    mode: Mode,
    buffering: Cell<bool>,
    pending: RefCell<IndexMap<EventId, Box<dyn PendingBatch>>>,
}

impl EventBuffer {
    /// A buffer that passes arguments through until `start_buffering`.
    pub fn new() -> Self {
        Self::with_mode(Mode::Batching)
    }

    /// A buffer that always passes arguments through, even while
    /// "buffering". Internal views use it.
    pub fn immediate() -> Self {
        Self::with_mode(Mode::Immediate)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            buffering: Cell::new(false),
            pending: RefCell::new(IndexMap::new()),
        }
    }

    /// Returns `true` while arguments are being queued.
    pub fn is_buffering(&self) -> bool {
        self.buffering.get()
    }

    /// Start queueing arguments instead of delivering them.
    ///
    /// Immediate buffers ignore this.
    pub fn start_buffering(&self) {
        if self.mode == Mode::Batching {
            self.buffering.set(true);
        }
    }

    /// Stop queueing new arguments. Already queued arguments stay queued
    /// until the next `flush`.
    pub fn stop_buffering(&self) {
        self.buffering.set(false);
    }

    /// Deliver `value` to `sender` now, or queue it if buffering.
    pub fn buffer<T, E>(&self, sender: &Rc<E>, value: T)
    where
        T: 'static,
        E: BufferableEvent<T> + 'static,
    {
        if !self.buffering.get() {
            sender.invoke(vec![value]);
            return;
        }

        let sender: Rc<dyn BufferableEvent<T>> = sender.clone();
        let unqueued = {
            let mut pending = self.pending.borrow_mut();
            let batch = pending.entry(sender.event_id()).or_insert_with(|| {
                Box::new(Batch {
                    sender: sender.clone(),
                    values: Vec::new(),
                }) as Box<dyn PendingBatch>
            });
            match batch.as_any_mut().downcast_mut::<Batch<T>>() {
                Some(batch) => {
                    batch.values.push(value);
                    None
                }
                None => Some(value),
            }
        };
        // Ids are unique per event, so the queued batch always has the
        // sender's argument type.
        if let Some(value) = unqueued {
            sender.invoke(vec![value]);
        }
    }

    /// Number of senders with queued arguments.
    pub fn pending_senders(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Deliver all queued arguments, one invocation per sender, until
    /// nothing is queued anymore.
    pub fn flush(&self) {
        let mut round = 0usize;
        loop {
            let batches = std::mem::take(&mut *self.pending.borrow_mut());
            if batches.is_empty() {
                break;
            }
            round += 1;
            trace!(round, senders = batches.len(), "flushing event buffer");
            for (_, batch) in batches {
                batch.deliver();
            }
        }
    }

    /// Flush, then stop buffering.
    pub fn release(&self) {
        self.flush();
        self.stop_buffering();
    }

    /// Drop all queued arguments without delivering them.
    pub fn discard(&self) {
        self.pending.borrow_mut().clear();
    }

    /// Start buffering until the returned guard is dropped.
    ///
    /// Dropping the guard releases the buffer. If the buffer was already
    /// buffering, the guard leaves it to the outer holder. When the guard is
    /// dropped during a panic, queued arguments are discarded instead.
    pub fn hold(self: Rc<Self>) -> BufferingGuard {
        let owns = !self.is_buffering();
        self.start_buffering();
        BufferingGuard { buffer: self, owns }
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps an `EventBuffer` buffering while alive.
#[must_use = "the buffer is released as soon as the guard is dropped"]
pub struct BufferingGuard {
    buffer: Rc<EventBuffer>,
    owns: bool,
}

impl Drop for BufferingGuard {
    fn drop(&mut self) {
        if !self.owns {
            return;
        }
        if std::thread::panicking() {
            self.buffer.discard();
            self.buffer.stop_buffering();
        } else {
            self.buffer.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording<T: Clone + 'static>() -> (Rc<Event<T>>, Rc<RefCell<Vec<Vec<T>>>>) {
        let event = Rc::new(Event::new());
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        event.subscribe(move |batch: &[T]| sink.borrow_mut().push(batch.to_vec()));
        (event, calls)
    }

    #[test]
    fn test_pass_through_delivers_single_element_batches() {
        let buffer = EventBuffer::new();
        let (event, calls) = recording::<u32>();

        buffer.buffer(&event, 1);
        buffer.buffer(&event, 2);

        assert_eq!(*calls.borrow(), vec![vec![1], vec![2]]);
    }

    #[test]
    fn test_batches_are_grouped_per_sender() {
        let buffer = EventBuffer::new();
        let (first, first_calls) = recording::<u32>();
        let (second, second_calls) = recording::<String>();

        buffer.start_buffering();
        buffer.buffer(&first, 1);
        buffer.buffer(&second, "x".to_string());
        buffer.buffer(&first, 2);
        assert_eq!(buffer.pending_senders(), 2);
        buffer.flush();

        assert_eq!(*first_calls.borrow(), vec![vec![1, 2]]);
        assert_eq!(*second_calls.borrow(), vec![vec!["x".to_string()]]);
        assert!(buffer.is_buffering());
    }

    #[test]
    fn test_immediate_buffer_never_queues() {
        let buffer = EventBuffer::immediate();
        let (event, calls) = recording::<u32>();

        buffer.start_buffering();
        buffer.buffer(&event, 7);

        assert!(!buffer.is_buffering());
        assert_eq!(*calls.borrow(), vec![vec![7]]);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let buffer = Rc::new(EventBuffer::new());
        let (event, calls) = recording::<u32>();

        {
            let _guard = buffer.clone().hold();
            buffer.buffer(&event, 1);
            {
                let _nested = buffer.clone().hold();
                buffer.buffer(&event, 2);
            }
            assert!(calls.borrow().is_empty());
        }

        assert_eq!(*calls.borrow(), vec![vec![1, 2]]);
        assert!(!buffer.is_buffering());
    }

    #[test]
    fn test_unsubscribe_unknown_handler() {
        let event = Event::<()>::new();
        let id = event.subscribe(|_| {});
        assert!(event.unsubscribe(id));
        assert!(!event.unsubscribe(id));
        assert_eq!(event.subscriber_count(), 0);
    }
}
