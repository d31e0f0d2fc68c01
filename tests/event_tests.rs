use statgraph::event::BufferableEvent;
use statgraph::*;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

fn recording(event: &Event<i32>) -> Rc<RefCell<Vec<Vec<i32>>>> {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = calls.clone();
    event.subscribe(move |batch: &[i32]| sink.borrow_mut().push(batch.to_vec()));
    calls
}

// ============================================================================
// Pass-through
// ============================================================================

#[test]
fn test_pass_through_delivers_each_value_synchronously() {
    let buffer = EventBuffer::new();
    let event = Rc::new(Event::new());
    let calls = recording(&event);

    buffer.buffer(&event, 1);
    assert_eq!(*calls.borrow(), vec![vec![1]]);

    buffer.buffer(&event, 2);
    assert_eq!(*calls.borrow(), vec![vec![1], vec![2]]);
}

#[test]
fn test_immediate_buffer_never_batches() {
    let buffer = EventBuffer::immediate();
    let event = Rc::new(Event::new());
    let calls = recording(&event);

    buffer.start_buffering();
    assert!(!buffer.is_buffering());
    buffer.buffer(&event, 1);
    buffer.buffer(&event, 2);

    assert_eq!(*calls.borrow(), vec![vec![1], vec![2]]);
}

// ============================================================================
// Batching
// ============================================================================

#[test]
fn test_batching_delivers_one_invocation_per_sender() {
    let buffer = EventBuffer::new();
    let first = Rc::new(Event::new());
    let second = Rc::new(Event::new());
    let first_calls = recording(&first);
    let second_calls = recording(&second);

    buffer.start_buffering();
    for value in 0..5 {
        buffer.buffer(&first, value);
    }
    buffer.buffer(&second, 10);
    assert!(first_calls.borrow().is_empty());
    assert_eq!(buffer.pending_senders(), 2);

    buffer.release();
    assert_eq!(*first_calls.borrow(), vec![vec![0, 1, 2, 3, 4]]);
    assert_eq!(*second_calls.borrow(), vec![vec![10]]);
    assert!(!buffer.is_buffering());
}

#[test]
fn test_flush_keeps_buffering() {
    let buffer = EventBuffer::new();
    let event = Rc::new(Event::new());
    let calls = recording(&event);

    buffer.start_buffering();
    buffer.buffer(&event, 1);
    buffer.flush();
    buffer.buffer(&event, 2);

    assert_eq!(*calls.borrow(), vec![vec![1]]);
    assert!(buffer.is_buffering());
}

#[test]
fn test_discard_drops_pending_values() {
    let buffer = EventBuffer::new();
    let event = Rc::new(Event::new());
    let calls = recording(&event);

    buffer.start_buffering();
    buffer.buffer(&event, 1);
    buffer.discard();
    buffer.release();

    assert!(calls.borrow().is_empty());
}

// ============================================================================
// Recursive flush
// ============================================================================

#[test]
fn test_values_raised_during_flush_are_drained() {
    let buffer = Rc::new(EventBuffer::new());
    let upstream = Rc::new(Event::new());
    let downstream = Rc::new(Event::new());
    let calls = recording(&downstream);

    let relay_buffer = buffer.clone();
    let relay_target = downstream.clone();
    upstream.subscribe(move |batch: &[i32]| {
        for value in batch {
            relay_buffer.buffer(&relay_target, value * 10);
        }
    });

    buffer.start_buffering();
    buffer.buffer(&upstream, 1);
    buffer.buffer(&upstream, 2);
    buffer.release();

    assert_eq!(*calls.borrow(), vec![vec![10, 20]]);
    assert_eq!(buffer.pending_senders(), 0);
}

#[test]
fn test_self_feeding_sender_is_drained_until_quiet() {
    let buffer = Rc::new(EventBuffer::new());
    let event = Rc::new(Event::new());
    let delivered = Rc::new(RefCell::new(Vec::new()));

    let sink = delivered.clone();
    let feedback_buffer = buffer.clone();
    let weak_event = Rc::downgrade(&event);
    event.subscribe(move |batch: &[i32]| {
        sink.borrow_mut().extend_from_slice(batch);
        if let Some(event) = weak_event.upgrade() {
            for value in batch.iter().filter(|value| **value < 3) {
                feedback_buffer.buffer(&event, value + 1);
            }
        }
    });

    buffer.start_buffering();
    buffer.buffer(&event, 0);
    buffer.release();

    assert_eq!(*delivered.borrow(), vec![0, 1, 2, 3]);
}

// ============================================================================
// Guards
// ============================================================================

#[test]
fn test_nested_guards_release_once() {
    let buffer = Rc::new(EventBuffer::new());
    let event = Rc::new(Event::new());
    let calls = recording(&event);

    {
        let _outer = buffer.clone().hold();
        {
            let _inner = buffer.clone().hold();
            buffer.buffer(&event, 1);
        }
        assert!(calls.borrow().is_empty());
        buffer.buffer(&event, 2);
    }

    assert_eq!(*calls.borrow(), vec![vec![1, 2]]);
}

#[test]
fn test_guard_discards_pending_values_on_panic() {
    let buffer = Rc::new(EventBuffer::new());
    let event = Rc::new(Event::new());
    let calls = recording(&event);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _buffering = buffer.clone().hold();
        buffer.buffer(&event, 1);
        panic!("update aborted");
    }));

    assert!(result.is_err());
    assert!(calls.borrow().is_empty());
    assert!(!buffer.is_buffering());
    assert_eq!(buffer.pending_senders(), 0);

    buffer.buffer(&event, 2);
    assert_eq!(*calls.borrow(), vec![vec![2]]);
}

#[test]
fn test_suspend_guard_resumes_during_panic() {
    let composite = Rc::new(SuspendableEventsComposite::new());
    let collection = Rc::new(SuspendableObservableCollection::<&str>::new(Rc::new(
        EventBuffer::immediate(),
    )));
    composite.add(collection.clone());
    let changes = Rc::new(Cell::new(0));
    let sink = changes.clone();
    collection.subscribe(move |batch| sink.set(sink.get() + batch.len()));

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _suspended = SuspendGuard::new(composite.clone());
        collection.add("ice");
        panic!("update aborted");
    }));

    assert!(result.is_err());
    assert_eq!(changes.get(), 1);
    collection.add("lightning");
    assert_eq!(changes.get(), 2);
}

#[test]
fn test_suspend_guard_resumes_on_drop() {
    let composite = Rc::new(SuspendableEventsComposite::new());
    let collection = Rc::new(SuspendableObservableCollection::<&str>::new(Rc::new(
        EventBuffer::immediate(),
    )));
    composite.add(collection.clone());
    let changes = Rc::new(Cell::new(0));
    let sink = changes.clone();
    collection.subscribe(move |batch| sink.set(sink.get() + batch.len()));

    {
        let _suspended = SuspendGuard::new(composite.clone());
        collection.add("fire");
        assert_eq!(changes.get(), 0);
    }

    assert_eq!(changes.get(), 1);
}

#[test]
fn test_unsubscribed_handlers_are_not_called() {
    let event = Event::new();
    let calls = Rc::new(Cell::new(0));
    let sink = calls.clone();
    let id = event.subscribe(move |_: &[()]| sink.set(sink.get() + 1));

    event.invoke(vec![()]);
    assert!(event.unsubscribe(id));
    assert!(!event.unsubscribe(id));
    event.invoke(vec![()]);

    assert_eq!(calls.get(), 1);
    assert_eq!(event.subscriber_count(), 0);
}
