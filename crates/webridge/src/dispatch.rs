use std::collections::HashMap;
use std::sync::Mutex;

/// Identifies one pending dispatch task across the native boundary.
///
/// Tickets are issued by [`DispatchQueue::enqueue`] and consumed exactly once
/// by [`DispatchQueue::drain`]. The raw value exists so the native glue can
/// round-trip the ticket through an opaque pointer-sized argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn to_raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// A drain signal arrived for a ticket with no pending task.
///
/// Tickets are created only by `enqueue` and consumed only once, so this
/// indicates a bug in the native boundary glue (a duplicated or fabricated
/// drain signal), not a recoverable runtime condition.
#[derive(Debug, thiserror::Error)]
#[error("no pending task for dispatch ticket {0}")]
pub struct UnknownTicket(pub u64);

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Table of closures waiting to run on the rendering-surface thread.
///
/// Any thread may enqueue; the surface thread drains one ticket at a time.
/// Each task runs exactly once. There is no ordering guarantee across
/// concurrently enqueued tickets and no cancellation: once enqueued, a task
/// will run when its ticket is next drained.
#[derive(Default)]
pub struct DispatchQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    pending: HashMap<u64, Task>,
    // Monotonically advancing issue cursor. Freed ids are not reissued until
    // the cursor wraps all the way around, so a stale drain signal cannot
    // land on a newer task.
    cursor: u64,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `task` under the first non-pending id at or after the cursor
    /// and return its ticket. Short critical section; the caller signals the
    /// native loop afterwards.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) -> Ticket {
        let mut inner = lock(&self.inner);
        let mut id = inner.cursor;
        while inner.pending.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        inner.cursor = id.wrapping_add(1);
        inner.pending.insert(id, Box::new(task));
        Ticket(id)
    }

    /// Remove the task for `ticket` and execute it on the calling thread.
    ///
    /// Must be called from the rendering-surface thread. The task runs
    /// outside the queue lock.
    pub fn drain(&self, ticket: Ticket) -> Result<(), UnknownTicket> {
        let task = lock(&self.inner)
            .pending
            .remove(&ticket.0)
            .ok_or(UnknownTicket(ticket.0))?;
        task();
        Ok(())
    }

    pub fn pending(&self) -> usize {
        lock(&self.inner).pending.len()
    }
}

fn lock(inner: &Mutex<QueueInner>) -> std::sync::MutexGuard<'_, QueueInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn enqueue_then_drain_runs_task_once() {
        let queue = DispatchQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counted = runs.clone();
        let ticket = queue.enqueue(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        queue.drain(ticket).expect("first drain");
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let err = queue.drain(ticket).expect_err("second drain must fail");
        assert_eq!(err.0, ticket.to_raw());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_ticket_is_an_error() {
        let queue = DispatchQueue::new();
        assert!(queue.drain(Ticket::from_raw(42)).is_err());
    }

    #[test]
    fn pending_ids_are_never_reissued() {
        let queue = DispatchQueue::new();
        let t1 = queue.enqueue(|| {});
        let t2 = queue.enqueue(|| {});
        let t3 = queue.enqueue(|| {});
        assert_ne!(t1, t2);
        assert_ne!(t2, t3);
        assert_ne!(t1, t3);
        assert_eq!(queue.pending(), 3);
    }

    #[test]
    fn freed_ids_are_not_immediately_reused() {
        let queue = DispatchQueue::new();
        let t1 = queue.enqueue(|| {});
        queue.drain(t1).expect("drain");
        let t2 = queue.enqueue(|| {});
        assert_ne!(t1, t2);
    }

    #[test]
    fn concurrent_enqueues_each_drain_exactly_once() {
        let queue = Arc::new(DispatchQueue::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                let runs = runs.clone();
                std::thread::spawn(move || {
                    queue.enqueue(move || {
                        runs.fetch_add(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        let tickets: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("enqueue thread"))
            .collect();

        assert_eq!(queue.pending(), 8);
        for ticket in tickets {
            queue.drain(ticket).expect("each ticket drains once");
        }
        assert_eq!(runs.load(Ordering::SeqCst), 8);
        assert_eq!(queue.pending(), 0);
    }
}
