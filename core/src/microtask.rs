//! A single-threaded microtask queue.
//!
//! Everything in Elementum that must happen "at the end of the current turn"
//! (debounced teardown, coalesced change detection, deferred method results)
//! goes through a [`MicrotaskQueue`]. The queue itself never decides *when* it
//! drains: a host installs a driver (the browser backend forwards to
//! `queueMicrotask`), while headless callers and tests drain it explicitly
//! with [`MicrotaskQueue::run_until_idle`].

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::{Rc, Weak},
};

type Microtask = Box<dyn FnOnce()>;
type Driver = Box<dyn Fn()>;

/// Shared handle to a FIFO queue of microtasks.
///
/// Cloning the handle shares the underlying queue.
#[derive(Clone)]
pub struct MicrotaskQueue(Rc<QueueInner>);

/// Weak counterpart of [`MicrotaskQueue`], used by drivers to avoid reference cycles.
#[derive(Clone)]
pub struct WeakMicrotaskQueue(Weak<QueueInner>);

struct QueueInner {
    tasks: RefCell<VecDeque<Microtask>>,
    driver: RefCell<Option<Driver>>,
    draining: Cell<bool>,
    drain_requested: Cell<bool>,
}

impl fmt::Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("pending", &self.len())
            .field("draining", &self.0.draining.get())
            .field("driven", &self.0.driver.borrow().is_some())
            .finish()
    }
}

impl fmt::Debug for WeakMicrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakMicrotaskQueue")
    }
}

impl Default for MicrotaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrotaskQueue {
    /// Creates an undriven queue. Tasks only run when [`run_until_idle`](Self::run_until_idle) is called.
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(QueueInner {
            tasks: RefCell::new(VecDeque::new()),
            driver: RefCell::new(None),
            draining: Cell::new(false),
            drain_requested: Cell::new(false),
        }))
    }

    /// Installs the host driver.
    ///
    /// The driver is invoked at most once per drain cycle, the first time a task
    /// lands in an idle queue. It must arrange for [`run_until_idle`](Self::run_until_idle)
    /// to be called at the host's next microtask checkpoint.
    pub fn set_driver(&self, driver: impl Fn() + 'static) {
        *self.0.driver.borrow_mut() = Some(Box::new(driver));
        if !self.is_empty() {
            self.request_drain();
        }
    }

    /// Returns a weak handle to this queue.
    #[must_use]
    pub fn downgrade(&self) -> WeakMicrotaskQueue {
        WeakMicrotaskQueue(Rc::downgrade(&self.0))
    }

    /// Appends a task to the end of the queue.
    pub fn queue(&self, task: impl FnOnce() + 'static) {
        self.0.tasks.borrow_mut().push_back(Box::new(task));
        self.request_drain();
    }

    /// Runs queued tasks, including tasks queued while draining, until the queue is empty.
    ///
    /// Returns the number of tasks executed. Re-entrant calls from inside a task
    /// return `0` immediately; the outer drain picks up whatever they would have run.
    pub fn run_until_idle(&self) -> usize {
        if self.0.draining.replace(true) {
            return 0;
        }
        self.0.drain_requested.set(false);
        let _guard = DrainGuard(&self.0);

        let mut ran = 0;
        loop {
            let next = self.0.tasks.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(ran, "microtask queue drained");
        }
        ran
    }

    /// Number of tasks waiting to run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.tasks.borrow().len()
    }

    /// Returns `true` when no task is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.tasks.borrow().is_empty()
    }

    fn request_drain(&self) {
        if self.0.draining.get() || self.0.drain_requested.get() {
            return;
        }
        if let Some(driver) = self.0.driver.borrow().as_ref() {
            self.0.drain_requested.set(true);
            driver();
        }
    }
}

impl WeakMicrotaskQueue {
    /// Attempts to recover a strong handle.
    #[must_use]
    pub fn upgrade(&self) -> Option<MicrotaskQueue> {
        self.0.upgrade().map(MicrotaskQueue)
    }
}

struct DrainGuard<'a>(&'a QueueInner);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.draining.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_tasks_in_fifo_order() {
        let queue = MicrotaskQueue::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let seen = Rc::clone(&seen);
            queue.queue(move || seen.borrow_mut().push(i));
        }
        assert!(seen.borrow().is_empty());
        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(&*seen.borrow(), &[0, 1, 2]);
    }

    #[test]
    fn drains_tasks_queued_while_draining() {
        let queue = MicrotaskQueue::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let inner_queue = queue.clone();
            let seen = Rc::clone(&seen);
            queue.queue(move || {
                seen.borrow_mut().push("outer");
                let seen = Rc::clone(&seen);
                inner_queue.queue(move || seen.borrow_mut().push("inner"));
            });
        }
        assert_eq!(queue.run_until_idle(), 2);
        assert_eq!(&*seen.borrow(), &["outer", "inner"]);
    }

    #[test]
    fn driver_is_requested_once_per_cycle() {
        let queue = MicrotaskQueue::new();
        let requests = Rc::new(Cell::new(0));
        {
            let requests = Rc::clone(&requests);
            queue.set_driver(move || requests.set(requests.get() + 1));
        }
        queue.queue(|| {});
        queue.queue(|| {});
        assert_eq!(requests.get(), 1);

        queue.run_until_idle();
        queue.queue(|| {});
        assert_eq!(requests.get(), 2);
    }

    #[test]
    fn nested_drain_is_a_no_op() {
        let queue = MicrotaskQueue::new();
        let nested = Rc::new(Cell::new(usize::MAX));
        {
            let inner_queue = queue.clone();
            let nested = Rc::clone(&nested);
            queue.queue(move || nested.set(inner_queue.run_until_idle()));
        }
        queue.run_until_idle();
        assert_eq!(nested.get(), 0);
    }
}
