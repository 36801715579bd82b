//! Effect and change-notification scheduling.
//!
//! Recomputation is driven purely by explicit notification. Two cooperating
//! pieces live behind a single [`Scheduler`] handle:
//!
//! - the **effect queue** holds every live [`EffectRef`] and a counter of how
//!   many of them are dirty. [`Scheduler::flush`] keeps draining the queue until a
//!   pass finds nothing left to run, so effects that dirty other effects
//!   converge within one flush.
//! - the **notification scheduler** coalesces any number of
//!   [`Scheduler::notify`] calls made within one microtask turn into a single
//!   deferred tick, which flushes the effect queue exactly once.
//!
//! Component views are effects too: a view that becomes dirty is re-rendered by
//! the next tick, no matter how many inputs changed before it.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use nami::Signal;

use crate::{injector::Service, microtask::MicrotaskQueue};

/// Why a change-detection tick was requested. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NotificationSource {
    /// An effect became dirty.
    Effect,
    /// A custom element wrote an input or signal outside of a render pass.
    CustomElement,
    /// A component asked for its view to be checked.
    MarkForCheck,
    /// A view was attached to an application.
    ViewAttached,
}

/// Shared handle to the platform scheduler pair.
#[derive(Clone)]
pub struct Scheduler(Rc<SchedulerInner>);

struct SchedulerInner {
    microtasks: MicrotaskQueue,
    queue: RefCell<Vec<EffectRef>>,
    dirty_effects: Cell<usize>,
    tick_scheduled: Cell<bool>,
    running_tick: Cell<bool>,
    ticks: Cell<u64>,
    next_id: Cell<u64>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("effects", &self.0.queue.borrow().len())
            .field("dirty_effects", &self.0.dirty_effects.get())
            .field("tick_scheduled", &self.0.tick_scheduled.get())
            .field("ticks", &self.0.ticks.get())
            .finish_non_exhaustive()
    }
}

impl Service for Scheduler {}

impl Scheduler {
    /// Creates a scheduler that defers its ticks onto `microtasks`.
    #[must_use]
    pub fn new(microtasks: MicrotaskQueue) -> Self {
        Self(Rc::new(SchedulerInner {
            microtasks,
            queue: RefCell::new(Vec::new()),
            dirty_effects: Cell::new(0),
            tick_scheduled: Cell::new(false),
            running_tick: Cell::new(false),
            ticks: Cell::new(0),
            next_id: Cell::new(0),
        }))
    }

    /// The microtask queue ticks are deferred onto.
    #[must_use]
    pub fn microtasks(&self) -> &MicrotaskQueue {
        &self.0.microtasks
    }

    /// Creates an effect that runs `run` on the next tick and again after every
    /// [`EffectRef::mark_dirty`].
    ///
    /// The effect is never run synchronously from here.
    pub fn effect(&self, run: impl Fn() + 'static) -> EffectRef {
        let effect = self.register(Rc::new(run), true);
        self.notify(NotificationSource::Effect);
        effect
    }

    /// Creates a clean effect that only runs once it is marked dirty, or when
    /// [`EffectRef::run`] is called directly. Used for component views, whose
    /// first render happens synchronously on creation.
    pub fn view_effect(&self, run: impl Fn() + 'static) -> EffectRef {
        self.register(Rc::new(run), false)
    }

    /// Creates an effect that re-runs with the latest value of `source` whenever it changes.
    ///
    /// The subscription lives as long as the returned [`WatchedEffect`].
    pub fn watch_effect<S>(&self, source: S, run: impl Fn(S::Output) + 'static) -> WatchedEffect
    where
        S: Signal + Clone + 'static,
        S::Guard: 'static,
    {
        let reader = source.clone();
        let effect = self.effect(move || run(reader.get()));
        let weak = effect.downgrade();
        let guard = source.watch(move |_context| {
            if let Some(effect) = weak.upgrade() {
                effect.mark_dirty();
            }
        });
        WatchedEffect {
            effect,
            _guard: Box::new(guard),
        }
    }

    /// Requests a tick. Calls made before the tick runs are coalesced; a call made
    /// while a tick is running schedules a new, separate tick.
    pub fn notify(&self, source: NotificationSource) {
        if self.0.tick_scheduled.replace(true) {
            return;
        }
        tracing::trace!(?source, "change detection scheduled");
        let weak = Rc::downgrade(&self.0);
        self.0.microtasks.queue(move || {
            if let Some(inner) = weak.upgrade() {
                Self(inner).tick();
            }
        });
    }

    /// Returns `true` while a tick is waiting on the microtask queue.
    #[must_use]
    pub fn is_tick_scheduled(&self) -> bool {
        self.0.tick_scheduled.get()
    }

    /// Returns `true` while a tick is flushing effects.
    #[must_use]
    pub fn is_running_tick(&self) -> bool {
        self.0.running_tick.get()
    }

    /// Number of ticks executed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.0.ticks.get()
    }

    /// Number of dirty effects the queue currently accounts for.
    #[must_use]
    pub fn dirty_effects(&self) -> usize {
        self.0.dirty_effects.get()
    }

    /// Runs dirty effects until a pass makes no progress.
    ///
    /// If the dirty counter claims work but no effect in the queue is actually
    /// dirty (an effect was run directly in between), the counter is reset.
    pub fn flush(&self) {
        while self.0.dirty_effects.get() > 0 {
            if !self.flush_queue() {
                self.0.dirty_effects.set(0);
            }
        }
    }

    fn tick(&self) {
        self.0.tick_scheduled.set(false);
        self.0.running_tick.set(true);
        self.flush();
        self.0.running_tick.set(false);
        self.0.ticks.set(self.0.ticks.get() + 1);
    }

    fn flush_queue(&self) -> bool {
        let snapshot = self.0.queue.borrow().clone();
        let mut ran = false;
        for effect in snapshot {
            if effect.is_destroyed() || !effect.is_dirty() {
                continue;
            }
            self.0
                .dirty_effects
                .set(self.0.dirty_effects.get().saturating_sub(1));
            ran = true;
            effect.run();
        }
        ran
    }

    fn register(&self, run: Rc<dyn Fn()>, dirty: bool) -> EffectRef {
        let id = self.0.next_id.get();
        self.0.next_id.set(id + 1);
        let effect = EffectRef(Rc::new(EffectNode {
            id,
            dirty: Cell::new(dirty),
            destroyed: Cell::new(false),
            run,
            scheduler: Rc::downgrade(&self.0),
        }));
        self.0.queue.borrow_mut().push(effect.clone());
        self.schedule(&effect);
        effect
    }

    fn schedule(&self, effect: &EffectRef) {
        if !effect.is_dirty() {
            return;
        }
        self.0.dirty_effects.set(self.0.dirty_effects.get() + 1);
    }

    fn remove(&self, effect: &EffectRef) {
        self.0.queue.borrow_mut().retain(|queued| queued.id() != effect.id());
        if effect.is_dirty() {
            self.0
                .dirty_effects
                .set(self.0.dirty_effects.get().saturating_sub(1));
        }
    }
}

/// A schedulable computation owned by a [`Scheduler`].
#[derive(Clone)]
pub struct EffectRef(Rc<EffectNode>);

/// Weak counterpart of [`EffectRef`].
#[derive(Clone)]
pub struct WeakEffectRef(Weak<EffectNode>);

struct EffectNode {
    id: u64,
    dirty: Cell<bool>,
    destroyed: Cell<bool>,
    run: Rc<dyn Fn()>,
    scheduler: Weak<SchedulerInner>,
}

impl fmt::Debug for EffectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRef")
            .field("id", &self.0.id)
            .field("dirty", &self.0.dirty.get())
            .field("destroyed", &self.0.destroyed.get())
            .finish()
    }
}

impl fmt::Debug for WeakEffectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakEffectRef")
    }
}

impl EffectRef {
    /// Stable identifier of this effect within its scheduler.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Returns `true` if the effect is waiting to run.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    /// Returns `true` once the effect has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Marks the effect dirty and requests a tick.
    ///
    /// Marking an already dirty effect does nothing, so any number of writes
    /// within one turn produce a single run.
    pub fn mark_dirty(&self) {
        self.mark_dirty_from(NotificationSource::Effect);
    }

    /// Same as [`mark_dirty`](Self::mark_dirty), recording why.
    pub fn mark_dirty_from(&self, source: NotificationSource) {
        if self.is_destroyed() || self.0.dirty.replace(true) {
            return;
        }
        if let Some(inner) = self.0.scheduler.upgrade() {
            let scheduler = Scheduler(inner);
            scheduler.schedule(self);
            scheduler.notify(source);
        }
    }

    /// Runs the effect now, clearing its dirty flag first.
    pub fn run(&self) {
        if self.is_destroyed() {
            return;
        }
        self.0.dirty.set(false);
        let run = Rc::clone(&self.0.run);
        run();
    }

    /// Removes the effect from its scheduler. Idempotent.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        if let Some(inner) = self.0.scheduler.upgrade() {
            Scheduler(inner).remove(self);
        }
        self.0.dirty.set(false);
    }

    /// Returns a weak handle to this effect.
    #[must_use]
    pub fn downgrade(&self) -> WeakEffectRef {
        WeakEffectRef(Rc::downgrade(&self.0))
    }
}

impl WeakEffectRef {
    /// Attempts to recover a strong handle.
    #[must_use]
    pub fn upgrade(&self) -> Option<EffectRef> {
        self.0.upgrade().map(EffectRef)
    }
}

/// An effect bound to a reactive source. Dropping it unsubscribes and destroys the effect.
pub struct WatchedEffect {
    effect: EffectRef,
    _guard: Box<dyn Any>,
}

impl fmt::Debug for WatchedEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchedEffect")
            .field("effect", &self.effect)
            .finish_non_exhaustive()
    }
}

impl WatchedEffect {
    /// The underlying effect.
    #[must_use]
    pub const fn effect(&self) -> &EffectRef {
        &self.effect
    }
}

impl Drop for WatchedEffect {
    fn drop(&mut self) {
        self.effect.destroy();
    }
}
