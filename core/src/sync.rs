//! Synchronous bootstrap.
//!
//! Application construction goes through asynchronous initializers, yet a custom
//! element constructor has to hand back a working strategy before it returns.
//! This module provides the two pieces that make that possible without touching
//! any runtime-wide state:
//!
//! - [`SyncPromise`], a promise-like value whose continuations run eagerly at the
//!   moment it settles instead of on a later turn. It can adopt other
//!   `SyncPromise`s and genuine futures; a future that completes on its first poll
//!   settles immediately, one that does not is only driven when the promise is
//!   awaited.
//! - [`run_sync`], which polls a future exactly once and fails with
//!   [`WouldSuspend`] if it cannot complete without yielding.

use std::{
    cell::RefCell,
    fmt,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll, Waker},
};

use futures::{FutureExt, future::LocalBoxFuture};

/// The future passed to [`run_sync`] needed to suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("initializer could not complete synchronously")]
pub struct WouldSuspend;

/// Polls `future` once, returning its output if it completed.
///
/// # Errors
///
/// Returns [`WouldSuspend`] if the future is still pending after its first poll,
/// e.g. because it awaits a timer or a network resource.
pub fn run_sync<F: Future>(future: F) -> Result<F::Output, WouldSuspend> {
    future.now_or_never().ok_or(WouldSuspend)
}

/// The reason a [`SyncPromise`] was rejected. Cheap to clone.
#[derive(Clone)]
pub struct Rejection(Rc<anyhow::Error>);

impl Rejection {
    /// Wraps an error.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self(Rc::new(error.into()))
    }

    /// Builds a rejection from a plain message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(Rc::new(anyhow::Error::msg(message)))
    }

    /// The underlying error.
    #[must_use]
    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for Rejection {
    fn from(error: anyhow::Error) -> Self {
        Self(Rc::new(error))
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

/// Observable state of a [`SyncPromise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Fulfilled,
    /// Settled with a [`Rejection`].
    Rejected,
}

type Settled<T> = Result<T, Rejection>;
type Reaction<T> = Box<dyn FnOnce(Settled<T>)>;

enum Slot<T> {
    Pending {
        reactions: Vec<Reaction<T>>,
        driver: Option<LocalBoxFuture<'static, ()>>,
        wakers: Vec<Waker>,
    },
    Settled(Settled<T>),
}

/// A promise whose continuations run synchronously on settlement.
///
/// Cloning shares the promise.
pub struct SyncPromise<T>(Rc<RefCell<Slot<T>>>);

impl<T> Clone for SyncPromise<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> fmt::Debug for SyncPromise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.0.borrow() {
            Slot::Pending { .. } => PromiseState::Pending,
            Slot::Settled(Ok(_)) => PromiseState::Fulfilled,
            Slot::Settled(Err(_)) => PromiseState::Rejected,
        };
        f.debug_tuple("SyncPromise").field(&state).finish()
    }
}

/// Settles the [`SyncPromise`] it was created for. The first settlement wins.
pub struct Resolver<T>(SyncPromise<T>);

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolver").field(&self.0).finish()
    }
}

impl<T: Clone + 'static> Resolver<T> {
    /// Fulfils the promise.
    pub fn resolve(&self, value: T) {
        self.0.settle(Ok(value));
    }

    /// Rejects the promise.
    pub fn reject(&self, reason: impl Into<Rejection>) {
        self.0.settle(Err(reason.into()));
    }

    /// Makes the promise follow `other`.
    pub fn adopt(&self, other: &SyncPromise<T>) {
        self.0.adopt(other);
    }

    /// Makes the promise follow a future.
    pub fn adopt_future(&self, future: impl Future<Output = Result<T, Rejection>> + 'static) {
        self.0.adopt(&SyncPromise::from_future(future));
    }
}

impl<T: Clone + 'static> SyncPromise<T> {
    /// Creates a promise and runs `executor` immediately. An `Err` from the
    /// executor rejects the promise unless it was already settled.
    pub fn new(executor: impl FnOnce(&Resolver<T>) -> anyhow::Result<()>) -> Self {
        let promise = Self::pending();
        let resolver = Resolver(promise.clone());
        if let Err(error) = executor(&resolver) {
            resolver.reject(error);
        }
        promise
    }

    /// A promise already fulfilled with `value`.
    #[must_use]
    pub fn resolve(value: T) -> Self {
        Self(Rc::new(RefCell::new(Slot::Settled(Ok(value)))))
    }

    /// A promise already rejected with `reason`.
    pub fn reject(reason: impl Into<Rejection>) -> Self {
        Self(Rc::new(RefCell::new(Slot::Settled(Err(reason.into())))))
    }

    /// Wraps a future. The future is polled once right away; if it completes, the
    /// promise is settled before this returns. Otherwise it is polled again only
    /// when the promise (or a promise derived from it) is awaited.
    pub fn from_future(future: impl Future<Output = Result<T, Rejection>> + 'static) -> Self {
        let promise = Self::pending();
        let weak = Rc::downgrade(&promise.0);
        let driver = async move {
            let result = future.await;
            if let Some(slot) = Weak::upgrade(&weak) {
                Self(slot).settle(result);
            }
        }
        .boxed_local();
        promise.install_driver(driver);
        promise.poll_driver_once();
        promise
    }

    /// Resolves once every promise in `items` is fulfilled, or rejects with the first rejection.
    #[must_use]
    pub fn all(items: Vec<Self>) -> SyncPromise<Vec<T>> {
        if items.is_empty() {
            return SyncPromise::resolve(Vec::new());
        }
        let aggregate = SyncPromise::<Vec<T>>::pending();
        let values: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; items.len()]));

        for (index, item) in items.iter().enumerate() {
            let aggregate = aggregate.clone();
            let values = Rc::clone(&values);
            item.react(move |result| match result {
                Ok(value) => {
                    let complete = {
                        let mut values = values.borrow_mut();
                        values[index] = Some(value);
                        values.iter().all(Option::is_some)
                    };
                    if complete {
                        let collected = values.borrow_mut().drain(..).flatten().collect();
                        aggregate.settle(Ok(collected));
                    }
                }
                Err(reason) => aggregate.settle(Err(reason)),
            });
        }

        let pending: Vec<_> = items.into_iter().filter(|item| item.state() == PromiseState::Pending).collect();
        if !pending.is_empty() {
            aggregate.install_driver(
                async move {
                    for item in pending {
                        let _ = item.await;
                    }
                }
                .boxed_local(),
            );
        }
        aggregate
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PromiseState {
        match &*self.0.borrow() {
            Slot::Pending { .. } => PromiseState::Pending,
            Slot::Settled(Ok(_)) => PromiseState::Fulfilled,
            Slot::Settled(Err(_)) => PromiseState::Rejected,
        }
    }

    /// The settled result, if any.
    #[must_use]
    pub fn settled(&self) -> Option<Result<T, Rejection>> {
        match &*self.0.borrow() {
            Slot::Pending { .. } => None,
            Slot::Settled(result) => Some(result.clone()),
        }
    }

    /// Chains a fallible continuation on fulfilment. Rejections pass through.
    pub fn then<U: Clone + 'static>(
        self,
        on_fulfilled: impl FnOnce(T) -> anyhow::Result<U> + 'static,
    ) -> SyncPromise<U> {
        let next = self.derived::<U>();
        let target = next.clone();
        self.react(move |result| match result {
            Ok(value) => target.settle(on_fulfilled(value).map_err(Rejection::from)),
            Err(reason) => target.settle(Err(reason)),
        });
        next
    }

    /// Chains a continuation that itself returns a promise, which the result adopts.
    pub fn and_then<U: Clone + 'static>(
        self,
        on_fulfilled: impl FnOnce(T) -> SyncPromise<U> + 'static,
    ) -> SyncPromise<U> {
        let next = self.derived::<U>();
        let target = next.clone();
        self.react(move |result| match result {
            Ok(value) => target.adopt(&on_fulfilled(value)),
            Err(reason) => target.settle(Err(reason)),
        });
        next
    }

    /// Recovers from a rejection. Fulfilment passes through.
    pub fn catch(
        self,
        on_rejected: impl FnOnce(Rejection) -> anyhow::Result<T> + 'static,
    ) -> Self {
        let next = self.derived::<T>();
        let target = next.clone();
        self.react(move |result| match result {
            Ok(value) => target.settle(Ok(value)),
            Err(reason) => target.settle(on_rejected(reason).map_err(Rejection::from)),
        });
        next
    }

    /// Runs `on_settled` whichever way the promise settles, passing the result through.
    pub fn finally(self, on_settled: impl FnOnce() + 'static) -> Self {
        let next = self.derived::<T>();
        let target = next.clone();
        self.react(move |result| {
            on_settled();
            target.settle(result);
        });
        next
    }

    fn pending() -> Self {
        Self(Rc::new(RefCell::new(Slot::Pending {
            reactions: Vec::new(),
            driver: None,
            wakers: Vec::new(),
        })))
    }

    /// A pending promise that drives `self` when awaited.
    fn derived<U: Clone + 'static>(&self) -> SyncPromise<U> {
        let next = SyncPromise::<U>::pending();
        if self.state() == PromiseState::Pending {
            let source = self.clone();
            next.install_driver(
                async move {
                    let _ = source.await;
                }
                .boxed_local(),
            );
        }
        next
    }

    fn adopt(&self, other: &Self) {
        if Rc::ptr_eq(&self.0, &other.0) {
            self.settle(Err(Rejection::msg("cannot resolve a promise with itself")));
            return;
        }
        if other.state() == PromiseState::Pending {
            let source = other.clone();
            self.install_driver(
                async move {
                    let _ = source.await;
                }
                .boxed_local(),
            );
        }
        let target = self.clone();
        other.react(move |result| target.settle(result));
    }

    /// Runs `reaction` now if settled, otherwise when the promise settles.
    fn react(&self, reaction: impl FnOnce(Settled<T>) + 'static) {
        let settled = {
            let mut slot = self.0.borrow_mut();
            match &mut *slot {
                Slot::Pending { reactions, .. } => {
                    reactions.push(Box::new(reaction));
                    return;
                }
                Slot::Settled(result) => result.clone(),
            }
        };
        reaction(settled);
    }

    fn settle(&self, result: Settled<T>) {
        let (reactions, wakers) = {
            let mut slot = self.0.borrow_mut();
            let Slot::Pending {
                reactions, wakers, ..
            } = &mut *slot
            else {
                return;
            };
            let reactions = std::mem::take(reactions);
            let wakers = std::mem::take(wakers);
            *slot = Slot::Settled(result.clone());
            (reactions, wakers)
        };
        for reaction in reactions {
            reaction(result.clone());
        }
        for waker in wakers {
            waker.wake();
        }
    }

    fn install_driver(&self, future: LocalBoxFuture<'static, ()>) {
        if let Slot::Pending { driver, .. } = &mut *self.0.borrow_mut() {
            *driver = Some(future);
        }
    }

    fn poll_driver_once(&self) {
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        self.poll_driver(&mut cx);
    }

    /// Polls the current driver. A driver that completes may have installed a
    /// successor (adoption inside a continuation), which is polled in turn.
    fn poll_driver(&self, cx: &mut Context<'_>) {
        loop {
            let driver = match &mut *self.0.borrow_mut() {
                Slot::Pending { driver, .. } => driver.take(),
                Slot::Settled(_) => None,
            };
            let Some(mut driver) = driver else {
                return;
            };
            if driver.as_mut().poll(cx).is_pending() {
                if let Slot::Pending { driver: slot, .. } = &mut *self.0.borrow_mut() {
                    if slot.is_none() {
                        *slot = Some(driver);
                    }
                }
                return;
            }
        }
    }
}

impl<T: Clone + 'static> Future for SyncPromise<T> {
    type Output = Result<T, Rejection>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.settled() {
            return Poll::Ready(result);
        }
        self.poll_driver(cx);

        let mut slot = self.0.borrow_mut();
        match &mut *slot {
            Slot::Settled(result) => Poll::Ready(result.clone()),
            Slot::Pending { wakers, .. } => {
                if !wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use futures::{channel::oneshot, executor::block_on};

    use super::*;

    #[test]
    fn continuations_run_synchronously() {
        let seen = Rc::new(Cell::new(0));
        let promise = SyncPromise::resolve(20).then(|value| Ok(value + 1));
        promise.clone().then({
            let seen = Rc::clone(&seen);
            move |value| {
                seen.set(value * 2);
                Ok(())
            }
        });
        assert_eq!(seen.get(), 42);
        assert_eq!(promise.state(), PromiseState::Fulfilled);
    }

    #[test]
    fn chaining_is_unambiguous_with_future_ext_in_scope() {
        #[allow(unused_imports)]
        use futures::FutureExt;

        let ran = Rc::new(Cell::new(false));
        let promise = SyncPromise::resolve(1)
            .then(|value| Ok(value + 1))
            .and_then(|value| SyncPromise::resolve(value * 10))
            .catch(|_| Ok(0))
            .finally({
                let ran = Rc::clone(&ran);
                move || ran.set(true)
            });
        assert!(ran.get());
        assert_eq!(promise.settled().map(Result::ok), Some(Some(20)));
    }

    #[test]
    fn pending_promise_runs_reactions_on_resolve() {
        let resolver = Rc::new(RefCell::new(None));
        let promise = SyncPromise::<u32>::new({
            let resolver = Rc::clone(&resolver);
            move |handle| {
                *resolver.borrow_mut() = Some(Resolver(handle.0.clone()));
                Ok(())
            }
        });
        let doubled = promise.then(|value| Ok(value * 2));
        assert_eq!(doubled.state(), PromiseState::Pending);

        if let Some(resolver) = resolver.borrow().as_ref() {
            resolver.resolve(4);
        }
        assert_eq!(doubled.settled().map(Result::ok), Some(Some(8)));
    }

    #[test]
    fn executor_error_rejects() {
        let promise = SyncPromise::<u32>::new(|_| Err(anyhow::anyhow!("boom")));
        let recovered = promise.catch(|reason| {
            assert_eq!(reason.to_string(), "boom");
            Ok(7)
        });
        assert_eq!(recovered.settled().map(Result::ok), Some(Some(7)));
    }

    #[test]
    fn first_settlement_wins() {
        let promise = SyncPromise::new(|resolver| {
            resolver.resolve(1);
            resolver.resolve(2);
            resolver.reject(Rejection::msg("late"));
            Ok(())
        });
        assert_eq!(promise.settled().map(Result::ok), Some(Some(1)));
    }

    #[test]
    fn adopts_nested_promises() {
        let promise = SyncPromise::resolve(1).and_then(|value| SyncPromise::resolve(value + 1));
        assert_eq!(promise.settled().map(Result::ok), Some(Some(2)));
    }

    #[test]
    fn self_resolution_is_rejected() {
        let promise = SyncPromise::<u32>::pending();
        promise.adopt(&promise.clone());
        assert_eq!(promise.state(), PromiseState::Rejected);
    }

    #[test]
    fn finally_passes_result_through() {
        let ran = Rc::new(Cell::new(false));
        let promise = SyncPromise::<u32>::reject(Rejection::msg("nope")).finally({
            let ran = Rc::clone(&ran);
            move || ran.set(true)
        });
        assert!(ran.get());
        assert_eq!(promise.state(), PromiseState::Rejected);
    }

    #[test]
    fn ready_future_settles_immediately() {
        let promise = SyncPromise::from_future(async { Ok::<_, Rejection>(5) });
        assert_eq!(promise.settled().map(Result::ok), Some(Some(5)));
    }

    #[test]
    fn suspended_future_is_driven_when_awaited() {
        let (sender, receiver) = oneshot::channel::<u32>();
        let promise = SyncPromise::from_future(async move {
            receiver.await.map_err(Rejection::new)
        });
        let chained = promise.clone().then(|value| Ok(value + 1));
        assert_eq!(chained.state(), PromiseState::Pending);

        sender.send(9).ok();
        assert_eq!(block_on(chained).ok(), Some(10));
        assert_eq!(promise.state(), PromiseState::Fulfilled);
    }

    #[test]
    fn all_collects_in_order() {
        let all = SyncPromise::all(vec![
            SyncPromise::resolve(1),
            SyncPromise::resolve(2),
            SyncPromise::resolve(3),
        ]);
        assert_eq!(all.settled().map(Result::ok), Some(Some(vec![1, 2, 3])));

        let empty = SyncPromise::<u32>::all(Vec::new());
        assert_eq!(empty.settled().map(Result::ok), Some(Some(Vec::new())));

        let failed = SyncPromise::all(vec![SyncPromise::resolve(1), SyncPromise::reject(Rejection::msg("x"))]);
        assert_eq!(failed.state(), PromiseState::Rejected);
    }

    #[test]
    fn run_sync_fails_on_suspension() {
        assert_eq!(run_sync(async { 3 }), Ok(3));
        assert_eq!(run_sync(futures::future::pending::<()>()), Err(WouldSuspend));
    }
}
