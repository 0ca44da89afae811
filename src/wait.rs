//! Turns a [`LockStrategy`](crate::lock::LockStrategy) into an actual wait:
//! a futex-style sleep for the synchronous codec, a scheduled-timeout yield
//! for the cooperative-async codec (spec §4.2, §5).

use crate::error::Result;
use crate::lock::LockStrategy;

/// Polls `predicate` under `strategy` until it returns `true`, sleeping
/// between polls as directed by the strategy. Blocks the calling thread —
/// per spec.md §5 this must never run on the host/UI thread, only on the
/// compute thread (which is allowed to block).
pub fn block_until<S: LockStrategy>(strategy: &mut S, mut predicate: impl FnMut() -> bool) -> Result<()> {
    strategy.reset();
    loop {
        if predicate() {
            return Ok(());
        }
        let delay_ms = strategy.spin()?;
        if delay_ms == 0 {
            core::hint::spin_loop();
        } else {
            sleep_ms(delay_ms);
        }
    }
}

/// Retries `attempt` under `strategy` until it yields `Some`, sleeping
/// between polls as directed by the strategy. Unlike [`block_until`], the
/// probe itself can fail (e.g. a malformed reservation request), and that
/// error is propagated immediately instead of being swallowed.
pub(crate) fn retry_until_some<S: LockStrategy, T>(
    strategy: &mut S,
    mut attempt: impl FnMut() -> Result<Option<T>>,
) -> Result<T> {
    strategy.reset();
    loop {
        if let Some(value) = attempt()? {
            return Ok(value);
        }
        let delay_ms = strategy.spin()?;
        if delay_ms == 0 {
            core::hint::spin_loop();
        } else {
            sleep_ms(delay_ms);
        }
    }
}

#[cfg(all(target_arch = "wasm32", target_feature = "atomics"))]
pub(crate) fn sleep_ms(ms: u32) {
    use core::sync::atomic::AtomicI32;
    // A private scratch cell nobody ever notifies: `memory_atomic_wait32`
    // blocks for up to `timeout_ns` as long as the cell still holds the
    // expected value, which makes it double as a precise sleep on targets
    // where `std::thread::sleep` is unavailable (a dedicated wasm worker
    // with shared memory, the compute thread this function is meant for).
    static SCRATCH: AtomicI32 = AtomicI32::new(0);
    let timeout_ns = (ms as i64).saturating_mul(1_000_000);
    // SAFETY: `SCRATCH` is a valid, live `i32`-aligned atomic for the
    // program's lifetime; this is exactly the "scratch atomic" spec.md §5
    // describes the synchronous codec blocking on.
    unsafe {
        core::arch::wasm32::memory_atomic_wait32(
            &SCRATCH as *const AtomicI32 as *mut i32,
            0,
            timeout_ns,
        );
    }
}

#[cfg(not(all(target_arch = "wasm32", target_feature = "atomics")))]
pub(crate) fn sleep_ms(ms: u32) {
    std::thread::sleep(std::time::Duration::from_millis(ms as u64));
}

/// Registers and wakes a single [`core::task::Waker`], guarding the slot
/// with a `Mutex` rather than the teacher's `critical_section` — this crate
/// runs inside cooperatively-scheduled JS event loops, not under interrupt
/// preemption, so there is no critical section to protect against, only
/// ordinary cross-thread access from the compute thread's producer side.
pub struct AsyncWaker {
    waker: std::sync::Mutex<Option<core::task::Waker>>,
}

impl AsyncWaker {
    /// Creates an empty waker slot.
    pub const fn new() -> Self {
        Self {
            waker: std::sync::Mutex::new(None),
        }
    }

    /// Registers `new_waker`, overwriting whatever was previously stored.
    pub fn register(&self, new_waker: &core::task::Waker) {
        *self.waker.lock().unwrap() = Some(new_waker.clone());
    }

    /// Wakes the registered waker, if any.
    pub fn wake(&self) {
        if let Some(w) = self.waker.lock().unwrap().take() {
            w.wake();
        }
    }
}

impl Default for AsyncWaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative-async counterpart to [`block_until`]. Polls `predicate` under
/// `strategy`, yielding to the runtime's timer facility between polls
/// instead of blocking the thread.
#[cfg(feature = "async")]
pub async fn await_until<S: LockStrategy>(
    strategy: &mut S,
    mut predicate: impl FnMut() -> bool,
) -> Result<()> {
    strategy.reset();
    loop {
        if predicate() {
            return Ok(());
        }
        let delay_ms = strategy.spin()?;
        yield_for(delay_ms).await;
    }
}

#[cfg(all(feature = "async", target_arch = "wasm32"))]
async fn yield_for(ms: u32) {
    if ms == 0 {
        // Still give the microtask queue a chance to run so a genuinely
        // busy producer isn't starved forever by a tight loop.
        gloo_timers::future::TimeoutFuture::new(0).await;
    } else {
        gloo_timers::future::TimeoutFuture::new(ms).await;
    }
}

#[cfg(all(feature = "async", not(target_arch = "wasm32")))]
async fn yield_for(ms: u32) {
    sleep_future::SleepFuture::new(ms).await;
}

#[cfg(all(feature = "async", not(target_arch = "wasm32")))]
mod sleep_future {
    //! Minimal native sleep future, used only off wasm32 (tests, and any
    //! in-process embedder exercising the async codec without a browser).
    //! Spawns a one-shot thread per sleep and wakes the polling task from
    //! it, the same `Waker`-registration shape as the teacher's
    //! `atomic_waker` module, just driven by a timer instead of `defmt`
    //! log-frame completion.

    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;

    pub struct SleepFuture {
        done: Arc<std::sync::atomic::AtomicBool>,
        waker: Arc<super::AsyncWaker>,
        started: bool,
        ms: u32,
    }

    impl SleepFuture {
        pub fn new(ms: u32) -> Self {
            Self {
                done: Arc::new(std::sync::atomic::AtomicBool::new(false)),
                waker: Arc::new(super::AsyncWaker::new()),
                started: false,
                ms,
            }
        }
    }

    impl Future for SleepFuture {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            use std::sync::atomic::Ordering;
            if self.done.load(Ordering::Acquire) {
                return Poll::Ready(());
            }
            self.waker.register(cx.waker());
            if !self.started {
                self.started = true;
                let done = self.done.clone();
                let waker = self.waker.clone();
                let ms = self.ms;
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(ms as u64));
                    done.store(true, Ordering::Release);
                    waker.wake();
                });
            }
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lock::Backoff;

    #[test]
    fn block_until_resolves_when_predicate_flips() {
        let mut strategy = Backoff::new(1_000_000, 1, 1);
        let mut calls = 0;
        block_until(&mut strategy, || {
            calls += 1;
            calls >= 3
        })
        .unwrap();
        assert_eq!(calls, 3);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn await_until_resolves_when_predicate_flips() {
        let mut strategy = Backoff::new(1_000_000, 1, 1);
        let mut calls = 0;
        await_until(&mut strategy, || {
            calls += 1;
            calls >= 3
        })
        .await
        .unwrap();
        assert_eq!(calls, 3);
    }
}
