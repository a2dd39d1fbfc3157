//! The main loop: the one tokio runtime that owns container and protocol I/O.

use std::cell::Cell;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::sync::CancellationToken;

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

/// Upper bound on waiting for every worker to come up in [`MainLoop::new`].
const WORKER_STARTUP_WAIT: Duration = Duration::from_secs(1);

thread_local! {
    /// Id of the loop the current thread executes on, `0` for none.
    static CURRENT_LOOP: Cell<u64> = const { Cell::new(0) };
}

/// Owns the main loop runtime.
///
/// Worker threads are tagged with the loop's id so the bridge can tell a
/// re-entrant call from a foreign thread. Tagging happens in the park hook,
/// which tokio runs on async workers only; blocking-pool threads (those
/// running `spawn_blocking` closures) stay untagged.
pub struct MainLoop {
    id: u64,
    runtime: Option<Runtime>,
    closed: CancellationToken,
}

impl MainLoop {
    /// Build a multi-thread runtime; `worker_threads == 0` uses the CPU count.
    pub fn new(worker_threads: usize) -> io::Result<Self> {
        let id = NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed);

        let tagged = Arc::new((Mutex::new(0_usize), Condvar::new()));

        let mut builder = Builder::new_multi_thread();
        if worker_threads > 0 {
            builder.worker_threads(worker_threads);
        }
        let on_park = Arc::clone(&tagged);
        let runtime = builder
            .enable_all()
            .thread_name("mcp-anywhere-main")
            .on_thread_park(move || {
                if CURRENT_LOOP.with(|c| c.replace(id)) != id {
                    let (count, ready) = &*on_park;
                    *count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
                    ready.notify_all();
                }
            })
            .on_thread_stop(|| CURRENT_LOOP.with(|c| c.set(0)))
            .build()?;

        // Idle workers park right away; wait so none runs a task untagged.
        let expected_workers = runtime.metrics().num_workers();
        let (count, ready) = &*tagged;
        let started = count.lock().unwrap_or_else(PoisonError::into_inner);
        let (started, _) = ready
            .wait_timeout_while(started, WORKER_STARTUP_WAIT, |n| *n < expected_workers)
            .unwrap_or_else(PoisonError::into_inner);
        if *started < expected_workers {
            tracing::debug!(
                loop_id = id,
                tagged = *started,
                expected = expected_workers,
                "Not every worker parked during startup"
            );
        }
        drop(started);

        tracing::debug!(loop_id = id, "Main loop started");
        Ok(Self {
            id,
            runtime: Some(runtime),
            closed: CancellationToken::new(),
        })
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    /// A cloneable reference to hand to the bridge.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            id: self.id,
            runtime: self.runtime().handle().clone(),
            closed: self.closed.clone(),
        }
    }

    fn runtime(&self) -> &Runtime {
        // Only `shutdown` and `drop` take the runtime, and both consume the loop
        match &self.runtime {
            Some(rt) => rt,
            None => unreachable!("main loop runtime taken while still in use"),
        }
    }

    /// Drive `future` to completion on the calling thread, which counts as
    /// part of the loop while it does.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async context.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        let _entered = EnterLoop::new(self.id);
        self.runtime().block_on(future)
    }

    /// Mark the loop closed and wait up to `timeout` for tasks to finish.
    pub fn shutdown(mut self, timeout: Duration) {
        self.closed.cancel();
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_timeout(timeout);
        }
        tracing::debug!(loop_id = self.id, "Main loop shut down");
    }
}

impl Drop for MainLoop {
    fn drop(&mut self) {
        self.closed.cancel();
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_background();
        }
    }
}

/// Restores the previous loop tag when `block_on` returns or unwinds.
struct EnterLoop {
    previous: u64,
}

impl EnterLoop {
    fn new(id: u64) -> Self {
        Self {
            previous: CURRENT_LOOP.with(|c| c.replace(id)),
        }
    }
}

impl Drop for EnterLoop {
    fn drop(&mut self) {
        CURRENT_LOOP.with(|c| c.set(self.previous));
    }
}

/// Cloneable reference to a [`MainLoop`].
#[derive(Debug, Clone)]
pub struct LoopHandle {
    id: u64,
    runtime: Handle,
    closed: CancellationToken,
}

impl LoopHandle {
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The runtime handle, unless the loop is closed.
    pub fn runtime(&self) -> Option<&Handle> {
        if self.is_closed() {
            None
        } else {
            Some(&self.runtime)
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Whether the calling thread is executing on this loop.
    pub fn is_current_thread(&self) -> bool {
        CURRENT_LOOP.with(Cell::get) == self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_threads_are_tagged() {
        let main = MainLoop::new(2).unwrap();
        let handle = main.handle();
        assert!(!handle.is_current_thread());

        let rt = handle.runtime().unwrap().clone();
        let loop_handle = handle.clone();
        let on_worker = main.block_on(async move {
            rt.spawn(async move { loop_handle.is_current_thread() }).await.unwrap()
        });
        assert!(on_worker);
    }

    #[test]
    fn blocking_pool_threads_are_not_tagged() {
        let main = MainLoop::new(2).unwrap();
        let handle = main.handle();

        let rt = handle.runtime().unwrap().clone();
        let loop_handle = handle.clone();
        let on_blocking = main.block_on(async move {
            rt.spawn_blocking(move || loop_handle.is_current_thread())
                .await
                .unwrap()
        });
        assert!(!on_blocking);
    }

    #[test]
    fn block_on_tags_and_restores_the_caller() {
        let main = MainLoop::new(1).unwrap();
        let handle = main.handle();
        let inside = main.block_on(async { CURRENT_LOOP.with(Cell::get) });
        assert_eq!(inside, main.id());
        assert!(!handle.is_current_thread());
    }

    #[test]
    fn shutdown_closes_every_handle() {
        let main = MainLoop::new(1).unwrap();
        let handle = main.handle();
        assert!(!handle.is_closed());
        main.shutdown(Duration::from_millis(100));
        assert!(handle.is_closed());
        assert!(handle.runtime().is_none());
    }

    #[test]
    fn loops_get_distinct_ids() {
        let a = MainLoop::new(1).unwrap();
        let b = MainLoop::new(1).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
