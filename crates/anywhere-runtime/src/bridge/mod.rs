//! Event Loop Bridge.
//!
//! The only sanctioned way for synchronous code to run a future on the
//! main loop and wait for its result.

mod main_loop;

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{OnceLock, PoisonError, RwLock};
use std::time::Duration;

use futures_util::FutureExt;
use thiserror::Error;

pub use main_loop::{LoopHandle, MainLoop};

/// Misuse of the bridge or an expired call.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("no main loop has been registered with the bridge")]
    NotInitialized,

    #[error("the main loop has shut down")]
    ClosedLoop,

    /// Side effects of the cancelled future are indeterminate.
    #[error("bridged call timed out after {0:?}")]
    Timeout(Duration),
}

/// Holds the reference to the main loop.
///
/// Construct one with [`EventLoopBridge::new`] and pass it where needed, or
/// use the process-wide [`EventLoopBridge::global`].
#[derive(Debug, Default)]
pub struct EventLoopBridge {
    main_loop: RwLock<Option<LoopHandle>>,
}

static GLOBAL: OnceLock<EventLoopBridge> = OnceLock::new();

impl EventLoopBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide bridge, created on first use.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// Record the main loop. Called once during startup.
    pub fn set_main_loop(&self, handle: LoopHandle) {
        let mut slot = self
            .main_loop
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.as_ref() {
            tracing::warn!(
                previous = previous.id(),
                next = handle.id(),
                "Replacing the registered main loop"
            );
        }
        *slot = Some(handle);
    }

    pub fn is_initialized(&self) -> bool {
        self.main_loop
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn current(&self) -> Result<LoopHandle, BridgeError> {
        let handle = self
            .main_loop
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(BridgeError::NotInitialized)?;
        if handle.is_closed() {
            return Err(BridgeError::ClosedLoop);
        }
        Ok(handle)
    }

    /// Run `future` on the main loop and block until it completes or
    /// `timeout` elapses.
    ///
    /// A panic inside `future` resumes on the calling thread. On timeout
    /// the task is aborted at its next suspension point.
    pub fn run_async<F>(&self, future: F, timeout: Duration) -> Result<F::Output, BridgeError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.current()?;
        let runtime = handle.runtime().ok_or(BridgeError::ClosedLoop)?.clone();

        if handle.is_current_thread() {
            // Handing off to the loop would wait on ourselves
            tracing::warn!(
                loop_id = handle.id(),
                "run_async called from the main loop; running inline"
            );
            return tokio::task::block_in_place(|| {
                runtime.block_on(tokio::time::timeout(timeout, future))
            })
            .map_err(|_| BridgeError::Timeout(timeout));
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let task = runtime.spawn(async move {
            let outcome = AssertUnwindSafe(future).catch_unwind().await;
            // The caller may have given up already
            let _ = tx.send(outcome);
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(RecvTimeoutError::Timeout) => {
                task.abort();
                tracing::debug!(?timeout, "Bridged call timed out; task aborted");
                Err(BridgeError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::ClosedLoop),
        }
    }
}
