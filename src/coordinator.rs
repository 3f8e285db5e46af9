//! Compilation lifecycle coordination.
//!
//! A two-state machine (Idle / Compiling) over the compiler's lifecycle
//! events. At most one settle signal is outstanding at any instant: a
//! "compile started" while one is pending is coalesced into it, so N callers
//! awaiting "bundle ready" all observe the same completion.

use crate::error::IsomorphicError;
use std::cell::RefCell;
use tokio::sync::oneshot;

#[derive(Default)]
struct CoordinatorState {
    /// True between a recognized "compile started" and the next
    /// "compile finished".
    compiling: bool,
    waiters: Vec<oneshot::Sender<()>>,
}

pub struct CompilationCoordinator {
    enabled: bool,
    state: RefCell<CoordinatorState>,
}

impl CompilationCoordinator {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: RefCell::new(CoordinatorState::default()),
        }
    }

    /// Idle -> Compiling. A started event while already compiling is
    /// coalesced into the pending signal.
    pub fn compile_started(&self) {
        let mut state = self.state.borrow_mut();
        log::debug!("compiler event: compile (compiling: {})", state.compiling);
        if state.compiling {
            return;
        }
        state.compiling = true;
    }

    /// Compiling -> Idle. Resolves the outstanding signal, unblocking every
    /// caller waiting on it. A finished event without a recognized start
    /// (e.g. right after startup) is a no-op settle.
    pub fn compile_finished(&self) {
        log::debug!("compiler event: done");
        let waiters = {
            let mut state = self.state.borrow_mut();
            state.compiling = false;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            // A dropped receiver just means the caller stopped waiting.
            let _ = waiter.send(());
        }
    }

    pub fn is_compiling(&self) -> bool {
        self.state.borrow().compiling
    }

    /// Current settle signal: pending while Compiling, already settled while
    /// Idle. Fails with `FeatureDisabled` unless the feature was enabled at
    /// setup.
    pub fn compilation_promise(&self) -> Result<CompilationPromise, IsomorphicError> {
        if !self.enabled {
            return Err(IsomorphicError::FeatureDisabled);
        }
        let mut state = self.state.borrow_mut();
        if !state.compiling {
            return Ok(CompilationPromise { receiver: None });
        }
        let (sender, receiver) = oneshot::channel();
        state.waiters.push(sender);
        Ok(CompilationPromise {
            receiver: Some(receiver),
        })
    }
}

/// Awaitable settle signal for the compilation in progress on creation.
pub struct CompilationPromise {
    receiver: Option<oneshot::Receiver<()>>,
}

impl CompilationPromise {
    /// True if the signal was already settled when it was obtained.
    pub fn is_settled(&self) -> bool {
        self.receiver.is_none()
    }

    /// Suspend until the compilation settles. Returns immediately for a
    /// signal obtained while Idle.
    pub async fn settled(self) {
        if let Some(receiver) = self.receiver {
            let _ = receiver.await;
        }
    }
}
