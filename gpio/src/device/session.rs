use crate::device::{DeviceError, DeviceResult};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct GateState {
    held: Mutex<bool>,
    released: Condvar,
}

impl GateState {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Binary semaphore letting one session at a time onto the device.
#[derive(Default)]
pub struct SessionGate {
    state: Arc<GateState>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the gate, blocking while someone else holds it.
    ///
    /// # Errors
    /// - `DeviceError::Interrupted` if `cancel` fires while waiting. The gate is not taken.
    /// - `DeviceError::ForeignCancelToken` if `cancel` was made by another gate, which could never
    ///   wake this one.
    pub fn acquire(&self, cancel: &CancelToken) -> DeviceResult<()> {
        if !Arc::ptr_eq(&cancel.gate, &self.state) {
            return Err(DeviceError::ForeignCancelToken);
        }

        let mut held = self.state.lock();
        loop {
            if !*held {
                *held = true;
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(DeviceError::Interrupted);
            }
            held = self
                .state
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Takes the gate if nobody holds it.
    ///
    /// # Errors
    /// - `DeviceError::Busy` if the gate is held.
    pub fn try_acquire(&self) -> DeviceResult<()> {
        let mut held = self.state.lock();
        if *held {
            return Err(DeviceError::Busy);
        }
        *held = true;
        Ok(())
    }

    /// Frees the gate, whoever holds it.
    pub fn release(&self) {
        *self.state.lock() = false;
        self.state.released.notify_all();
    }

    pub fn is_held(&self) -> bool {
        *self.state.lock()
    }

    /// A token that interrupts [SessionGate::acquire] calls waiting with it.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            gate: Arc::clone(&self.state),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Debug for SessionGate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionGate(held: {})", self.is_held())
    }
}

/// External cancellation of a blocking open.
///
/// Clones share the same flag. Once cancelled, a token stays cancelled until [CancelToken::reset].
#[derive(Clone)]
pub struct CancelToken {
    gate: Arc<GateState>,
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Taking the lock orders this with a waiter between its check and its wait.
        let _held = self.gate.lock();
        self.gate.released.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

impl Debug for CancelToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CancelToken(cancelled: {})", self.is_cancelled())
    }
}
