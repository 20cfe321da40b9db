//! Cooperative cancellation shared by every task of an experiment.
//!
//! A [`CancelToken`] is a cloneable handle around one `Arc<AtomicBool>`.
//! Setting it never interrupts running code; optimizers observe it at
//! iteration boundaries, the sequencer before each stage, the curriculum
//! before each window and the runner before each location.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every holder of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Route SIGINT/SIGTERM to `token`.
///
/// Errors
/// ------
/// - `ctrlc::Error` if a handler is already installed for this process.
pub fn install_interrupt_handler(token: &CancelToken) -> Result<(), ctrlc::Error> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        warn!("interrupt received; stopping at the next iteration boundary");
        token.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_flag() {
        let token = CancelToken::new();
        let sibling = token.clone();
        assert!(!sibling.is_cancelled());
        token.cancel();
        assert!(sibling.is_cancelled());
    }
}
