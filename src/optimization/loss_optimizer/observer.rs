//! Bridge from argmin's observer hook to an [`IterationCallback`].
//!
//! Argmin calls observers once per completed iteration, in order, with the
//! solver state. The bridge checks the shared [`CancelToken`], forwards the
//! current parameters and loss to the callback, and translates its answer:
//!
//! - cancellation → `Err(OptError::Cancelled)`, which aborts the run;
//! - callback error → `Err(OptError::Callback)`;
//! - stop request (`Ok(true)`) → `Err(OptError::StopRequested)`; the runner
//!   recognises it and builds a normal outcome from the last [`Snapshot`].
use std::sync::{Arc, Mutex};

use argmin::core::{Error, KV, State, observers::Observe};
use tracing::trace;

use crate::{
    optimization::{
        errors::{OptError, OptResult},
        loss_optimizer::{
            traits::IterationCallback,
            types::{Cost, Theta},
        },
    },
    training::cancel::CancelToken,
};

/// Best point seen by the observer, kept for runs stopped by the callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub best_param: Theta,
    pub best_cost: Cost,
    pub iterations: u64,
}

pub type SnapshotHandle = Arc<Mutex<Option<Snapshot>>>;

pub struct ObserverBridge<C> {
    callback: Arc<Mutex<C>>,
    cancel: CancelToken,
    snapshot: SnapshotHandle,
    calls: u64,
}

impl<C: IterationCallback> ObserverBridge<C> {
    pub fn new(callback: Arc<Mutex<C>>, cancel: CancelToken) -> Self {
        Self { callback, cancel, snapshot: Arc::new(Mutex::new(None)), calls: 0 }
    }

    /// Handle to the snapshot slot, readable after the executor consumed the
    /// bridge.
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        Arc::clone(&self.snapshot)
    }

    fn forward<I>(&mut self, state: &I) -> OptResult<()>
    where
        I: State<Param = Theta, Float = Cost>,
    {
        if self.cancel.is_cancelled() {
            return Err(OptError::Cancelled);
        }
        let theta = state.get_param().ok_or(OptError::MissingThetaHat)?;
        self.calls += 1;
        trace!(iteration = self.calls, cost = state.get_cost(), "optimizer iteration");
        let stop = {
            let mut callback = self
                .callback
                .lock()
                .map_err(|_| OptError::Callback { text: "callback lock poisoned".to_string() })?;
            callback
                .on_iteration(theta, state.get_cost())
                .map_err(|e| OptError::Callback { text: e.to_string() })?
        };
        if let (Ok(mut slot), Some(best)) = (self.snapshot.lock(), state.get_best_param()) {
            *slot = Some(Snapshot {
                best_param: best.clone(),
                best_cost: state.get_best_cost(),
                iterations: self.calls,
            });
        }
        if stop {
            return Err(OptError::StopRequested);
        }
        Ok(())
    }
}

impl<C, I> Observe<I> for ObserverBridge<C>
where
    C: IterationCallback,
    I: State<Param = Theta, Float = Cost>,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        Ok(self.forward(state)?)
    }
}
