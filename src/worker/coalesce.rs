use std::fmt;

use tracing::debug;

use crate::error::Result;

/// Outcome of a "replace data" request.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadDataOutcome<T> {
    Loaded(T),
    /// A newer request replaced this one before it was started.
    Abandoned,
}

impl<T> LoadDataOutcome<T> {
    pub fn is_abandoned(&self) -> bool {
        matches!(self, LoadDataOutcome::Abandoned)
    }
}

pub type LoadDataCallback<T> = Box<dyn FnOnce(Result<LoadDataOutcome<T>>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceState {
    /// Nothing in flight; the next request starts right away.
    Idle,
    /// A result was produced and the foreground has not acknowledged it yet.
    Coalescing,
    /// Like `Coalescing`, with a newer request waiting for the acknowledgement.
    NeedsLoadData,
}

/// Serializes overlapping "replace data" requests so that at most one is
/// processed per acknowledgement and only the latest one survives.
pub struct Coalescer<R, T> {
    state: CoalesceState,
    pending: Option<(R, LoadDataCallback<T>)>,
}

impl<R, T> fmt::Debug for Coalescer<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coalescer")
            .field("state", &self.state)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

impl<R, T> Default for Coalescer<R, T> {
    fn default() -> Self {
        Self {
            state: CoalesceState::Idle,
            pending: None,
        }
    }
}

impl<R, T> Coalescer<R, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CoalesceState {
        self.state
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Queues `request`, resolving any request it replaces as abandoned.
    /// Returns the request to process now, if the machine was idle.
    pub fn submit(
        &mut self,
        request: R,
        callback: LoadDataCallback<T>,
    ) -> Option<(R, LoadDataCallback<T>)> {
        self.abandon_pending();
        match self.state {
            CoalesceState::Idle => {
                self.state = CoalesceState::Coalescing;
                Some((request, callback))
            }
            CoalesceState::Coalescing | CoalesceState::NeedsLoadData => {
                debug!(state = ?self.state, "deferring load until acknowledged");
                self.state = CoalesceState::NeedsLoadData;
                self.pending = Some((request, callback));
                None
            }
        }
    }

    /// The foreground applied the previous result. Returns the waiting
    /// request to process now, if there is one.
    pub fn ack(&mut self) -> Option<(R, LoadDataCallback<T>)> {
        match self.state {
            CoalesceState::Coalescing => {
                self.state = CoalesceState::Idle;
                None
            }
            CoalesceState::NeedsLoadData => {
                self.state = CoalesceState::Coalescing;
                self.pending.take()
            }
            CoalesceState::Idle => None,
        }
    }

    /// Resolves the waiting request, if any, as abandoned.
    pub fn abandon_pending(&mut self) {
        if let Some((_, callback)) = self.pending.take() {
            debug!("abandoning superseded load");
            callback(Ok(LoadDataOutcome::Abandoned));
        }
    }
}
