use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Fires the tokens it hands out.
///
/// The source owns the sending half of a channel that never carries a
/// message. Cancelling drops it, which disconnects every token's receiver at
/// once, so the runner can `select!` on it. Dropping the source cancels its
/// tokens as well.
#[derive(Debug)]
pub struct CancelSource {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            fired: self.rx.clone(),
            deadline: None,
        }
    }

    /// Cancel every token from this source. Calling it again has no effect.
    pub fn cancel(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        disconnected(&self.rx)
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observable side of a cancellation signal.
///
/// The default token never fires.
#[derive(Debug, Clone)]
pub struct CancelToken {
    fired: Receiver<()>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never fires.
    pub fn never() -> Self {
        Self {
            fired: crossbeam_channel::never(),
            deadline: None,
        }
    }

    /// Also fire once `deadline` passes. An earlier deadline already on the
    /// token is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        disconnected(&self.fired) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Receiver that becomes ready (disconnected) when the source cancels.
    pub(crate) fn fired(&self) -> &Receiver<()> {
        &self.fired
    }

    /// Receiver that becomes ready when the deadline passes, or never.
    pub(crate) fn deadline_reached(&self) -> Receiver<Instant> {
        match self.deadline {
            Some(d) => crossbeam_channel::at(d),
            None => crossbeam_channel::never(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

fn disconnected(rx: &Receiver<()>) -> bool {
    matches!(rx.try_recv(), Err(TryRecvError::Disconnected))
}
