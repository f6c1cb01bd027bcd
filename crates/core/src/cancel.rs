//! Cooperative cancellation of a run.
//!
//! Cancellation is checked between workflow steps, never mid-step, so a run
//! stops at a well-defined state and still releases its browser.

use tokio::sync::watch;

/// Owning side; call [`CancelHandle::cancel`] to request a stop.
#[derive(Debug)]
pub struct CancelHandle {
	tx: watch::Sender<bool>,
}

/// Observing side, cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
	rx: watch::Receiver<bool>,
}

impl CancelHandle {
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(false);
		Self { tx }
	}

	pub fn signal(&self) -> CancelSignal {
		CancelSignal { rx: self.tx.subscribe() }
	}

	pub fn cancel(&self) {
		self.tx.send_replace(true);
	}

	pub fn is_cancelled(&self) -> bool {
		*self.tx.borrow()
	}
}

impl Default for CancelHandle {
	fn default() -> Self {
		Self::new()
	}
}

impl CancelSignal {
	pub fn is_cancelled(&self) -> bool {
		*self.rx.borrow()
	}
}
