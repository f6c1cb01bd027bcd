//! Error types for authentication, order entry and session persistence.

use std::path::PathBuf;

use thiserror::Error;

use crate::driver::DriverError;
use crate::workflow::{WorkflowState, WorkflowStep};

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// Credential login completed but the probe page still looks logged out.
	#[error("authentication failed at {probe_url}: {reason}")]
	AuthenticationFailed { probe_url: String, reason: String },

	/// A step was invoked out of order, or on a failed workflow.
	#[error("invalid workflow transition: cannot {step} while {state}")]
	InvalidWorkflowTransition { step: WorkflowStep, state: WorkflowState },

	#[error("unsupported action: {0}")]
	UnsupportedAction(String),

	#[error("unsupported order type: {0}")]
	UnsupportedOrderType(String),

	/// The step's UI signal did not appear in time.
	#[error("step {step} timed out after {elapsed_ms}ms")]
	StepTimeout { step: WorkflowStep, elapsed_ms: u64 },

	/// The persisted session exists but cannot be used.
	#[error("session store {path:?} is unusable: {reason}")]
	SessionStoreCorrupt { path: PathBuf, reason: String },

	#[error("invalid order: {0}")]
	InvalidOrder(String),

	#[error("run cancelled before {0}")]
	Cancelled(String),

	/// A failure inside [`OrderWorkflow::execute`](crate::OrderWorkflow::execute),
	/// annotated with the failing step and the states visited so far.
	#[error("order failed at {step}: {source}")]
	Workflow {
		step: WorkflowStep,
		trail: Vec<WorkflowState>,
		#[source]
		source: Box<Error>,
	},

	#[error(transparent)]
	Driver(#[from] DriverError),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Innermost error, skipping workflow annotations.
	pub fn root(&self) -> &Error {
		match self {
			Error::Workflow { source, .. } => source.root(),
			other => other,
		}
	}

	/// Step the error is attributed to, if any.
	pub fn step(&self) -> Option<WorkflowStep> {
		match self {
			Error::Workflow { step, .. } => Some(*step),
			Error::InvalidWorkflowTransition { step, .. } | Error::StepTimeout { step, .. } => Some(*step),
			_ => None,
		}
	}

	/// States visited before the failure; empty outside order entry.
	pub fn trail(&self) -> &[WorkflowState] {
		match self {
			Error::Workflow { trail, .. } => trail,
			_ => &[],
		}
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self.root(), Error::Cancelled(_))
	}
}
