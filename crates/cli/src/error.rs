use std::path::PathBuf;

use serde_json::json;
use thiserror::Error;
use tradeflow::DriverError;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("no credentials: set {username_var} and {password_var}, or write {secrets:?}")]
	MissingCredentials {
		username_var: &'static str,
		password_var: &'static str,
		secrets: PathBuf,
	},

	#[error("invalid JSON in {path:?}: {source}")]
	ConfigFile {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("config file not found: {0:?}")]
	ConfigNotFound(PathBuf),

	#[error(transparent)]
	Core(#[from] tradeflow::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	/// Failure wrapped with free-form context; displays the whole chain.
	#[error("{0:#}")]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	/// Converts this error to a CommandError for structured output.
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = match self {
			CliError::MissingCredentials { secrets, .. } => (ErrorCode::ConfigError, Some(json!({ "secrets": secrets }))),
			CliError::ConfigFile { path, .. } | CliError::ConfigNotFound(path) => (ErrorCode::ConfigError, Some(json!({ "path": path }))),
			CliError::Core(err) => (classify(err), workflow_details(err)),
			CliError::Io(_) => (ErrorCode::IoError, None),
			CliError::Anyhow(err) => (classify_chain(err), None),
		};

		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}
}

fn classify(err: &tradeflow::Error) -> ErrorCode {
	use tradeflow::Error;

	match err.root() {
		Error::AuthenticationFailed { .. } => ErrorCode::AuthenticationFailed,
		Error::InvalidWorkflowTransition { .. } => ErrorCode::InvalidTransition,
		Error::UnsupportedAction(_) | Error::UnsupportedOrderType(_) | Error::InvalidOrder(_) => ErrorCode::UnsupportedInput,
		Error::StepTimeout { .. } | Error::Driver(DriverError::Timeout { .. }) => ErrorCode::Timeout,
		Error::Cancelled(_) => ErrorCode::Cancelled,
		Error::Driver(_) => ErrorCode::BrowserError,
		Error::SessionStoreCorrupt { .. } | Error::Io(_) => ErrorCode::IoError,
		Error::Json(_) | Error::Workflow { .. } => ErrorCode::InternalError,
	}
}

/// Code for the innermost known error under the added context.
fn classify_chain(err: &anyhow::Error) -> ErrorCode {
	if let Some(core) = err.downcast_ref::<tradeflow::Error>() {
		return classify(core);
	}
	if err.chain().any(|cause| cause.is::<std::io::Error>()) {
		return ErrorCode::IoError;
	}
	ErrorCode::InternalError
}

fn workflow_details(err: &tradeflow::Error) -> Option<serde_json::Value> {
	let step = err.step()?;
	Some(json!({ "step": step, "trail": err.trail() }))
}
