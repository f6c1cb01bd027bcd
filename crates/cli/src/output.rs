//! Structured output envelope for all CLI commands.
//!
//! Every command produces one result on stdout:
//!
//! ```json
//! { "ok": true, "command": "order", "data": { ... } }
//! ```
//!
//! On failure:
//!
//! ```json
//! {
//!   "ok": false,
//!   "command": "order",
//!   "error": {
//!     "code": "TIMEOUT",
//!     "message": "order failed at review: step review timed out after 5000ms",
//!     "details": { "step": "review", "trail": ["idle", "symbol_entered", "failed"] }
//!   }
//! }
//! ```

use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

/// Output format for CLI results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// Pretty-printed JSON envelope
	Json,
}

impl fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
		}
	}
}

/// The result envelope returned by all commands.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T> {
	pub ok: bool,

	/// Command name (e.g. "login", "order", "session show")
	pub command: String,

	/// Command-specific result data (only present on success)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,

	/// Error information (only present on failure)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
}

impl<T: Serialize> CommandResult<T> {
	pub fn success(command: impl Into<String>, data: T) -> Self {
		Self {
			ok: true,
			command: command.into(),
			data: Some(data),
			error: None,
		}
	}
}

impl CommandResult<()> {
	pub fn failure(command: impl Into<String>, error: CommandError) -> Self {
		Self {
			ok: false,
			command: command.into(),
			data: None,
			error: Some(error),
		}
	}
}

/// Error information for failed commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,

	pub message: String,

	/// Step, trail and other machine-readable context.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Stable error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Login completed but the site still shows the logged-out page
	AuthenticationFailed,
	/// A workflow step was attempted out of order
	InvalidTransition,
	/// Unknown action, order type or a malformed order
	UnsupportedInput,
	/// A step or element wait ran out of time
	Timeout,
	/// Interrupted by the user
	Cancelled,
	/// The WebDriver endpoint or browser failed
	BrowserError,
	/// Missing credentials or an unreadable config file
	ConfigError,
	IoError,
	InternalError,
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ErrorCode::AuthenticationFailed => "AUTHENTICATION_FAILED",
			ErrorCode::InvalidTransition => "INVALID_TRANSITION",
			ErrorCode::UnsupportedInput => "UNSUPPORTED_INPUT",
			ErrorCode::Timeout => "TIMEOUT",
			ErrorCode::Cancelled => "CANCELLED",
			ErrorCode::BrowserError => "BROWSER_ERROR",
			ErrorCode::ConfigError => "CONFIG_ERROR",
			ErrorCode::IoError => "IO_ERROR",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		};
		f.write_str(s)
	}
}

pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	match format {
		OutputFormat::Json => {
			if let Ok(json) = serde_json::to_string_pretty(result) {
				println!("{json}");
			}
		}
		OutputFormat::Text => print_result_text(result),
	}
}

fn print_result_text<T: Serialize>(result: &CommandResult<T>) {
	let mut stdout = io::stdout().lock();

	if result.ok {
		if let Some(ref data) = result.data {
			if let Ok(json) = serde_json::to_string_pretty(data) {
				let _ = writeln!(stdout, "{json}");
			}
		}
	} else if let Some(ref error) = result.error {
		let _ = writeln!(stdout, "Error [{}]: {}", error.code, error.message);
		if let Some(ref details) = error.details {
			if let Ok(json) = serde_json::to_string_pretty(details) {
				let _ = writeln!(stdout, "Details: {json}");
			}
		}
	}
}

pub fn print_error_stderr(error: &CommandError) {
	eprintln!("Error [{}]: {}", error.code, error.message);
}
