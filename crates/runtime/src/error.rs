//! Error types for the WebDriver runtime.

use thiserror::Error;
use tradeflow::DriverError;
use tradeflow_protocol::webdriver::WireError;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid WebDriver URL {url}: {source}")]
	InvalidUrl {
		url: String,
		#[source]
		source: url::ParseError,
	},

	/// The HTTP exchange itself failed (connect, timeout, body read).
	#[error("WebDriver request failed: {0}")]
	Http(#[from] reqwest::Error),

	/// The remote end answered with a WebDriver error envelope.
	#[error("{}: {} (HTTP {status})", wire.error, wire.message)]
	Remote { status: u16, wire: WireError },

	/// The response was well-formed JSON but not what the command returns.
	#[error("unexpected WebDriver response: {0}")]
	Protocol(String),

	#[error("invalid WebDriver JSON: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn is_no_such_element(&self) -> bool {
		matches!(self, Error::Remote { wire, .. } if wire.is_no_such_element())
	}

	/// The element was found but detached before the follow-up command.
	pub fn is_stale(&self) -> bool {
		matches!(self, Error::Remote { wire, .. } if wire.error == "stale element reference")
	}

	fn is_gone(&self) -> bool {
		matches!(self, Error::Remote { wire, .. } if matches!(wire.error.as_str(), "invalid session id" | "no such window"))
	}
}

impl From<Error> for DriverError {
	fn from(err: Error) -> Self {
		match err {
			Error::Remote { ref wire, .. } if wire.is_no_such_element() => DriverError::ElementNotFound(wire.message.clone()),
			// Page-load and script timeouts; the remote end does not report its budget.
			Error::Remote { ref wire, .. } if wire.is_timeout() => DriverError::Timeout {
				selector: wire.message.clone(),
				ms: 0,
			},
			ref gone if gone.is_gone() => DriverError::Closed(gone.to_string()),
			Error::Http(e) => DriverError::Transport(e.to_string()),
			Error::InvalidUrl { url, source } => DriverError::Transport(format!("invalid WebDriver URL {url}: {source}")),
			other => DriverError::Protocol(other.to_string()),
		}
	}
}
