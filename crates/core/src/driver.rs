//! Browser seams the core commands but does not implement.
//!
//! A driver crate (see `tradeflow-runtime`) provides the concrete types. The
//! traits are object safe so the core can hold `Box<dyn Page>` without
//! knowing which engine sits behind it.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tradeflow_protocol::StorageState;

/// Result type alias for driver operations.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Errors surfaced by a browser driver.
#[derive(Debug, Error)]
pub enum DriverError {
	/// A wait for `selector` exceeded its budget.
	#[error("timeout after {ms}ms waiting for: {selector}")]
	Timeout { selector: String, ms: u64 },

	/// No element matched the selector at the time of the call.
	#[error("element not found: selector '{0}'")]
	ElementNotFound(String),

	#[error("navigation to {url} failed: {message}")]
	Navigation { url: String, message: String },

	#[error("browser launch failed: {0}")]
	Launch(String),

	/// The remote end rejected a command.
	#[error("driver protocol error: {0}")]
	Protocol(String),

	/// The connection to the driver failed.
	#[error("driver transport error: {0}")]
	Transport(String),

	/// The browser, context or page is already gone.
	#[error("target closed: {0}")]
	Closed(String),
}

impl DriverError {
	pub fn is_timeout(&self) -> bool {
		matches!(self, DriverError::Timeout { .. })
	}
}

/// Options passed to [`BrowserLauncher::launch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOptions {
	pub headless: bool,
}

impl Default for LaunchOptions {
	fn default() -> Self {
		Self { headless: true }
	}
}

/// Element condition awaited by [`Page::wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
	/// Present in the DOM.
	Attached,
	/// Present, visible and enabled.
	Interactable,
}

/// Starts browser instances.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
	async fn launch(&self, options: LaunchOptions) -> DriverResult<Box<dyn Browser>>;
}

/// A running browser owned by one run.
#[async_trait]
pub trait Browser: Send + Sync {
	/// Opens a context, optionally restoring cookies and storage from `seed`.
	async fn new_context(&self, seed: Option<&StorageState>) -> DriverResult<Box<dyn BrowserContext>>;

	/// Releases the browser. Must be safe to call after a failed run.
	async fn close(&self) -> DriverResult<()>;
}

/// An isolated cookie/storage jar within a browser.
#[async_trait]
pub trait BrowserContext: Send + Sync {
	async fn new_page(&self) -> DriverResult<Box<dyn Page>>;

	/// Serializes the context's authentication state.
	async fn export_state(&self) -> DriverResult<StorageState>;
}

/// A single tab. All selector arguments are CSS selectors.
#[async_trait]
pub trait Page: Send + Sync {
	async fn goto(&self, url: &str) -> DriverResult<()>;

	async fn url(&self) -> DriverResult<String>;

	async fn title(&self) -> DriverResult<String>;

	/// Serialized markup of the current document.
	async fn content(&self) -> DriverResult<String>;

	/// Replaces the value of an input.
	async fn fill(&self, selector: &str, value: &str) -> DriverResult<()>;

	/// Types `text` key by key without clearing first.
	async fn type_text(&self, selector: &str, text: &str) -> DriverResult<()>;

	/// Presses a named key (`"Enter"`, `"Tab"`, ...) on the element.
	async fn press(&self, selector: &str, key: &str) -> DriverResult<()>;

	async fn click(&self, selector: &str) -> DriverResult<()>;

	/// Blocks until `selector` reaches `state` or `timeout` elapses, in which
	/// case [`DriverError::Timeout`] is returned.
	async fn wait_for(&self, selector: &str, state: WaitState, timeout: Duration) -> DriverResult<()>;
}

/// Compares URLs ignoring a trailing slash.
pub fn urls_match(current: &str, target: &str) -> bool {
	current == target || current.trim_end_matches('/') == target.trim_end_matches('/')
}
