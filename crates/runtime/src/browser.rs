//! Launcher, browser and context over a WebDriver endpoint.
//!
//! A WebDriver session owns exactly one cookie jar, so a "context" here is
//! that jar emptied and optionally re-seeded. localStorage written by an
//! earlier seed is cleared as well. Opening a second context replaces the
//! first, which matches how a run uses them (one at a time).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use tradeflow::{Browser, BrowserContext, BrowserLauncher, DriverError, DriverResult, LaunchOptions, Page};
use tradeflow_protocol::webdriver::{BrowserKind, WebDriverCookie};
use tradeflow_protocol::{LocalStorageEntry, OriginState, StorageState};

use crate::connection::{Connection, Session};
use crate::error::Result;
use crate::page::WebDriverPage;

/// Endpoint chromedriver listens on by default.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:9515";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const READ_LOCAL_STORAGE: &str = "return [window.location.origin, Object.entries(window.localStorage)];";

const WRITE_LOCAL_STORAGE: &str = "for (const [k, v] of arguments[0]) { window.localStorage.setItem(k, v); }";

const CLEAR_LOCAL_STORAGE: &str = "window.localStorage.clear();";

/// Opens sessions on an already running WebDriver server.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
	endpoint: String,
	kind: BrowserKind,
	poll_interval: Duration,
}

impl WebDriverLauncher {
	pub fn new(endpoint: impl Into<String>, kind: BrowserKind) -> Self {
		Self {
			endpoint: endpoint.into(),
			kind,
			poll_interval: DEFAULT_POLL_INTERVAL,
		}
	}

	/// How often [`Page::wait_for`] re-checks the DOM.
	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}
}

impl Default for WebDriverLauncher {
	fn default() -> Self {
		Self::new(DEFAULT_ENDPOINT, BrowserKind::default())
	}
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
	async fn launch(&self, options: LaunchOptions) -> DriverResult<Box<dyn Browser>> {
		let launch_error = |err: crate::Error| DriverError::Launch(format!("{} via {}: {err}", self.kind, self.endpoint));

		let connection = Connection::new(&self.endpoint).map_err(launch_error)?;
		let session = Session::create(connection, self.kind.capabilities(options.headless))
			.await
			.map_err(launch_error)?;

		Ok(Box::new(WebDriverBrowser {
			session: Arc::new(session),
			poll_interval: self.poll_interval,
			seeded_origins: Mutex::new(Vec::new()),
		}))
	}
}

pub struct WebDriverBrowser {
	session: Arc<Session>,
	poll_interval: Duration,
	/// Origins whose localStorage a seed has written to.
	seeded_origins: Mutex<Vec<String>>,
}

impl WebDriverBrowser {
	pub fn session_id(&self) -> &str {
		self.session.id()
	}

	/// Empties localStorage on every origin an earlier seed wrote to. An
	/// origin that cannot be reached is skipped; nothing is exported from it.
	async fn clear_seeded_storage(&self) {
		let origins = std::mem::take(&mut *self.seeded_origins.lock());
		for origin in origins {
			match clear_local_storage(&self.session, &origin).await {
				Ok(_) => debug!(target = "tradeflow", origin = %origin, "cleared localStorage"),
				Err(err) => warn!(target = "tradeflow", origin = %origin, error = %err, "could not clear localStorage"),
			}
		}
	}
}

#[async_trait]
impl Browser for WebDriverBrowser {
	async fn new_context(&self, seed: Option<&StorageState>) -> DriverResult<Box<dyn BrowserContext>> {
		self.session.delete_cookies().await?;
		self.clear_seeded_storage().await;
		if let Some(state) = seed {
			self.seeded_origins.lock().extend(
				state
					.origins
					.iter()
					.filter(|o| !o.local_storage.is_empty())
					.map(|o| o.origin.clone()),
			);
			restore(&self.session, state).await?;
		}

		Ok(Box::new(WebDriverContext {
			session: Arc::clone(&self.session),
			poll_interval: self.poll_interval,
		}))
	}

	async fn close(&self) -> DriverResult<()> {
		self.session.delete().await?;
		Ok(())
	}
}

pub struct WebDriverContext {
	session: Arc<Session>,
	poll_interval: Duration,
}

#[async_trait]
impl BrowserContext for WebDriverContext {
	async fn new_page(&self) -> DriverResult<Box<dyn Page>> {
		Ok(Box::new(WebDriverPage::new(Arc::clone(&self.session), self.poll_interval)))
	}

	async fn export_state(&self) -> DriverResult<StorageState> {
		let cookies = self.session.cookies().await?.iter().map(WebDriverCookie::to_storage_cookie).collect();
		let origins = match self.session.execute(READ_LOCAL_STORAGE, Vec::new()).await {
			Ok(value) => local_storage(value)?,
			Err(err) => {
				// about:blank and error pages deny localStorage access.
				debug!(target = "tradeflow", error = %err, "localStorage not readable, exporting cookies only");
				Vec::new()
			}
		};
		Ok(StorageState { cookies, origins })
	}
}

/// Replays `state` into the session: cookies per host, then localStorage
/// per origin. WebDriver only accepts cookies for the current document's
/// domain, hence the navigation before each batch.
async fn restore(session: &Session, state: &StorageState) -> Result<()> {
	for host in state.cookie_hosts() {
		session.navigate(&format!("https://{host}/")).await?;
		for cookie in state.cookies.iter().filter(|c| c.host() == Some(host)) {
			session.add_cookie(&WebDriverCookie::from(cookie)).await?;
		}
	}

	for origin in state.origins.iter().filter(|o| !o.local_storage.is_empty()) {
		session.navigate(&origin.origin).await?;
		let entries: Vec<Value> = origin.local_storage.iter().map(|e| json!([e.name, e.value])).collect();
		session.execute(WRITE_LOCAL_STORAGE, vec![Value::Array(entries)]).await?;
	}

	info!(
		target = "tradeflow",
		cookies = state.cookies.len(),
		origins = state.origins.len(),
		"restored storage state"
	);
	Ok(())
}

async fn clear_local_storage(session: &Session, origin: &str) -> Result<()> {
	session.navigate(origin).await?;
	session.execute(CLEAR_LOCAL_STORAGE, Vec::new()).await?;
	Ok(())
}

fn local_storage(value: Value) -> Result<Vec<OriginState>> {
	let (origin, entries): (String, Vec<(String, String)>) = serde_json::from_value(value)?;
	if entries.is_empty() || origin == "null" {
		return Ok(Vec::new());
	}
	let local_storage = entries.into_iter().map(|(name, value)| LocalStorageEntry { name, value }).collect();
	Ok(vec![OriginState { origin, local_storage }])
}
