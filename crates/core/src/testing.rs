//! Scripted in-memory browser used by the unit tests.
//!
//! Every fake shares one [`FakeState`], so a test can tweak the "site" and
//! inspect the event log after the fact.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use tradeflow_protocol::{Cookie, StorageState};

use crate::driver::{Browser, BrowserContext, BrowserLauncher, DriverError, DriverResult, LaunchOptions, Page, WaitState};
use crate::site::SiteProfile;

#[derive(Debug)]
pub(crate) struct FakeState {
	pub events: Vec<String>,
	pub authenticated: bool,
	/// Whether a context seeded with stored state starts out logged in.
	pub accept_seeded: bool,
	pub login_succeeds: bool,
	/// Selectors that never appear.
	pub missing: HashSet<String>,
	pub submit_button: String,
	pub launches: usize,
	pub closes: usize,
	pub fail_launch: bool,
	pub fail_close: bool,
	pub current_url: String,
	pub seeds: Vec<Option<StorageState>>,
}

#[derive(Clone)]
pub(crate) struct FakeSite {
	state: Arc<Mutex<FakeState>>,
}

impl FakeSite {
	/// A cooperative site built from the default profile. The interstitial
	/// never shows up unless a test removes it from `missing`.
	pub fn new() -> Self {
		let site = SiteProfile::default();
		let mut missing = HashSet::new();
		if let Some(selector) = site.interstitial_dismiss {
			missing.insert(selector);
		}

		let state = FakeState {
			events: Vec::new(),
			authenticated: false,
			accept_seeded: true,
			login_succeeds: true,
			missing,
			submit_button: site.login.submit_button,
			launches: 0,
			closes: 0,
			fail_launch: false,
			fail_close: false,
			current_url: "about:blank".into(),
			seeds: Vec::new(),
		};
		Self {
			state: Arc::new(Mutex::new(state)),
		}
	}

	pub fn with(self, f: impl FnOnce(&mut FakeState)) -> Self {
		f(&mut self.state.lock());
		self
	}

	pub fn state(&self) -> MutexGuard<'_, FakeState> {
		self.state.lock()
	}

	pub fn events(&self) -> Vec<String> {
		self.state.lock().events.clone()
	}

	pub fn launcher(&self) -> FakeLauncher {
		FakeLauncher { site: self.clone() }
	}

	pub fn browser(&self) -> FakeBrowser {
		FakeBrowser { site: self.clone() }
	}

	pub fn page(&self) -> FakePage {
		FakePage { site: self.clone() }
	}

	fn record(&self, event: impl Into<String>) {
		self.state.lock().events.push(event.into());
	}

	fn check_present(&self, selector: &str) -> DriverResult<()> {
		if self.state.lock().missing.contains(selector) {
			return Err(DriverError::ElementNotFound(selector.to_string()));
		}
		Ok(())
	}
}

pub(crate) fn stored_state() -> StorageState {
	StorageState::with_cookies(vec![Cookie::new("ASP.NET_SessionId", "stored", ".stocktrak.com").path("/")])
}

pub(crate) struct FakeLauncher {
	site: FakeSite,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
	async fn launch(&self, options: LaunchOptions) -> DriverResult<Box<dyn Browser>> {
		let mut state = self.site.state.lock();
		if state.fail_launch {
			return Err(DriverError::Launch("no browser available".into()));
		}
		state.launches += 1;
		state.events.push(format!("launch headless={}", options.headless));
		drop(state);
		Ok(Box::new(self.site.browser()))
	}
}

pub(crate) struct FakeBrowser {
	site: FakeSite,
}

#[async_trait]
impl Browser for FakeBrowser {
	async fn new_context(&self, seed: Option<&StorageState>) -> DriverResult<Box<dyn BrowserContext>> {
		let mut state = self.site.state.lock();
		state.authenticated = seed.is_some() && state.accept_seeded;
		state.seeds.push(seed.cloned());
		let event = if seed.is_some() { "context seeded" } else { "context fresh" };
		state.events.push(event.into());
		drop(state);
		Ok(Box::new(FakeContext { site: self.site.clone() }))
	}

	async fn close(&self) -> DriverResult<()> {
		let mut state = self.site.state.lock();
		state.closes += 1;
		state.events.push("close".into());
		if state.fail_close {
			return Err(DriverError::Closed("browser already gone".into()));
		}
		Ok(())
	}
}

pub(crate) struct FakeContext {
	site: FakeSite,
}

#[async_trait]
impl BrowserContext for FakeContext {
	async fn new_page(&self) -> DriverResult<Box<dyn Page>> {
		Ok(Box::new(self.site.page()))
	}

	async fn export_state(&self) -> DriverResult<StorageState> {
		self.site.record("export");
		let cookies = if self.site.state.lock().authenticated {
			vec![Cookie::new("ASP.NET_SessionId", "fresh", ".stocktrak.com").path("/")]
		} else {
			Vec::new()
		};
		Ok(StorageState::with_cookies(cookies))
	}
}

pub(crate) struct FakePage {
	site: FakeSite,
}

#[async_trait]
impl Page for FakePage {
	async fn goto(&self, url: &str) -> DriverResult<()> {
		let mut state = self.site.state.lock();
		state.current_url = url.to_string();
		state.events.push(format!("goto {url}"));
		Ok(())
	}

	async fn url(&self) -> DriverResult<String> {
		Ok(self.site.state.lock().current_url.clone())
	}

	async fn title(&self) -> DriverResult<String> {
		let title = if self.site.state.lock().authenticated {
			"Dashboard | StockTrak"
		} else {
			"Login | StockTrak"
		};
		Ok(title.into())
	}

	async fn content(&self) -> DriverResult<String> {
		Ok(format!("<html><head><title>{}</title></head></html>", self.title().await?))
	}

	async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
		self.site.check_present(selector)?;
		self.site.record(format!("fill {selector}={value}"));
		Ok(())
	}

	async fn type_text(&self, selector: &str, text: &str) -> DriverResult<()> {
		self.site.check_present(selector)?;
		self.site.record(format!("type {selector}={text}"));
		Ok(())
	}

	async fn press(&self, selector: &str, key: &str) -> DriverResult<()> {
		self.site.check_present(selector)?;
		self.site.record(format!("press {selector} {key}"));
		Ok(())
	}

	async fn click(&self, selector: &str) -> DriverResult<()> {
		self.site.check_present(selector)?;
		let mut state = self.site.state.lock();
		if selector == state.submit_button && state.login_succeeds {
			state.authenticated = true;
		}
		state.events.push(format!("click {selector}"));
		Ok(())
	}

	async fn wait_for(&self, selector: &str, _state: WaitState, timeout: Duration) -> DriverResult<()> {
		let missing = self.site.state.lock().missing.contains(selector);
		if missing {
			tokio::time::sleep(timeout).await;
			return Err(DriverError::Timeout {
				selector: selector.to_string(),
				ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
			});
		}
		self.site.record(format!("wait {selector}"));
		Ok(())
	}
}
