//! [`Page`] over a WebDriver session's current window.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::trace;
use tradeflow::{DriverError, DriverResult, Page, WaitState};
use tradeflow_protocol::webdriver::keys;

use crate::connection::Session;
use crate::error::Result;

pub struct WebDriverPage {
	session: Arc<Session>,
	poll_interval: Duration,
}

impl WebDriverPage {
	pub(crate) fn new(session: Arc<Session>, poll_interval: Duration) -> Self {
		Self { session, poll_interval }
	}

	async fn element(&self, selector: &str) -> DriverResult<String> {
		self.session
			.find(selector)
			.await?
			.ok_or_else(|| DriverError::ElementNotFound(selector.to_string()))
	}

	async fn reached(&self, selector: &str, state: WaitState) -> Result<bool> {
		let Some(element) = self.session.find(selector).await? else {
			return Ok(false);
		};
		match state {
			WaitState::Attached => Ok(true),
			WaitState::Interactable => Ok(self.session.is_displayed(&element).await? && self.session.is_enabled(&element).await?),
		}
	}
}

#[async_trait]
impl Page for WebDriverPage {
	async fn goto(&self, url: &str) -> DriverResult<()> {
		self.session.navigate(url).await.map_err(|err| DriverError::Navigation {
			url: url.to_string(),
			message: err.to_string(),
		})
	}

	async fn url(&self) -> DriverResult<String> {
		Ok(self.session.current_url().await?)
	}

	async fn title(&self) -> DriverResult<String> {
		Ok(self.session.title().await?)
	}

	async fn content(&self) -> DriverResult<String> {
		Ok(self.session.source().await?)
	}

	async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
		let element = self.element(selector).await?;
		self.session.clear(&element).await?;
		if !value.is_empty() {
			self.session.send_keys(&element, value).await?;
		}
		Ok(())
	}

	async fn type_text(&self, selector: &str, text: &str) -> DriverResult<()> {
		let element = self.element(selector).await?;
		self.session.send_keys(&element, text).await?;
		Ok(())
	}

	async fn press(&self, selector: &str, key: &str) -> DriverResult<()> {
		let element = self.element(selector).await?;
		self.session.send_keys(&element, keys::code_for(key)).await?;
		Ok(())
	}

	async fn click(&self, selector: &str) -> DriverResult<()> {
		let element = self.element(selector).await?;
		self.session.click(&element).await?;
		Ok(())
	}

	async fn wait_for(&self, selector: &str, state: WaitState, timeout: Duration) -> DriverResult<()> {
		let deadline = Instant::now() + timeout;
		loop {
			match self.reached(selector, state).await {
				Ok(true) => return Ok(()),
				Ok(false) => {}
				Err(err) if err.is_stale() => {}
				Err(err) => return Err(err.into()),
			}

			let now = Instant::now();
			if now >= deadline {
				return Err(DriverError::Timeout {
					selector: selector.to_string(),
					ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
				});
			}
			trace!(target = "tradeflow", selector, ?state, "waiting for element");
			tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
		}
	}
}
