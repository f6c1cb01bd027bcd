//! One run: launch, authenticate, place an order, release.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::{AuthController, AuthState, Credentials};
use crate::cancel::CancelSignal;
use crate::driver::{Browser, BrowserLauncher, LaunchOptions, urls_match};
use crate::error::{Error, Result};
use crate::order::TradeOrder;
use crate::site::{Market, SiteProfile};
use crate::store::SessionStore;
use crate::workflow::{OrderWorkflow, Receipt, WorkflowState};

/// Result of [`WorkflowRunner::run`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
	pub auth_state: AuthState,
	pub auth_history: Vec<AuthState>,
	pub receipt: Receipt,
	pub trail: Vec<WorkflowState>,
}

/// Result of [`WorkflowRunner::login`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthReport {
	pub state: AuthState,
	pub history: Vec<AuthState>,
	pub cookies: usize,
	pub origins: usize,
	pub probe_url: String,
}

/// Owns the browser for the duration of a run and closes it on every exit
/// path. Errors from authentication or order entry are returned unchanged.
pub struct WorkflowRunner<S> {
	launcher: Box<dyn BrowserLauncher>,
	auth: AuthController<S>,
	site: SiteProfile,
	launch: LaunchOptions,
	cancel: Option<CancelSignal>,
}

impl<S: SessionStore> WorkflowRunner<S> {
	pub fn new(launcher: impl BrowserLauncher + 'static, auth: AuthController<S>, site: SiteProfile) -> Self {
		Self {
			launcher: Box::new(launcher),
			auth,
			site,
			launch: LaunchOptions::default(),
			cancel: None,
		}
	}

	pub fn with_launch_options(mut self, launch: LaunchOptions) -> Self {
		self.launch = launch;
		self
	}

	pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
		self.cancel = Some(signal);
		self
	}

	pub fn auth(&self) -> &AuthController<S> {
		&self.auth
	}

	/// Authenticates and places `order` on the `market` order page.
	pub async fn run(&self, credentials: &Credentials, order: &TradeOrder, market: Market) -> Result<RunReport> {
		self.checkpoint("launch")?;
		let browser = self.launcher.launch(self.launch).await?;
		info!(target = "tradeflow", order = %order, market = %market, headless = self.launch.headless, "browser launched");

		let outcome = self.place(browser.as_ref(), credentials, order, market).await;
		release(browser, outcome).await
	}

	/// Authenticates only, refreshing the stored session when needed.
	pub async fn login(&self, credentials: &Credentials) -> Result<AuthReport> {
		self.checkpoint("launch")?;
		let browser = self.launcher.launch(self.launch).await?;
		debug!(target = "tradeflow", headless = self.launch.headless, "browser launched");

		let outcome = self.authenticate(browser.as_ref(), credentials).await;
		release(browser, outcome).await
	}

	async fn place(&self, browser: &dyn Browser, credentials: &Credentials, order: &TradeOrder, market: Market) -> Result<RunReport> {
		let session = self.auth.ensure_authenticated(credentials, browser).await?;
		self.checkpoint("order entry")?;

		let target = self.site.order_page(market);
		let current = session.page.url().await?;
		if !urls_match(&current, target) {
			debug!(target = "tradeflow", from = %current, to = %target, "navigating to order page");
			session.page.goto(target).await?;
		}

		let mut workflow = OrderWorkflow::from_profile(session.page.as_ref(), &self.site);
		if let Some(signal) = &self.cancel {
			workflow = workflow.with_cancel(signal.clone());
		}
		let receipt = workflow.execute(order).await?;

		Ok(RunReport {
			auth_state: session.state,
			auth_history: session.history.clone(),
			receipt,
			trail: workflow.trail().to_vec(),
		})
	}

	async fn authenticate(&self, browser: &dyn Browser, credentials: &Credentials) -> Result<AuthReport> {
		let session = self.auth.ensure_authenticated(credentials, browser).await?;
		let state = &session.credential.state;

		Ok(AuthReport {
			state: session.state,
			history: session.history.clone(),
			cookies: state.cookies.len(),
			origins: state.origins.len(),
			probe_url: self.auth.probe_url().to_string(),
		})
	}

	fn checkpoint(&self, stage: &str) -> Result<()> {
		if self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled) {
			return Err(Error::Cancelled(stage.to_string()));
		}
		Ok(())
	}
}

/// Closes `browser` whatever `outcome` is. A close failure only surfaces when
/// there is no earlier error to report.
async fn release<T>(browser: Box<dyn Browser>, outcome: Result<T>) -> Result<T> {
	let closed = browser.close().await;
	match (outcome, closed) {
		(Ok(value), Ok(())) => {
			debug!(target = "tradeflow", "browser released");
			Ok(value)
		}
		(Ok(_), Err(err)) => Err(err.into()),
		(Err(err), Ok(())) => {
			debug!(target = "tradeflow", error = %err, "browser released after failure");
			Err(err)
		}
		(Err(err), Err(close_err)) => {
			warn!(target = "tradeflow", error = %close_err, "failed to close browser after error");
			Err(err)
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use async_trait::async_trait;

	use super::*;
	use crate::auth::AuthProbe;
	use crate::cancel::CancelHandle;
	use crate::driver::{DriverError, DriverResult, Page};
	use crate::order::{Action, OrderType};
	use crate::store::MemorySessionStore;
	use crate::testing::{FakeSite, stored_state};
	use crate::workflow::WorkflowStep;

	fn runner(site: &FakeSite, store: Arc<MemorySessionStore>) -> WorkflowRunner<Arc<MemorySessionStore>> {
		let profile = SiteProfile::default();
		let auth = AuthController::new(store, &profile);
		WorkflowRunner::new(site.launcher(), auth, profile)
	}

	fn aapl() -> TradeOrder {
		TradeOrder::new("AAPL", Action::Buy, 10, OrderType::Market).unwrap()
	}

	fn creds() -> Credentials {
		Credentials::new("trader", "hunter2")
	}

	#[tokio::test(start_paused = true)]
	async fn successful_run_confirms_and_releases() {
		let site = FakeSite::new();
		let report = runner(&site, Arc::new(MemorySessionStore::with_state(stored_state())))
			.run(&creds(), &aapl(), Market::Equities)
			.await
			.unwrap();

		assert!(report.receipt.placed);
		assert_eq!(report.auth_state, AuthState::SessionValid);
		assert_eq!(report.trail.last(), Some(&WorkflowState::Confirmed));
		let state = site.state();
		assert_eq!((state.launches, state.closes), (1, 1));
		assert_eq!(state.events.last().map(String::as_str), Some("close"));
	}

	#[tokio::test(start_paused = true)]
	async fn navigates_only_when_order_page_differs() {
		let site = FakeSite::new();
		runner(&site, Arc::new(MemorySessionStore::with_state(stored_state())))
			.run(&creds(), &aapl(), Market::Crypto)
			.await
			.unwrap();

		let gotos: Vec<_> = site.events().into_iter().filter(|e| e.starts_with("goto ")).collect();
		assert_eq!(
			gotos,
			["goto https://www.stocktrak.com/trading/equities", "goto https://www.stocktrak.com/trading/crypto"]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn releases_browser_when_authentication_fails() {
		let site = FakeSite::new().with(|s| s.login_succeeds = false);
		let store = Arc::new(MemorySessionStore::new());

		let err = runner(&site, store.clone()).run(&creds(), &aapl(), Market::Equities).await.unwrap_err();

		assert!(matches!(err, Error::AuthenticationFailed { .. }));
		assert_eq!(site.state().closes, 1);
		assert_eq!(store.save_count(), 0);
		assert!(!site.events().iter().any(|e| e.contains("#tbSymbol")));
	}

	#[tokio::test(start_paused = true)]
	async fn releases_browser_when_workflow_fails() {
		let site = FakeSite::new().with(|s| {
			s.missing.insert("#btnPlaceOrder".into());
		});

		let err = runner(&site, Arc::new(MemorySessionStore::with_state(stored_state())))
			.run(&creds(), &aapl(), Market::Equities)
			.await
			.unwrap_err();

		assert_eq!(err.step(), Some(WorkflowStep::Confirm));
		assert!(matches!(err.root(), Error::StepTimeout { .. }));
		assert_eq!(site.state().closes, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn close_failure_does_not_mask_run_error() {
		let site = FakeSite::new().with(|s| {
			s.login_succeeds = false;
			s.fail_close = true;
		});

		let err = runner(&site, Arc::new(MemorySessionStore::new())).run(&creds(), &aapl(), Market::Equities).await.unwrap_err();

		assert!(matches!(err, Error::AuthenticationFailed { .. }));
		assert_eq!(site.state().closes, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn close_failure_after_success_is_reported() {
		let site = FakeSite::new().with(|s| s.fail_close = true);

		let err = runner(&site, Arc::new(MemorySessionStore::with_state(stored_state())))
			.run(&creds(), &aapl(), Market::Equities)
			.await
			.unwrap_err();

		assert!(matches!(err, Error::Driver(DriverError::Closed(_))));
	}

	#[tokio::test(start_paused = true)]
	async fn launch_failure_propagates_without_close() {
		let site = FakeSite::new().with(|s| s.fail_launch = true);

		let err = runner(&site, Arc::new(MemorySessionStore::new())).run(&creds(), &aapl(), Market::Equities).await.unwrap_err();

		assert!(matches!(err, Error::Driver(DriverError::Launch(_))));
		assert_eq!(site.state().closes, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_before_start_skips_launch() {
		let site = FakeSite::new();
		let handle = CancelHandle::new();
		handle.cancel();

		let err = runner(&site, Arc::new(MemorySessionStore::new()))
			.with_cancel(handle.signal())
			.run(&creds(), &aapl(), Market::Equities)
			.await
			.unwrap_err();

		assert!(err.is_cancelled());
		assert_eq!(site.state().launches, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_during_auth_releases_browser() {
		struct CancellingProbe(Arc<CancelHandle>);

		#[async_trait]
		impl AuthProbe for CancellingProbe {
			async fn is_authenticated(&self, _page: &dyn Page) -> DriverResult<bool> {
				self.0.cancel();
				Ok(true)
			}
		}

		let site = FakeSite::new();
		let handle = Arc::new(CancelHandle::new());
		let profile = SiteProfile::default();
		let auth = AuthController::new(Arc::new(MemorySessionStore::with_state(stored_state())), &profile).with_probe(CancellingProbe(handle.clone()));
		let runner = WorkflowRunner::new(site.launcher(), auth, profile).with_cancel(handle.signal());

		let err = runner.run(&creds(), &aapl(), Market::Equities).await.unwrap_err();

		assert!(err.is_cancelled());
		assert_eq!(site.state().closes, 1);
		assert!(!site.events().iter().any(|e| e.contains("#tbSymbol")));
	}

	#[tokio::test(start_paused = true)]
	async fn login_reports_captured_state() {
		let site = FakeSite::new();
		let store = Arc::new(MemorySessionStore::new());

		let report = runner(&site, store.clone()).login(&creds()).await.unwrap();

		assert_eq!(report.state, AuthState::LoggedInFresh);
		assert_eq!(report.cookies, 1);
		assert_eq!(store.save_count(), 1);
		assert_eq!(site.state().closes, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn headed_launch_is_forwarded() {
		let site = FakeSite::new();
		runner(&site, Arc::new(MemorySessionStore::with_state(stored_state())))
			.with_launch_options(LaunchOptions { headless: false })
			.login(&creds())
			.await
			.unwrap();

		assert_eq!(site.events()[0], "launch headless=false");
	}
}
