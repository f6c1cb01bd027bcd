//! Session reuse and credential login.
//!
//! [`AuthController::ensure_authenticated`] first tries the stored session:
//! it seeds a context, opens the probe page and asks the [`AuthProbe`]
//! whether the visitor is logged in. Only when that fails does it submit
//! credentials, and only a fresh login writes the store.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::driver::{Browser, BrowserContext, DriverError, DriverResult, Page, WaitState};
use crate::error::{Error, Result};
use crate::site::{LoginForm, SiteProfile};
use crate::store::{SessionCredential, SessionStore};

/// Login credentials. `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
	username: String,
	password: String,
}

impl Credentials {
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			username: username.into(),
			password: password.into(),
		}
	}

	pub fn username(&self) -> &str {
		&self.username
	}

	pub fn password(&self) -> &str {
		&self.password
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Authentication progress within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
	NoSession,
	SessionLoaded,
	SessionValid,
	SessionInvalid,
	LoggedInFresh,
}

impl fmt::Display for AuthState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			AuthState::NoSession => "no_session",
			AuthState::SessionLoaded => "session_loaded",
			AuthState::SessionValid => "session_valid",
			AuthState::SessionInvalid => "session_invalid",
			AuthState::LoggedInFresh => "logged_in_fresh",
		};
		f.write_str(name)
	}
}

/// Decides whether the page in front of it belongs to a logged-in visitor.
///
/// This is a heuristic tied to the site's markup; swap it out rather than
/// adding checks elsewhere.
#[async_trait]
pub trait AuthProbe: Send + Sync {
	async fn is_authenticated(&self, page: &dyn Page) -> DriverResult<bool>;
}

/// Logged in unless the page title contains a logged-out marker.
#[derive(Debug, Clone)]
pub struct TitleProbe {
	marker: String,
}

impl TitleProbe {
	pub fn new(marker: impl Into<String>) -> Self {
		Self { marker: marker.into() }
	}
}

#[async_trait]
impl AuthProbe for TitleProbe {
	async fn is_authenticated(&self, page: &dyn Page) -> DriverResult<bool> {
		let title = page.title().await?;
		debug!(target = "tradeflow", title = %title, marker = %self.marker, "probing page title");
		Ok(!title.contains(&self.marker))
	}
}

/// Logged in when the page source contains `marker`, e.g. a logout link
/// that only authenticated visitors see.
#[derive(Debug, Clone)]
pub struct MarkupProbe {
	marker: String,
}

impl MarkupProbe {
	pub fn new(marker: impl Into<String>) -> Self {
		Self { marker: marker.into() }
	}
}

#[async_trait]
impl AuthProbe for MarkupProbe {
	async fn is_authenticated(&self, page: &dyn Page) -> DriverResult<bool> {
		let found = page.content().await?.contains(&self.marker);
		debug!(target = "tradeflow", marker = %self.marker, found, "searching page source");
		Ok(found)
	}
}

/// Clears a one-time popup shown after login.
#[async_trait]
pub trait Interstitial: Send + Sync {
	/// Returns whether something was dismissed. Absence is not an error.
	async fn dismiss(&self, page: &dyn Page) -> DriverResult<bool>;
}

/// Clicks `selector` if it becomes interactable within `timeout`.
#[derive(Debug, Clone)]
pub struct DismissButton {
	selector: String,
	timeout: Duration,
}

impl DismissButton {
	pub fn new(selector: impl Into<String>, timeout: Duration) -> Self {
		Self {
			selector: selector.into(),
			timeout,
		}
	}
}

#[async_trait]
impl Interstitial for DismissButton {
	async fn dismiss(&self, page: &dyn Page) -> DriverResult<bool> {
		match page.wait_for(&self.selector, WaitState::Interactable, self.timeout).await {
			Ok(()) => {
				page.click(&self.selector).await?;
				Ok(true)
			}
			Err(DriverError::Timeout { .. } | DriverError::ElementNotFound(_)) => Ok(false),
			Err(err) => Err(err),
		}
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterstitial;

#[async_trait]
impl Interstitial for NoInterstitial {
	async fn dismiss(&self, _page: &dyn Page) -> DriverResult<bool> {
		Ok(false)
	}
}

/// An authenticated context, positioned at the probe page.
pub struct AuthSession {
	pub credential: SessionCredential,
	pub context: Box<dyn BrowserContext>,
	pub page: Box<dyn Page>,
	/// `SessionValid` or `LoggedInFresh`.
	pub state: AuthState,
	/// Every state passed through, in order.
	pub history: Vec<AuthState>,
}

impl fmt::Debug for AuthSession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AuthSession")
			.field("credential", &self.credential)
			.field("state", &self.state)
			.field("history", &self.history)
			.finish_non_exhaustive()
	}
}

pub struct AuthController<S> {
	store: S,
	form: LoginForm,
	probe_url: String,
	field_timeout: Duration,
	probe: Box<dyn AuthProbe>,
	interstitial: Box<dyn Interstitial>,
}

impl<S: SessionStore> AuthController<S> {
	/// Builds a controller with the profile's dismiss button. Authentication
	/// is judged by `logged_in_marker` in the page source when the profile
	/// sets one, otherwise by the title.
	pub fn new(store: S, site: &SiteProfile) -> Self {
		let probe: Box<dyn AuthProbe> = match &site.logged_in_marker {
			Some(marker) => Box::new(MarkupProbe::new(marker.clone())),
			None => Box::new(TitleProbe::new(site.logged_out_marker.clone())),
		};
		let interstitial: Box<dyn Interstitial> = match &site.interstitial_dismiss {
			Some(selector) => Box::new(DismissButton::new(selector.clone(), site.timeouts.interstitial())),
			None => Box::new(NoInterstitial),
		};

		Self {
			store,
			form: site.login.clone(),
			probe_url: site.probe_url.clone(),
			field_timeout: site.timeouts.login(),
			probe,
			interstitial,
		}
	}

	pub fn with_probe(mut self, probe: impl AuthProbe + 'static) -> Self {
		self.probe = Box::new(probe);
		self
	}

	pub fn with_interstitial(mut self, interstitial: impl Interstitial + 'static) -> Self {
		self.interstitial = Box::new(interstitial);
		self
	}

	pub fn store(&self) -> &S {
		&self.store
	}

	pub fn probe_url(&self) -> &str {
		&self.probe_url
	}

	/// Returns an authenticated context in `browser`, reusing the stored
	/// session when the probe accepts it.
	///
	/// A stored session that cannot be restored or probed counts as rejected.
	/// The store is written only after a fresh credential login. If the probe
	/// still reports logged out after that login, fails with
	/// [`Error::AuthenticationFailed`]; there is no retry.
	pub async fn ensure_authenticated(&self, credentials: &Credentials, browser: &dyn Browser) -> Result<AuthSession> {
		let mut history = Vec::new();

		match self.store.load() {
			Some(credential) => {
				history.push(AuthState::SessionLoaded);
				info!(target = "tradeflow", cookies = credential.state.cookies.len(), probe = %self.probe_url, "probing stored session");

				match self.resume(&credential, browser).await {
					Ok(Some((context, page))) => {
						history.push(AuthState::SessionValid);
						info!(target = "tradeflow", "stored session is still valid");
						return Ok(AuthSession {
							credential,
							context,
							page,
							state: AuthState::SessionValid,
							history,
						});
					}
					Ok(None) => warn!(target = "tradeflow", "stored session was rejected, logging in again"),
					Err(err) => warn!(target = "tradeflow", error = %err, "stored session could not be restored, logging in again"),
				}
				history.push(AuthState::SessionInvalid);
			}
			None => {
				history.push(AuthState::NoSession);
				info!(target = "tradeflow", "no stored session, logging in");
			}
		}

		let (context, page) = self.login(credentials, browser).await?;
		let credential = SessionCredential::captured(context.export_state().await?);
		if let Err(err) = self.store.save(&credential) {
			error!(target = "tradeflow", error = %err, "failed to persist session");
			return Err(err);
		}

		history.push(AuthState::LoggedInFresh);
		info!(
			target = "tradeflow",
			cookies = credential.state.cookies.len(),
			origins = credential.state.origins.len(),
			"logged in and saved session"
		);

		Ok(AuthSession {
			credential,
			context,
			page,
			state: AuthState::LoggedInFresh,
			history,
		})
	}

	/// Seeds a context with `credential` and probes it. `None` means the
	/// site no longer accepts the session.
	async fn resume(&self, credential: &SessionCredential, browser: &dyn Browser) -> DriverResult<Option<(Box<dyn BrowserContext>, Box<dyn Page>)>> {
		let context = browser.new_context(Some(&credential.state)).await?;
		let page = context.new_page().await?;
		page.goto(&self.probe_url).await?;

		if self.probe.is_authenticated(page.as_ref()).await? {
			Ok(Some((context, page)))
		} else {
			Ok(None)
		}
	}

	async fn login(&self, credentials: &Credentials, browser: &dyn Browser) -> Result<(Box<dyn BrowserContext>, Box<dyn Page>)> {
		let context = browser.new_context(None).await?;
		let page = context.new_page().await?;
		let form = &self.form;

		info!(target = "tradeflow", username = credentials.username(), url = %form.url, "submitting credentials");
		page.goto(&form.url).await?;
		page.wait_for(&form.username_input, WaitState::Attached, self.field_timeout).await?;
		page.fill(&form.username_input, credentials.username()).await?;
		page.fill(&form.password_input, credentials.password()).await?;
		page.click(&form.submit_button).await?;

		page.goto(&self.probe_url).await?;
		if self.interstitial.dismiss(page.as_ref()).await? {
			debug!(target = "tradeflow", "dismissed post-login interstitial");
		}

		if !self.probe.is_authenticated(page.as_ref()).await? {
			let title = page.title().await.unwrap_or_default();
			return Err(Error::AuthenticationFailed {
				probe_url: self.probe_url.clone(),
				reason: format!("still logged out after submitting credentials (title {title:?})"),
			});
		}

		Ok((context, page))
	}
}
