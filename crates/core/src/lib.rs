//! tradeflow: session lifecycle and order-entry automation for a web trading platform.
//!
//! The crate drives a browser through the seams in [`driver`]; it never talks
//! to a browser engine itself. A run looks like:
//!
//! ```ignore
//! use tradeflow::{AuthController, Credentials, FileSessionStore, SiteProfile, TradeOrder, WorkflowRunner};
//!
//! let site = SiteProfile::default();
//! let auth = AuthController::new(FileSessionStore::new("session.json"), &site);
//! let runner = WorkflowRunner::new(launcher, auth, site);
//!
//! let order = TradeOrder::parse("AAPL", "Buy", 10, "Market")?;
//! let report = runner.run(&Credentials::new("user", "secret"), &order, Market::Equities).await?;
//! assert!(report.receipt.placed);
//! ```
//!
//! Modules, leaves first:
//!
//! - [`driver`]: browser seams ([`BrowserLauncher`], [`Browser`], [`BrowserContext`], [`Page`])
//! - [`store`]: [`SessionStore`] persistence of [`SessionCredential`]s
//! - [`auth`]: [`AuthController`] session reuse and credential login
//! - [`workflow`]: [`OrderWorkflow`] order-entry state machine
//! - [`runner`]: [`WorkflowRunner`] orchestration with guaranteed browser release

pub mod auth;
pub mod cancel;
pub mod driver;
pub mod error;
pub mod order;
pub mod runner;
pub mod site;
pub mod store;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthController, AuthProbe, AuthSession, AuthState, Credentials, DismissButton, Interstitial, MarkupProbe, NoInterstitial, TitleProbe};
pub use cancel::{CancelHandle, CancelSignal};
pub use driver::{Browser, BrowserContext, BrowserLauncher, DriverError, DriverResult, LaunchOptions, Page, WaitState};
pub use error::{Error, Result};
pub use order::{Action, OrderType, TradeOrder};
pub use runner::{AuthReport, RunReport, WorkflowRunner};
pub use site::{ControlBinding, LoginForm, Market, OrderSelectors, SiteProfile, StepTimeouts};
pub use store::{CredentialSource, FileSessionStore, MemorySessionStore, SessionCredential, SessionStore};
pub use tradeflow_protocol::StorageState;
pub use workflow::{OrderWorkflow, Receipt, WorkflowState, WorkflowStep};

/// Seconds since the unix epoch, saturating to 0 on clock skew.
pub(crate) fn unix_now() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}
