//! Selectors, URLs and timeouts describing the target site.
//!
//! The site's markup is not a stable contract, so nothing in the workflow
//! hardcodes a selector: everything is read from a [`SiteProfile`]. Defaults
//! match the StockTrak order ticket and can be overridden field by field from
//! configuration (every struct is `#[serde(default)]`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::order::{Action, OrderType};
use crate::workflow::WorkflowStep;

/// How a ticket option is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlBinding {
	/// Preselected by the site; no interaction needed.
	Default,
	/// Selected by clicking the control matching this selector.
	Click(String),
}

/// Order-entry page flavor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
	#[default]
	Equities,
	Crypto,
}

impl fmt::Display for Market {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Market::Equities => write!(f, "equities"),
			Market::Crypto => write!(f, "crypto"),
		}
	}
}

impl FromStr for Market {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"equities" | "equity" | "stocks" => Ok(Market::Equities),
			"crypto" => Ok(Market::Crypto),
			_ => Err(format!("unknown market: {s}")),
		}
	}
}

/// Credential form on the login page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginForm {
	pub url: String,
	pub username_input: String,
	pub password_input: String,
	pub submit_button: String,
}

impl Default for LoginForm {
	fn default() -> Self {
		Self {
			url: "https://www.stocktrak.com/login".into(),
			username_input: "input#tbLoginUserName".into(),
			password_input: "input#Password".into(),
			submit_button: "button.button.secondary.margin-0".into(),
		}
	}
}

/// Controls of the order ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderSelectors {
	pub symbol_input: String,
	pub quantity_input: String,
	/// Clicked after text input to blur the field and fire change handlers.
	pub defocus: String,
	pub actions: BTreeMap<Action, ControlBinding>,
	pub order_types: BTreeMap<OrderType, ControlBinding>,
	pub review_button: String,
	pub confirm_button: String,
}

impl Default for OrderSelectors {
	fn default() -> Self {
		let actions = BTreeMap::from([
			(Action::Buy, ControlBinding::Default),
			(Action::Sell, ControlBinding::Click("#sell-order".into())),
			(Action::Short, ControlBinding::Click("#short-order".into())),
			(Action::Cover, ControlBinding::Click("#cover-order".into())),
		]);
		let order_types = BTreeMap::from([
			(OrderType::Market, ControlBinding::Default),
			(OrderType::Limit, ControlBinding::Click("input[type='radio'][value='limit']".into())),
			(OrderType::Stop, ControlBinding::Click("input[type='radio'][value='stop']".into())),
		]);

		Self {
			symbol_input: "#tbSymbol".into(),
			quantity_input: "#tbQuantity".into(),
			defocus: "body".into(),
			actions,
			order_types,
			review_button: "#btnPreviewOrder".into(),
			confirm_button: "#btnPlaceOrder".into(),
		}
	}
}

/// Wait budgets, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StepTimeouts {
	/// Symbol/quantity fields and action/order-type controls.
	pub field_ms: u64,
	pub review_ms: u64,
	pub confirm_ms: u64,
	/// Login form fields.
	pub login_ms: u64,
	/// How long to look for the post-login interstitial before assuming none.
	pub interstitial_ms: u64,
}

impl Default for StepTimeouts {
	fn default() -> Self {
		Self {
			field_ms: 10_000,
			review_ms: 5_000,
			confirm_ms: 5_000,
			login_ms: 15_000,
			interstitial_ms: 3_000,
		}
	}
}

impl StepTimeouts {
	pub fn for_step(&self, step: WorkflowStep) -> Duration {
		let ms = match step {
			WorkflowStep::Review => self.review_ms,
			WorkflowStep::Confirm => self.confirm_ms,
			WorkflowStep::SelectSymbol | WorkflowStep::SelectAction | WorkflowStep::EnterQuantity | WorkflowStep::SelectOrderType => self.field_ms,
		};
		Duration::from_millis(ms)
	}

	pub fn login(&self) -> Duration {
		Duration::from_millis(self.login_ms)
	}

	pub fn interstitial(&self) -> Duration {
		Duration::from_millis(self.interstitial_ms)
	}
}

/// Everything the automation needs to know about the target site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteProfile {
	pub login: LoginForm,
	/// Post-login page used to test whether a session is authenticated.
	pub probe_url: String,
	/// Page title fragment shown only to logged-out visitors.
	pub logged_out_marker: String,
	/// Markup fragment present only for logged-in visitors. When set, the
	/// page source is searched for it instead of checking the title.
	pub logged_in_marker: Option<String>,
	/// Dismiss button of the one-time popup shown after login.
	pub interstitial_dismiss: Option<String>,
	pub order_pages: BTreeMap<Market, String>,
	pub order: OrderSelectors,
	pub timeouts: StepTimeouts,
}

impl Default for SiteProfile {
	fn default() -> Self {
		Self {
			login: LoginForm::default(),
			probe_url: "https://www.stocktrak.com/trading/equities".into(),
			logged_out_marker: "Login".into(),
			logged_in_marker: None,
			interstitial_dismiss: Some("button.secondary-btn".into()),
			order_pages: BTreeMap::from([
				(Market::Equities, "https://www.stocktrak.com/trading/equities".into()),
				(Market::Crypto, "https://www.stocktrak.com/trading/crypto".into()),
			]),
			order: OrderSelectors::default(),
			timeouts: StepTimeouts::default(),
		}
	}
}

impl SiteProfile {
	/// Order-entry page for `market`, falling back to the probe page.
	pub fn order_page(&self, market: Market) -> &str {
		self.order_pages.get(&market).map(String::as_str).unwrap_or(&self.probe_url)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn buy_and_market_need_no_interaction() {
		let selectors = OrderSelectors::default();
		assert_eq!(selectors.actions[&Action::Buy], ControlBinding::Default);
		assert_eq!(selectors.order_types[&OrderType::Market], ControlBinding::Default);
		for action in Action::ALL {
			assert!(selectors.actions.contains_key(&action), "{action} missing from defaults");
		}
	}

	#[test]
	fn partial_override_keeps_defaults() {
		let json = r##"{"probeUrl": "https://example.test/home", "order": {"reviewButton": "#preview"}, "timeouts": {"reviewMs": 8000}}"##;
		let site: SiteProfile = serde_json::from_str(json).unwrap();

		assert_eq!(site.probe_url, "https://example.test/home");
		assert_eq!(site.order.review_button, "#preview");
		assert_eq!(site.order.confirm_button, "#btnPlaceOrder");
		assert_eq!(site.timeouts.for_step(WorkflowStep::Review), Duration::from_millis(8000));
		assert_eq!(site.timeouts.for_step(WorkflowStep::Confirm), Duration::from_millis(5000));
		assert_eq!(site.login, LoginForm::default());
	}

	#[test]
	fn control_bindings_use_snake_case_tags() {
		let json = r##"{"actions": {"Buy": "default", "Sell": {"click": "#sell"}}}"##;
		let selectors: OrderSelectors = serde_json::from_str(json).unwrap();
		assert_eq!(selectors.actions.len(), 2);
		assert_eq!(selectors.actions[&Action::Sell], ControlBinding::Click("#sell".into()));
	}

	#[test]
	fn order_page_falls_back_to_probe() {
		let mut site = SiteProfile::default();
		assert!(site.order_page(Market::Crypto).ends_with("/trading/crypto"));

		site.order_pages.clear();
		assert_eq!(site.order_page(Market::Crypto), site.probe_url);
	}

	#[test]
	fn market_parses_aliases() {
		assert_eq!("Stocks".parse::<Market>().unwrap(), Market::Equities);
		assert!("forex".parse::<Market>().is_err());
	}
}
