//! W3C WebDriver wire envelopes.
//!
//! Every WebDriver response wraps its payload in `{"value": ...}`. Errors use
//! the same envelope with an object carrying `error` and `message`.
//!
//! # Main Types
//!
//! - [`Envelope`] - response wrapper
//! - [`WireError`] - error payload
//! - [`NewSession`] - `POST /session` result
//! - [`ElementRef`] - web element reference
//! - [`WebDriverCookie`] - cookie format with conversion to [`Cookie`]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::storage::{Cookie, SameSite};

/// Key under which WebDriver returns element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Unicode private-use code points WebDriver maps to special keys.
pub mod keys {
	pub const ENTER: &str = "\u{E007}";
	pub const TAB: &str = "\u{E004}";
	pub const ESCAPE: &str = "\u{E00C}";

	/// Maps a Playwright-style key name to its WebDriver code point.
	///
	/// Unknown names are sent verbatim, which types them as text.
	pub fn code_for(name: &str) -> &str {
		match name {
			"Enter" => ENTER,
			"Tab" => TAB,
			"Escape" => ESCAPE,
			other => other,
		}
	}
}

/// Response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
	pub value: T,
}

/// Error payload returned with a non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
	/// Error code, e.g. `"no such element"`
	pub error: String,
	#[serde(default)]
	pub message: String,
}

impl WireError {
	pub fn is_no_such_element(&self) -> bool {
		self.error == "no such element"
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self.error.as_str(), "timeout" | "script timeout")
	}

	/// Parses an error envelope, if the body is one.
	pub fn from_body(body: &Value) -> Option<Self> {
		let value = body.get("value")?;
		value.get("error")?;
		serde_json::from_value(value.clone()).ok()
	}
}

/// Result of `POST /session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
	pub session_id: String,
	#[serde(default)]
	pub capabilities: Value,
}

/// Reference to a DOM element within a WebDriver session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
	#[serde(rename = "element-6066-11e4-a52e-4f735466cecf")]
	pub id: String,
}

/// Browser engine requested from the WebDriver endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
	#[default]
	Chrome,
	Firefox,
}

impl BrowserKind {
	/// Capabilities body for `POST /session`.
	pub fn capabilities(self, headless: bool) -> Value {
		let always_match = match self {
			BrowserKind::Chrome => {
				let mut args = vec!["--no-first-run", "--no-default-browser-check"];
				if headless {
					args.push("--headless=new");
				}
				json!({ "browserName": "chrome", "goog:chromeOptions": { "args": args } })
			}
			BrowserKind::Firefox => {
				let args: Vec<&str> = if headless { vec!["-headless"] } else { Vec::new() };
				json!({ "browserName": "firefox", "moz:firefoxOptions": { "args": args } })
			}
		};
		json!({ "capabilities": { "alwaysMatch": always_match } })
	}
}

impl fmt::Display for BrowserKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BrowserKind::Chrome => write!(f, "chrome"),
			BrowserKind::Firefox => write!(f, "firefox"),
		}
	}
}

impl FromStr for BrowserKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"chrome" | "chromium" => Ok(BrowserKind::Chrome),
			"firefox" => Ok(BrowserKind::Firefox),
			_ => Err(format!("unknown browser: {s}")),
		}
	}
}

/// Cookie as exchanged over WebDriver.
///
/// Differs from [`Cookie`] in naming (`expiry` is integral seconds) and in
/// making path/domain/flags mandatory on responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebDriverCookie {
	pub name: String,
	pub value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub secure: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub http_only: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expiry: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub same_site: Option<String>,
}

impl WebDriverCookie {
	/// Converts to the persisted [`Cookie`] format (session cookies get `-1`).
	pub fn to_storage_cookie(&self) -> Cookie {
		Cookie {
			name: self.name.clone(),
			value: self.value.clone(),
			domain: self.domain.clone(),
			path: self.path.clone(),
			expires: Some(self.expiry.map(|e| e as f64).unwrap_or(-1.0)),
			http_only: self.http_only,
			secure: self.secure,
			same_site: self.same_site.as_deref().map(parse_same_site),
		}
	}
}

impl From<&Cookie> for WebDriverCookie {
	fn from(cookie: &Cookie) -> Self {
		Self {
			name: cookie.name.clone(),
			value: cookie.value.clone(),
			path: cookie.path.clone(),
			domain: cookie.domain.clone(),
			secure: cookie.secure,
			http_only: cookie.http_only,
			expiry: cookie.expires.filter(|ts| *ts >= 0.0).map(|ts| ts as u64),
			same_site: cookie.same_site.map(|s| same_site_name(s).to_string()),
		}
	}
}

fn same_site_name(value: SameSite) -> &'static str {
	match value {
		SameSite::None => "None",
		SameSite::Lax => "Lax",
		SameSite::Strict => "Strict",
	}
}

fn parse_same_site(value: &str) -> SameSite {
	match value.to_ascii_lowercase().as_str() {
		"strict" => SameSite::Strict,
		"none" => SameSite::None,
		_ => SameSite::Lax,
	}
}
