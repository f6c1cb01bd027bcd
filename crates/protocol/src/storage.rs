//! Cookie and storage state types for session persistence.
//!
//! These types describe the authentication state of a browser context: its
//! cookies and per-origin localStorage. The JSON layout matches Playwright's
//! `storageState` files.

use serde::{Deserialize, Serialize};

/// SameSite cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
	/// Sent with same-site and cross-site requests
	#[serde(rename = "None")]
	None,
	/// Sent with same-site requests and cross-site top-level navigations
	#[default]
	#[serde(rename = "Lax")]
	Lax,
	/// Only sent with same-site requests
	#[serde(rename = "Strict")]
	Strict,
}

/// A browser cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,

	pub value: String,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,

	/// Unix timestamp in seconds (-1 means session cookie)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires: Option<f64>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub http_only: Option<bool>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub secure: Option<bool>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub same_site: Option<SameSite>,
}

impl Cookie {
	/// Creates a cookie scoped to `domain`.
	pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: Some(domain.into()),
			path: None,
			expires: None,
			http_only: None,
			secure: None,
			same_site: None,
		}
	}

	pub fn path(mut self, path: impl Into<String>) -> Self {
		self.path = Some(path.into());
		self
	}

	pub fn expires(mut self, expires: f64) -> Self {
		self.expires = Some(expires);
		self
	}

	pub fn http_only(mut self, http_only: bool) -> Self {
		self.http_only = Some(http_only);
		self
	}

	pub fn secure(mut self, secure: bool) -> Self {
		self.secure = Some(secure);
		self
	}

	pub fn same_site(mut self, same_site: SameSite) -> Self {
		self.same_site = Some(same_site);
		self
	}

	/// Returns true for cookies without a positive expiry.
	pub fn is_session(&self) -> bool {
		self.expires.is_none_or(|ts| ts < 0.0)
	}

	/// Host the cookie belongs to, without the leading domain-cookie dot.
	pub fn host(&self) -> Option<&str> {
		self.domain.as_deref().map(|d| d.trim_start_matches('.')).filter(|d| !d.is_empty())
	}
}

/// A localStorage entry within an origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStorageEntry {
	pub name: String,
	pub value: String,
}

/// Storage state for a single origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
	/// Origin URL, e.g. `https://www.example.com`
	pub origin: String,
	#[serde(default)]
	pub local_storage: Vec<LocalStorageEntry>,
}

/// Complete browser storage state.
///
/// Contains all cookies and localStorage data needed to restore an
/// authenticated context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
	#[serde(default)]
	pub cookies: Vec<Cookie>,
	#[serde(default)]
	pub origins: Vec<OriginState>,
}

impl StorageState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_cookies(cookies: Vec<Cookie>) -> Self {
		Self {
			cookies,
			origins: Vec::new(),
		}
	}

	/// True when the state carries neither cookies nor localStorage.
	pub fn is_empty(&self) -> bool {
		self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
	}

	/// Distinct cookie hosts, in first-seen order.
	pub fn cookie_hosts(&self) -> Vec<&str> {
		let mut hosts: Vec<&str> = Vec::new();
		for host in self.cookies.iter().filter_map(Cookie::host) {
			if !hosts.contains(&host) {
				hosts.push(host);
			}
		}
		hosts
	}

	/// Loads storage state from a JSON file.
	pub fn from_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
		let content = std::fs::read_to_string(path)?;
		serde_json::from_str(&content).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
	}

	/// Serializes to pretty JSON.
	pub fn to_json_pretty(&self) -> serde_json::Result<String> {
		serde_json::to_string_pretty(self)
	}
}
