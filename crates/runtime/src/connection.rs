//! HTTP transport and per-session commands of the W3C WebDriver protocol.
//!
//! [`Connection`] speaks JSON over HTTP to a WebDriver endpoint and unwraps
//! the `{"value": ...}` envelope. [`Session`] scopes commands to one
//! `/session/{id}` and gives each endpoint a typed method.

use std::time::Duration;

use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, info};
use tradeflow_protocol::webdriver::{ElementRef, NewSession, WebDriverCookie, WireError};
use url::Url;

use crate::error::{Error, Result};

/// Upper bound for a single WebDriver command. Waits are polled, so no
/// command is expected to block for long.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client bound to a WebDriver endpoint.
#[derive(Debug, Clone)]
pub struct Connection {
	http: reqwest::Client,
	base: Url,
}

impl Connection {
	pub fn new(endpoint: &str) -> Result<Self> {
		let mut base = Url::parse(endpoint).map_err(|source| Error::InvalidUrl {
			url: endpoint.to_string(),
			source,
		})?;
		// `Url::join` replaces the last segment unless the base ends in '/'.
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());
			base.set_path(&path);
		}

		let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
		Ok(Self { http, base })
	}

	pub fn endpoint(&self) -> &Url {
		&self.base
	}

	pub(crate) fn url_for(&self, path: &str) -> Result<Url> {
		self.base.join(path).map_err(|source| Error::InvalidUrl {
			url: path.to_string(),
			source,
		})
	}

	/// Sends one command and returns the envelope's `value`.
	///
	/// POST commands without a body send `{}`, which the protocol requires.
	pub async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
		let url = self.url_for(path)?;
		debug!(target = "tradeflow", method = %method, url = %url, "webdriver command");

		let mut request = self.http.request(method.clone(), url);
		match body {
			Some(body) => request = request.json(&body),
			None if method == Method::POST => request = request.json(&json!({})),
			None => {}
		}

		let response = request.send().await?;
		let status = response.status();
		let text = response.text().await?;
		let mut body: Value = if text.trim().is_empty() {
			Value::Null
		} else {
			serde_json::from_str(&text)?
		};

		if let Some(wire) = WireError::from_body(&body) {
			debug!(target = "tradeflow", status = status.as_u16(), error = %wire.error, "webdriver error");
			return Err(Error::Remote {
				status: status.as_u16(),
				wire,
			});
		}
		if !status.is_success() {
			return Err(Error::Protocol(format!("HTTP {status} without error payload")));
		}

		Ok(body.get_mut("value").map(Value::take).unwrap_or(Value::Null))
	}
}

/// One WebDriver session: a browser window with its own cookie jar.
#[derive(Debug)]
pub struct Session {
	connection: Connection,
	id: String,
}

impl Session {
	/// `POST /session` with the given capabilities body.
	pub async fn create(connection: Connection, capabilities: Value) -> Result<Self> {
		let value = connection.send(Method::POST, "session", Some(capabilities)).await?;
		let created: NewSession = serde_json::from_value(value)?;
		info!(target = "tradeflow", session = %created.session_id, endpoint = %connection.endpoint(), "webdriver session created");
		Ok(Self {
			connection,
			id: created.session_id,
		})
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	async fn command(&self, method: Method, suffix: &str, body: Option<Value>) -> Result<Value> {
		let path = if suffix.is_empty() {
			format!("session/{}", self.id)
		} else {
			format!("session/{}/{suffix}", self.id)
		};
		self.connection.send(method, &path, body).await
	}

	pub async fn navigate(&self, url: &str) -> Result<()> {
		self.command(Method::POST, "url", Some(json!({ "url": url }))).await?;
		Ok(())
	}

	pub async fn current_url(&self) -> Result<String> {
		string(self.command(Method::GET, "url", None).await?)
	}

	pub async fn title(&self) -> Result<String> {
		string(self.command(Method::GET, "title", None).await?)
	}

	pub async fn source(&self) -> Result<String> {
		string(self.command(Method::GET, "source", None).await?)
	}

	/// Finds the first element matching a CSS selector, `None` if absent.
	pub async fn find(&self, selector: &str) -> Result<Option<String>> {
		let body = json!({ "using": "css selector", "value": selector });
		match self.command(Method::POST, "element", Some(body)).await {
			Ok(value) => {
				let element: ElementRef = serde_json::from_value(value)?;
				Ok(Some(element.id))
			}
			Err(err) if err.is_no_such_element() => Ok(None),
			Err(err) => Err(err),
		}
	}

	pub async fn click(&self, element: &str) -> Result<()> {
		self.command(Method::POST, &format!("element/{element}/click"), None).await?;
		Ok(())
	}

	pub async fn clear(&self, element: &str) -> Result<()> {
		self.command(Method::POST, &format!("element/{element}/clear"), None).await?;
		Ok(())
	}

	pub async fn send_keys(&self, element: &str, text: &str) -> Result<()> {
		self.command(Method::POST, &format!("element/{element}/value"), Some(json!({ "text": text })))
			.await?;
		Ok(())
	}

	pub async fn is_displayed(&self, element: &str) -> Result<bool> {
		boolean(self.command(Method::GET, &format!("element/{element}/displayed"), None).await?)
	}

	pub async fn is_enabled(&self, element: &str) -> Result<bool> {
		boolean(self.command(Method::GET, &format!("element/{element}/enabled"), None).await?)
	}

	/// Cookies visible to the current document.
	pub async fn cookies(&self) -> Result<Vec<WebDriverCookie>> {
		let value = self.command(Method::GET, "cookie", None).await?;
		Ok(serde_json::from_value(value)?)
	}

	/// Adds a cookie. Its domain must match the current document.
	pub async fn add_cookie(&self, cookie: &WebDriverCookie) -> Result<()> {
		self.command(Method::POST, "cookie", Some(json!({ "cookie": cookie }))).await?;
		Ok(())
	}

	pub async fn delete_cookies(&self) -> Result<()> {
		self.command(Method::DELETE, "cookie", None).await?;
		Ok(())
	}

	/// Runs a synchronous script; `arguments[i]` inside the script is `args[i]`.
	pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
		self.command(Method::POST, "execute/sync", Some(json!({ "script": script, "args": args })))
			.await
	}

	/// Ends the session, closing its browser.
	pub async fn delete(&self) -> Result<()> {
		self.command(Method::DELETE, "", None).await?;
		info!(target = "tradeflow", session = %self.id, "webdriver session deleted");
		Ok(())
	}
}

fn string(value: Value) -> Result<String> {
	match value {
		Value::String(s) => Ok(s),
		other => Err(Error::Protocol(format!("expected a string, got {other}"))),
	}
}

fn boolean(value: Value) -> Result<bool> {
	value
		.as_bool()
		.ok_or_else(|| Error::Protocol(format!("expected a boolean, got {value}")))
}
