//! Config, secrets and state paths.
//!
//! Everything lives under `<config dir>/tradeflow/`:
//!
//! - `config.json`: optional [`Config`], merged field by field over defaults
//! - `secrets.json`: `{"username", "password"}`, used when the environment
//!   does not provide credentials; keep it at mode 0600
//! - `session.json`: the stored browser session, unless `sessionFile` says otherwise

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tradeflow::{Credentials, SiteProfile};
use tradeflow_protocol::BrowserKind;
use tradeflow_runtime::DEFAULT_ENDPOINT;

use crate::error::{CliError, Result};

pub const USERNAME_VAR: &str = "TRADEFLOW_USERNAME";
pub const PASSWORD_VAR: &str = "TRADEFLOW_PASSWORD";

/// File locations for CLI state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePaths {
	pub dir: PathBuf,
	pub config: PathBuf,
	pub secrets: PathBuf,
	pub session: PathBuf,
}

impl StatePaths {
	/// Paths under the platform config directory (`~/.config/tradeflow` on Linux).
	pub fn new() -> Self {
		let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
		Self::in_dir(base.join("tradeflow"))
	}

	pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
		let dir = dir.into();
		Self {
			config: dir.join("config.json"),
			secrets: dir.join("secrets.json"),
			session: dir.join("session.json"),
			dir,
		}
	}
}

impl Default for StatePaths {
	fn default() -> Self {
		Self::new()
	}
}

/// Effective CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// WebDriver endpoint (chromedriver, geckodriver or a Selenium grid).
	pub webdriver: String,
	pub browser: BrowserKind,
	pub headless: bool,
	/// Overrides the default `session.json` location.
	pub session_file: Option<PathBuf>,
	/// Element wait polling interval in milliseconds.
	pub poll_ms: u64,
	pub site: SiteProfile,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			webdriver: DEFAULT_ENDPOINT.to_string(),
			browser: BrowserKind::default(),
			headless: true,
			session_file: None,
			poll_ms: 100,
			site: SiteProfile::default(),
		}
	}
}

impl Config {
	/// Loads `explicit`, or the default config file when it exists.
	///
	/// An explicit path must exist; the default one is optional.
	pub fn load(explicit: Option<&Path>, paths: &StatePaths) -> Result<Self> {
		let path = explicit.unwrap_or(&paths.config);
		match load_json::<Config>(path)? {
			Some(config) => {
				debug!(target = "tradeflow", path = %path.display(), "loaded config");
				Ok(config)
			}
			None if explicit.is_some() => Err(CliError::ConfigNotFound(path.to_path_buf())),
			None => Ok(Config::default()),
		}
	}

	pub fn session_path(&self, paths: &StatePaths) -> PathBuf {
		self.session_file.clone().unwrap_or_else(|| paths.session.clone())
	}
}

/// Where the credentials were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialOrigin {
	Environment,
	SecretsFile,
}

#[derive(Deserialize)]
struct Secrets {
	username: String,
	password: String,
}

/// Resolves login credentials from the environment, falling back to `secrets`.
///
/// `lookup` reads an environment variable; both variables must be set and
/// non-empty for the environment to win.
pub fn resolve_credentials(lookup: impl Fn(&str) -> Option<String>, secrets: &Path) -> Result<(Credentials, CredentialOrigin)> {
	let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
	if let (Some(username), Some(password)) = (var(USERNAME_VAR), var(PASSWORD_VAR)) {
		return Ok((Credentials::new(username, password), CredentialOrigin::Environment));
	}

	match load_json::<Secrets>(secrets)? {
		Some(file) if !file.username.is_empty() && !file.password.is_empty() => {
			warn_if_shared(secrets);
			Ok((Credentials::new(file.username, file.password), CredentialOrigin::SecretsFile))
		}
		_ => Err(CliError::MissingCredentials {
			username_var: USERNAME_VAR,
			password_var: PASSWORD_VAR,
			secrets: secrets.to_path_buf(),
		}),
	}
}

/// Reads credentials from the process environment.
pub fn env_credentials(paths: &StatePaths) -> Result<(Credentials, CredentialOrigin)> {
	resolve_credentials(|name| std::env::var(name).ok(), &paths.secrets)
}

#[cfg(unix)]
fn warn_if_shared(path: &Path) {
	use std::os::unix::fs::PermissionsExt;

	if let Ok(meta) = fs::metadata(path) {
		let mode = meta.permissions().mode() & 0o777;
		if mode & 0o077 != 0 {
			warn!(target = "tradeflow", path = %path.display(), mode = %format!("{mode:o}"), "secrets file is accessible to other users, chmod 600 it");
		}
	}
}

#[cfg(not(unix))]
fn warn_if_shared(_path: &Path) {}

/// Reads JSON from `path`. A missing file is `None`.
fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
	let content = match fs::read_to_string(path) {
		Ok(content) => content,
		Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
		Err(err) => return Err(err.into()),
	};
	serde_json::from_str(&content).map(Some).map_err(|source| CliError::ConfigFile {
		path: path.to_path_buf(),
		source,
	})
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use tempfile::TempDir;

	use super::*;

	fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn defaults_when_no_config_file() {
		let dir = TempDir::new().unwrap();
		let paths = StatePaths::in_dir(dir.path());

		let config = Config::load(None, &paths).unwrap();
		assert_eq!(config, Config::default());
		assert_eq!(config.webdriver, "http://localhost:9515");
		assert_eq!(config.session_path(&paths), dir.path().join("session.json"));
	}

	#[test]
	fn file_merges_over_defaults() {
		let dir = TempDir::new().unwrap();
		let paths = StatePaths::in_dir(dir.path());
		fs::write(
			&paths.config,
			r##"{"webdriver": "http://grid:4444/wd/hub", "browser": "firefox", "site": {"order": {"confirmButton": "#place"}}}"##,
		)
		.unwrap();

		let config = Config::load(None, &paths).unwrap();
		assert_eq!(config.webdriver, "http://grid:4444/wd/hub");
		assert_eq!(config.browser, BrowserKind::Firefox);
		assert!(config.headless);
		assert_eq!(config.site.order.confirm_button, "#place");
		assert_eq!(config.site.order.review_button, SiteProfile::default().order.review_button);
	}

	#[test]
	fn explicit_config_must_exist() {
		let dir = TempDir::new().unwrap();
		let paths = StatePaths::in_dir(dir.path());
		let missing = dir.path().join("nope.json");

		let err = Config::load(Some(missing.as_path()), &paths).unwrap_err();
		assert!(matches!(err, CliError::ConfigNotFound(p) if p == missing));
	}

	#[test]
	fn malformed_config_names_the_file() {
		let dir = TempDir::new().unwrap();
		let paths = StatePaths::in_dir(dir.path());
		fs::write(&paths.config, "{ not json").unwrap();

		let err = Config::load(None, &paths).unwrap_err();
		assert!(matches!(&err, CliError::ConfigFile { path, .. } if *path == paths.config));
	}

	#[test]
	fn session_file_override() {
		let paths = StatePaths::in_dir("/tmp/tradeflow");
		let config = Config {
			session_file: Some(PathBuf::from("/var/lib/tradeflow/session.json")),
			..Config::default()
		};
		assert_eq!(config.session_path(&paths), PathBuf::from("/var/lib/tradeflow/session.json"));
	}

	#[test]
	fn environment_wins_over_secrets_file() {
		let dir = TempDir::new().unwrap();
		let secrets = dir.path().join("secrets.json");
		fs::write(&secrets, r#"{"username": "file-user", "password": "file-pass"}"#).unwrap();

		let lookup = env(&[(USERNAME_VAR, "env-user"), (PASSWORD_VAR, "env-pass")]);
		let (credentials, origin) = resolve_credentials(lookup, &secrets).unwrap();
		assert_eq!(credentials.username(), "env-user");
		assert_eq!(origin, CredentialOrigin::Environment);
	}

	#[test]
	fn partial_environment_falls_back_to_secrets_file() {
		let dir = TempDir::new().unwrap();
		let secrets = dir.path().join("secrets.json");
		fs::write(&secrets, r#"{"username": "file-user", "password": "file-pass"}"#).unwrap();

		let lookup = env(&[(USERNAME_VAR, "env-user"), (PASSWORD_VAR, "")]);
		let (credentials, origin) = resolve_credentials(lookup, &secrets).unwrap();
		assert_eq!(credentials.username(), "file-user");
		assert_eq!(credentials.password(), "file-pass");
		assert_eq!(origin, CredentialOrigin::SecretsFile);
	}

	#[test]
	fn no_credentials_anywhere() {
		let dir = TempDir::new().unwrap();
		let secrets = dir.path().join("secrets.json");

		let err = resolve_credentials(env(&[]), &secrets).unwrap_err();
		assert!(matches!(err, CliError::MissingCredentials { .. }));
	}

	#[test]
	fn blank_secrets_count_as_missing() {
		let dir = TempDir::new().unwrap();
		let secrets = dir.path().join("secrets.json");
		fs::write(&secrets, r#"{"username": "", "password": ""}"#).unwrap();

		assert!(matches!(resolve_credentials(env(&[]), &secrets), Err(CliError::MissingCredentials { .. })));
	}

	#[test]
	fn config_serialization_never_contains_secrets() {
		let json = serde_json::to_string(&Config::default()).unwrap();
		assert!(!json.contains("password\""));
		assert!(json.contains("passwordInput"));
	}
}
