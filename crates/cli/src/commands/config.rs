use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{self, Config, CredentialOrigin, StatePaths};
use crate::error::{CliError, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReport {
	pub config_file: PathBuf,
	pub config_file_exists: bool,
	pub secrets_file: PathBuf,
	pub session_file: PathBuf,
	/// `None` when no credentials are available.
	pub credentials: Option<CredentialSummary>,
	pub config: Config,
}

/// Who would log in. The password is never included.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
	pub username: String,
	pub source: CredentialOrigin,
}

pub fn show(config: &Config, paths: &StatePaths, explicit: Option<&Path>) -> Result<ConfigReport> {
	report(config, paths, explicit, |name| std::env::var(name).ok())
}

fn report(config: &Config, paths: &StatePaths, explicit: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<ConfigReport> {
	let credentials = match config::resolve_credentials(lookup, &paths.secrets) {
		Ok((credentials, source)) => Some(CredentialSummary {
			username: credentials.username().to_string(),
			source,
		}),
		Err(CliError::MissingCredentials { .. }) => None,
		Err(err) => return Err(err),
	};

	let config_file = explicit.map_or_else(|| paths.config.clone(), Path::to_path_buf);
	Ok(ConfigReport {
		config_file_exists: config_file.exists(),
		config_file,
		secrets_file: paths.secrets.clone(),
		session_file: config.session_path(paths),
		credentials,
		config: config.clone(),
	})
}
