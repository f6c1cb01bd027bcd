use std::path::PathBuf;

use serde::Serialize;
use tracing::info;
use tradeflow::{AuthReport, CancelHandle};

use super::InterruptGuard;
use crate::cli::BrowserArgs;
use crate::config::{self, Config, CredentialOrigin, StatePaths};
use crate::error::Result;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutput {
	#[serde(flatten)]
	pub report: AuthReport,
	pub session_file: PathBuf,
	pub credentials: CredentialOrigin,
}

pub async fn run(config: &Config, paths: &StatePaths, browser: BrowserArgs) -> Result<LoginOutput> {
	let (credentials, origin) = config::env_credentials(paths)?;
	info!(target = "tradeflow", username = credentials.username(), source = ?origin, "logging in");

	let cancel = CancelHandle::new();
	let runner = super::runner(config, paths, browser, &cancel);
	let _interrupt = InterruptGuard::install(cancel);

	let report = runner.login(&credentials).await?;
	Ok(LoginOutput {
		report,
		session_file: config.session_path(paths),
		credentials: origin,
	})
}
