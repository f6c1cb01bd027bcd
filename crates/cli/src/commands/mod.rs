//! Command implementations and dispatch.

mod config;
mod login;
mod order;
mod session;

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::warn;
use tradeflow::{AuthController, CancelHandle, FileSessionStore, LaunchOptions, WorkflowRunner};
use tradeflow_runtime::WebDriverLauncher;

use crate::cli::{BrowserArgs, Cli, Commands, ConfigAction, SessionAction};
use crate::config::{Config, StatePaths};
use crate::error::Result;
use crate::output::{self, CommandResult, OutputFormat};

/// Runs the parsed command and prints its result envelope.
pub async fn dispatch(cli: Cli) -> Result<()> {
	let paths = StatePaths::new();
	let mut config = Config::load(cli.config.as_deref(), &paths)?;
	if let Some(endpoint) = cli.webdriver {
		config.webdriver = endpoint;
	}

	let format = cli.format;
	let name = cli.command.name();
	match cli.command {
		Commands::Login(args) => emit(name, login::run(&config, &paths, args).await?, format),
		Commands::Order(args) => emit(name, order::run(&config, &paths, args).await?, format),
		Commands::Session {
			action: SessionAction::Show,
		} => emit(name, session::show(&config.session_path(&paths))?, format),
		Commands::Session {
			action: SessionAction::Clear,
		} => emit(name, session::clear(&config.session_path(&paths))?, format),
		Commands::Config {
			action: ConfigAction::Show,
		} => emit(name, config::show(&config, &paths, cli.config.as_deref())?, format),
	}
	Ok(())
}

fn emit<T: Serialize>(command: &str, data: T, format: OutputFormat) {
	output::print_result(&CommandResult::success(command, data), format);
}

/// Builds a runner over the configured WebDriver endpoint and session file.
fn runner(config: &Config, paths: &StatePaths, browser: BrowserArgs, cancel: &CancelHandle) -> WorkflowRunner<FileSessionStore> {
	let launcher = WebDriverLauncher::new(config.webdriver.clone(), config.browser).with_poll_interval(Duration::from_millis(config.poll_ms));
	let auth = AuthController::new(FileSessionStore::new(config.session_path(paths)), &config.site);

	WorkflowRunner::new(launcher, auth, config.site.clone())
		.with_launch_options(LaunchOptions {
			headless: config.headless && !browser.headed,
		})
		.with_cancel(cancel.signal())
}

/// Cancels a run on Ctrl-C. The listener stops when the guard is dropped.
struct InterruptGuard(JoinHandle<()>);

impl InterruptGuard {
	fn install(handle: CancelHandle) -> Self {
		Self(tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				warn!(target = "tradeflow", "interrupted, stopping after the current step");
				handle.cancel();
			}
		}))
	}
}

impl Drop for InterruptGuard {
	fn drop(&mut self) {
		self.0.abort();
	}
}
