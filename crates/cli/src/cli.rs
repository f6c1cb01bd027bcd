use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tradeflow::Market;

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "tradeflow")]
#[command(about = "Log in to a web trading account and place orders through a WebDriver browser")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Config file (default: <config dir>/tradeflow/config.json)
	#[arg(long, global = true, value_name = "FILE", env = "TRADEFLOW_CONFIG")]
	pub config: Option<PathBuf>,

	/// WebDriver endpoint, overriding the config file
	#[arg(long, global = true, value_name = "URL", env = "TRADEFLOW_WEBDRIVER")]
	pub webdriver: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Log in (or validate the stored session) and save the session
	Login(BrowserArgs),

	/// Place one order
	Order(OrderArgs),

	/// Inspect or remove the stored session
	Session {
		#[command(subcommand)]
		action: SessionAction,
	},

	/// Inspect configuration
	Config {
		#[command(subcommand)]
		action: ConfigAction,
	},
}

impl Commands {
	/// Name used in the result envelope.
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Login(_) => "login",
			Commands::Order(_) => "order",
			Commands::Session {
				action: SessionAction::Show,
			} => "session show",
			Commands::Session {
				action: SessionAction::Clear,
			} => "session clear",
			Commands::Config {
				action: ConfigAction::Show,
			} => "config show",
		}
	}
}

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct BrowserArgs {
	/// Show the browser window
	#[arg(long)]
	pub headed: bool,
}

#[derive(Args, Debug)]
pub struct OrderArgs {
	/// Ticker symbol, e.g. AAPL
	pub symbol: String,

	/// Buy, Sell, Short or Cover
	pub action: String,

	/// Number of shares or units
	#[arg(allow_negative_numbers = true)]
	pub quantity: i64,

	/// Market, Limit or Stop
	#[arg(long = "type", value_name = "TYPE", default_value = "market")]
	pub order_type: String,

	/// Order page to use
	#[arg(long, default_value = "equities")]
	pub market: Market,

	#[command(flatten)]
	pub browser: BrowserArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
	/// Summarise the stored session
	Show,
	/// Delete the stored session
	Clear,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
	/// Print the effective configuration
	Show,
}
