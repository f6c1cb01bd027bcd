use tracing::info;
use tradeflow::{CancelHandle, RunReport, TradeOrder};

use super::InterruptGuard;
use crate::cli::OrderArgs;
use crate::config::{self, Config, StatePaths};
use crate::error::Result;

pub async fn run(config: &Config, paths: &StatePaths, args: OrderArgs) -> Result<RunReport> {
	// Validate before touching credentials or the browser.
	let order = TradeOrder::parse(&args.symbol, &args.action, args.quantity, &args.order_type)?;
	let (credentials, _) = config::env_credentials(paths)?;
	info!(target = "tradeflow", order = %order, market = %args.market, "placing order");

	let cancel = CancelHandle::new();
	let runner = super::runner(config, paths, args.browser, &cancel);
	let _interrupt = InterruptGuard::install(cancel);

	let report = runner.run(&credentials, &order, args.market).await?;
	info!(
		target = "tradeflow",
		symbol = %report.receipt.symbol,
		placed = report.receipt.placed,
		"order confirmed"
	);
	Ok(report)
}
