use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter directive for a `-v` count. `RUST_LOG` overrides it.
pub fn default_filter(verbosity: u8) -> &'static str {
	// 0 = errors only (a failed run is reported through the result envelope)
	// 1 (-v) = info for tradeflow, warn for the HTTP stack
	// 2+ (-vv) = debug for everything
	match verbosity {
		0 => "error",
		1 => "info,reqwest=warn,hyper=warn",
		_ => "debug",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
