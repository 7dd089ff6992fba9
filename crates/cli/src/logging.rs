use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub fn init_logging(verbosity: u8) {
	// 0 = warnings only (session and pool chatter stays quiet)
	// 1 (-v) = session lifecycle
	// 2 (-vv) = every command and probe
	// 3+ = cache traffic
	let filter = match verbosity {
		0 => "warn",
		1 => "warn,shellmux=info",
		2 => "info,shellmux=debug",
		_ => "debug,shellmux=trace",
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
