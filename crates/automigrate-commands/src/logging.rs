//! Log output for the command line
//!
//! `RUST_LOG` wins when set; otherwise the level follows the `-v` count.

use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	}
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed, which happens
/// when a host application sets up its own logging first.
pub fn init(verbosity: u8) -> bool {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbosity)));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(verbosity > 1)
		.with_writer(std::io::stderr)
		.try_init()
		.is_ok()
}
