//! Process-wide tracing setup for the binary.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. Log lines go to stderr so response bodies
/// on stdout stay clean.
///
/// The filter comes from `OFFGRID_LOG` (e.g. `offgrid=debug`), default `info`.
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init() -> WorkerGuard {
  let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
  let filter = EnvFilter::try_from_env("OFFGRID_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  // A subscriber already installed (tests, embedding hosts) keeps precedence
  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_target(false))
    .try_init()
    .ok();

  guard
}
