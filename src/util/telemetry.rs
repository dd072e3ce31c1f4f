//! `tracing` setup and one-line engine summaries.

use crate::engine::{SpectrogramEngine, VerticalAxisProvider};
use std::sync::OnceLock;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// Directive used when no filter is configured in the environment.
pub const DEFAULT_DIRECTIVE: &str = "openspectra=info";

/// Read before `RUST_LOG`.
pub const LOG_ENV: &str = "OPENSPECTRA_LOG";

static SUBSCRIBER: OnceLock<bool> = OnceLock::new();

/// Installs a compact global subscriber on first call. Returns whether this
/// process owns it; later calls repeat the first answer.
pub fn init() -> bool {
    *SUBSCRIBER.get_or_init(|| {
        match fmt()
            .with_env_filter(env_filter())
            .with_target(false)
            .compact()
            .try_init()
        {
            Ok(()) => true,
            Err(err) => {
                eprintln!("[telemetry] tracing subscriber not installed: {err}");
                false
            }
        }
    })
}

fn env_filter() -> EnvFilter {
    std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .and_then(|directives| {
            EnvFilter::try_new(&directives)
                .map_err(|err| eprintln!("[telemetry] ignoring log filter {directives:?}: {err}"))
                .ok()
        })
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Logs the analysis and display setup `engine` will render with.
pub fn engine_summary(kind: &str, engine: &SpectrogramEngine) {
    let analysis = engine.analysis();
    let display_params = engine.display();
    let (min, max) = engine.display_extents();
    info!(
        "[engine] {kind}: window={} ({}), hop={}, fft={}, band={min:.1}..{max:.1} Hz ({:?}), bins={:?}, colour={:?}/map {}, normalization={:?}",
        analysis.window_size,
        analysis.window,
        engine.feature_resolution(),
        engine.fft_size(),
        display_params.bin_scale,
        display_params.bin_display,
        display_params.colour_scale,
        display_params.colour_map,
        display_params.normalization,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let first = init();
        assert_eq!(init(), first);
        assert!(EnvFilter::try_new(DEFAULT_DIRECTIVE).is_ok());
    }
}
