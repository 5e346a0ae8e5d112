//! Tracing subscriber setup for binaries.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "veritas=info,veritas_foundation=info,veritas_kernel=info";

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    /// Force `debug` for the veritas crates.
    pub verbose: bool,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Install the global subscriber. A second call is a no-op and returns `false`.
pub fn init_tracing(options: LogOptions) -> bool {
    let filter = if options.verbose {
        EnvFilter::new("veritas=debug,veritas_foundation=debug,veritas_kernel=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    // stdout is reserved for command output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if options.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        init_tracing(LogOptions::default());
        assert!(!init_tracing(LogOptions {
            verbose: true,
            json: true
        }));
    }
}
