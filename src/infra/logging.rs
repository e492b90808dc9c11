use std::env;

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the filter directives
pub const LOG_ENV: &str = "KBTREE_LOG";

fn default_directive(quiet: bool) -> &'static str {
    if quiet { "error" } else { "warn" }
}

/// `KBTREE_LOG` when set and valid, otherwise the quiet-aware default.
pub fn filter(quiet: bool) -> EnvFilter {
    env::var(LOG_ENV)
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(quiet)))
}

/// Install the global subscriber on stderr. A second call is a no-op.
pub fn init(quiet: bool, no_color: bool) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(ChronoLocal::new("%H:%M:%S%.3f".to_string()))
                .with_target(false)
                .with_ansi(!no_color),
        )
        .with(filter(quiet))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_only_changes_the_default() {
        assert_eq!(default_directive(false), "warn");
        assert_eq!(default_directive(true), "error");
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(true, true);
        init(false, true);
    }
}
