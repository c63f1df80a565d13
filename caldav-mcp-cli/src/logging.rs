use tracing_subscriber::EnvFilter;

/// Map a configured level name (`DEBUG`, `INFO`, `WARNING`, ...) to a filter directive.
pub fn level_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Log to stderr; stdout carries protocol output. `RUST_LOG` wins over the config level.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("debug"), "debug");
        assert_eq!(level_directive(" Error "), "error");
        assert_eq!(level_directive("CRITICAL"), "error");
        assert_eq!(level_directive("verbose"), "info", "unknown levels fall back to info");
    }
}
