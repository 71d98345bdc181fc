/// Get compile timestamp at runtime - returns RFC 3339 formatted timestamp from build.rs
/// Format: YYYY-MM-DDTHH:MM:SSZ (e.g., "2025-02-09T15:30:45Z")
pub fn current_version() -> &'static str {
    option_env!("BUILD_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Startup banner - logs which build is running
pub fn log_startup() {
    tracing::info!(
        "dut-monitor {} (build {})",
        env!("CARGO_PKG_VERSION"),
        current_version()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_version() {
        let version = current_version();
        assert!(!version.is_empty(), "Version should not be empty");
    }

    #[test]
    fn test_current_version_format() {
        let version = current_version();
        // build.rs always sets BUILD_VERSION, so this is the RFC 3339 stamp
        let rfc3339_pattern = regex::Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").unwrap();
        assert!(
            rfc3339_pattern.is_match(version),
            "Version should be RFC 3339 timestamp, got: {}",
            version
        );
    }

    #[test]
    fn test_log_startup() {
        // Only logs; verify it doesn't panic without a subscriber
        log_startup();
    }
}
