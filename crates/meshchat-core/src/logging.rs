//! Logging helpers with sensitive data redaction.
//!
//! Overlay locations and key material must never land in log output
//! verbatim. These wrappers are used at `tracing` call sites throughout
//! the engine.

use std::fmt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`, defaulting to `info`. Safe to call more than
/// once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// A wrapper that redacts its value entirely when displayed.
pub struct Redacted<T>(pub T);

impl<T: fmt::Display> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: fmt::Debug> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Redact an overlay location, showing only the first and last few characters.
pub struct RedactedLocation<'a>(pub &'a str);

impl fmt::Display for RedactedLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        if s.len() > 12 {
            write!(f, "{}...{}", &s[..4], &s[s.len() - 4..])
        } else {
            write!(f, "[REDACTED LOCATION]")
        }
    }
}

impl fmt::Debug for RedactedLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Redact a byte slice, showing only its length.
pub struct RedactedBytes<'a>(pub &'a [u8]);

impl fmt::Display for RedactedBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} bytes]", self.0.len())
    }
}

impl fmt::Debug for RedactedBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_display() {
        let secret = Redacted("base64-private-key-material");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_redacted_location() {
        let loc = RedactedLocation("mesh://node-7f3a9c2e1b5d.overlay");
        let displayed = format!("{}", loc);
        assert!(displayed.starts_with("mesh"));
        assert!(displayed.contains("..."));
        assert!(!displayed.contains("7f3a9c2e1b5d"));
    }

    #[test]
    fn test_short_location_fully_redacted() {
        let loc = RedactedLocation("short");
        assert_eq!(format!("{}", loc), "[REDACTED LOCATION]");
    }

    #[test]
    fn test_redacted_bytes() {
        let bytes = RedactedBytes(&[1, 2, 3, 4]);
        assert_eq!(format!("{}", bytes), "[4 bytes]");
    }
}
