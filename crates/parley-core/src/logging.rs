//! Logging helpers that keep sensitive data out of log output.

use std::fmt;

/// A wrapper that redacts a value when displayed.
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
    fn test_redacted_hides_value() {
        assert_eq!(format!("{}", Redacted("secret")), "[REDACTED]");
        assert_eq!(format!("{:?}", Redacted("secret")), "[REDACTED]");
    }

    #[test]
    fn test_redacted_bytes_show_length_only() {
        let key = [7u8; 16];
        assert_eq!(format!("{}", RedactedBytes(&key)), "[16 bytes]");
    }
}
