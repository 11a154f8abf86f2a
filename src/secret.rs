//! Credential wrapper.
//!
//! Passwords collected from the operator are held in a [`Secret`]. The type
//! never prints its content (`Debug` and `Display` both redact), cannot be
//! turned into a command-line argument, and zeroes its buffer when dropped.
//! The only way out is [`Secret::expose`], used when feeding `chpasswd` over
//! stdin.

use std::fmt;

use zeroize::Zeroizing;

/// Mask shown wherever a secret would otherwise be displayed.
pub const REDACTED: &str = "********";

/// A password or other credential that must never reach the log.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wrap a credential. The caller's `String` is moved in, not copied.
    pub fn new(value: String) -> Self {
        Self(Zeroizing::new(value))
    }

    /// Borrow the plaintext. Keep the borrow as short as possible.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", REDACTED)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_redact() {
        let secret = Secret::from("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret(********)");
        assert_eq!(secret.to_string(), REDACTED);
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    #[test]
    fn test_expose_returns_plaintext() {
        let secret = Secret::new("correct horse".to_string());
        assert_eq!(secret.expose(), "correct horse");
        assert_eq!(secret.len(), 13);
        assert!(!secret.is_empty());
    }

    #[test]
    fn test_empty_secret() {
        assert!(Secret::from("").is_empty());
    }
}
