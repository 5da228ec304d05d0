//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for credential-bearing configuration
//! such as the discovery backend URL (`redis://:password@host:port`).
//! `SecretString` redacts itself in `Debug` output and zeroizes on drop, so a
//! config struct deriving `Debug` never leaks the value through tracing.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let url = SecretString::from("redis://:hunter2@localhost:6379");
//! assert!(!format!("{url:?}").contains("hunter2"));
//! assert!(url.expose_secret().starts_with("redis://"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("redis://:hunter2@cache:6379");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_deserialize_keeps_value_hidden() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct DiscoverySettings {
            backend: String,
            url: SecretString,
        }

        let json = r#"{"backend": "redis", "url": "redis://:pw@cache:6379"}"#;
        let settings: DiscoverySettings = serde_json::from_str(json).expect("deserialize");

        assert_eq!(settings.url.expose_secret(), "redis://:pw@cache:6379");
        let debug = format!("{settings:?}");
        assert!(debug.contains("redis"));
        assert!(!debug.contains(":pw@"));
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
