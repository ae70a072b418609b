// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Endpoint resolution.

use crate::error::ConfigurationError;
use crate::types::Mode;

/// Resolve the base URL for a test mode.
///
/// `lb` requires `lb_url` and `gw` requires `gw_url`; the other URL is
/// ignored. Empty strings count as missing. Trailing slashes are stripped.
///
/// # Errors
///
/// Returns [`ConfigurationError::UnsupportedMode`] for any mode other than
/// `lb`/`gw`, and [`ConfigurationError::MissingBaseUrl`] when the URL for the
/// selected mode is absent.
pub fn resolve_endpoint(
    mode: &str,
    lb_url: Option<&str>,
    gw_url: Option<&str>,
) -> Result<String, ConfigurationError> {
    let mode: Mode = mode.parse()?;
    resolve_for_mode(mode, lb_url, gw_url)
}

/// Resolve the base URL for an already-parsed mode.
pub fn resolve_for_mode(
    mode: Mode,
    lb_url: Option<&str>,
    gw_url: Option<&str>,
) -> Result<String, ConfigurationError> {
    let url = match mode {
        Mode::Lb => lb_url,
        Mode::Gw => gw_url,
    };

    match url.map(str::trim) {
        Some(url) if !url.is_empty() => Ok(url.trim_end_matches('/').to_string()),
        _ => Err(ConfigurationError::MissingBaseUrl { mode }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lb_strips_trailing_slash() {
        assert_eq!(
            resolve_endpoint("lb", Some("http://x/"), Some("ignored")).unwrap(),
            "http://x"
        );
        assert_eq!(
            resolve_endpoint("lb", Some("http://x//"), None).unwrap(),
            "http://x"
        );
    }

    #[test]
    fn test_gw_requires_gw_url() {
        let err = resolve_endpoint("gw", Some("http://x/"), None).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingBaseUrl { mode: Mode::Gw }));

        assert_eq!(
            resolve_endpoint("gw", None, Some("http://gateway:8080/")).unwrap(),
            "http://gateway:8080"
        );
    }

    #[test]
    fn test_lb_requires_lb_url() {
        assert!(matches!(
            resolve_endpoint("lb", None, Some("http://gw")),
            Err(ConfigurationError::MissingBaseUrl { mode: Mode::Lb })
        ));
        assert!(matches!(
            resolve_endpoint("lb", Some(""), None),
            Err(ConfigurationError::MissingBaseUrl { mode: Mode::Lb })
        ));
    }

    #[test]
    fn test_unsupported_mode() {
        assert!(matches!(
            resolve_endpoint("zz", Some("a"), Some("b")),
            Err(ConfigurationError::UnsupportedMode(m)) if m == "zz"
        ));
    }
}
