//! Record normalization.
//!
//! Turns stored records into their display form. The only derived field is
//! the title, computed from the record's origin:
//!
//! 1. Parse the origin as a URL and keep its host (plus a non-default port).
//!    An origin that does not parse is used as-is; one that parses without a
//!    host (`about:blank`) has an empty title.
//! 2. Drop a leading `http://` or `https://`.
//! 3. Drop one leading `www` label, optionally numbered (`www.`, `www1.`).

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::model::{NormalizedRecord, RawRecord};

static SCHEME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://").expect("scheme pattern is valid"));

static WWW_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^www\d*\.").expect("www pattern is valid"));

/// Normalize a raw record for display.
///
/// Returns `None` for a missing record so "not found" lookups can be passed
/// straight through.
pub fn normalize(record: Option<&RawRecord>) -> Option<NormalizedRecord> {
    record.cloned().map(NormalizedRecord::from_raw)
}

/// Derive a display title from an origin string.
///
/// # Examples
///
/// ```
/// use credsync_core::derive_title;
///
/// assert_eq!(derive_title("https://www.example.com"), "example.com");
/// assert_eq!(derive_title("http://foo.example.com"), "foo.example.com");
/// ```
pub fn derive_title(origin: &str) -> String {
    let host = match Url::parse(origin) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        },
        Err(_) => origin.to_string(),
    };

    let host = SCHEME_PREFIX.replace(&host, "");
    WWW_LABEL.replace(&host, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RecordId, Secret};
    use chrono::Utc;

    fn record(origin: &str) -> RawRecord {
        let now = Utc::now();
        RawRecord {
            id: RecordId::new("FOO"),
            origin: origin.to_string(),
            form_target_origin: None,
            http_realm: None,
            username: "FOOuser".to_string(),
            password: Secret::new("FOOpass"),
            username_field: "username".to_string(),
            password_field: "password".to_string(),
            times_used: 1,
            time_created: now,
            time_last_used: now,
            time_password_changed: now,
        }
    }

    #[test]
    fn test_normalize_none() {
        assert!(normalize(None).is_none());
    }

    #[test]
    fn test_normalize_preserves_identity() {
        let raw = record("https://foo.example.com");
        let item = normalize(Some(&raw)).unwrap();
        assert_eq!(item.id(), &raw.id);
        assert_eq!(item.record, raw);
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = record("https://www.example.com");
        assert_eq!(normalize(Some(&raw)), normalize(Some(&raw)));
    }

    #[test]
    fn test_strips_https() {
        assert_eq!(derive_title("https://example.com"), "example.com");
    }

    #[test]
    fn test_strips_http() {
        assert_eq!(derive_title("http://example.com"), "example.com");
    }

    #[test]
    fn test_strips_www() {
        assert_eq!(derive_title("http://www.example.com"), "example.com");
    }

    #[test]
    fn test_strips_numbered_www() {
        assert_eq!(derive_title("http://www1.example.com"), "example.com");
        assert_eq!(derive_title("http://www23.example.com"), "example.com");
    }

    #[test]
    fn test_keeps_other_subdomains() {
        assert_eq!(derive_title("http://foo.example.com"), "foo.example.com");
    }

    #[test]
    fn test_strips_only_one_www_label() {
        assert_eq!(derive_title("https://www.www.example.com"), "www.example.com");
    }

    #[test]
    fn test_keeps_public_suffix() {
        assert!(derive_title("https://www.example.com").ends_with(".com"));
        assert!(derive_title("https://www.example.co.uk").ends_with(".co.uk"));
    }

    #[test]
    fn test_keeps_non_default_port() {
        assert_eq!(derive_title("https://www.example.com:8443"), "example.com:8443");
        assert_eq!(derive_title("https://example.com:443"), "example.com");
    }

    #[test]
    fn test_unparseable_origin_used_verbatim() {
        assert_eq!(derive_title("example.com"), "example.com");
        assert_eq!(derive_title("www.example.com"), "example.com");
    }

    #[test]
    fn test_hostless_origin_has_empty_title() {
        assert_eq!(derive_title("about:blank"), "");
        assert_eq!(derive_title("data:text/plain,hi"), "");
    }
}
