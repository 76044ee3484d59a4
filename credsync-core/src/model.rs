//! Domain model types for credsync.
//!
//! This module defines the record types shared by the cache, the store
//! contract and the wire protocol:
//! - [`RecordId`] - Identifier of a stored credential record
//! - [`Secret`] - Password wrapper that never shows up in logs
//! - [`RawRecord`] - A credential record exactly as the provider stores it
//! - [`RecordInput`] - Client-supplied fields for add and update requests
//! - [`NormalizedRecord`] - Display view of a raw record with a derived title
//!
//! All types serialize with camelCase field names and epoch-millisecond
//! timestamps. The legacy names `guid`, `hostname` and `formSubmitURL` are
//! accepted as aliases when deserializing.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::normalize::derive_title;

/// Identifier for a credential record.
///
/// Assigned once, either by the provider or by [`RecordId::generate`], and
/// never changed afterwards.
///
/// # Examples
///
/// ```
/// use credsync_core::RecordId;
///
/// let id = RecordId::new("FOO");
/// assert_eq!(id.as_str(), "FOO");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a record ID from an existing value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, globally unique record ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the record ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is wiped when the secret is dropped.
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret holds an empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Current time at the millisecond precision used on the wire.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// A credential record as stored by the provider.
///
/// This is the unit of truth held in the cache. It is never modified in
/// place by readers; every read goes through [`NormalizedRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    /// Unique record identifier.
    #[serde(alias = "guid")]
    pub id: RecordId,

    /// Origin the credential belongs to (e.g. `https://example.com`).
    #[serde(alias = "hostname")]
    pub origin: String,

    /// Origin the login form submits to, for form-based credentials.
    #[serde(default, alias = "formSubmitURL")]
    pub form_target_origin: Option<String>,

    /// HTTP authentication realm, for HTTP-auth credentials.
    #[serde(default)]
    pub http_realm: Option<String>,

    /// Stored username (may be empty).
    #[serde(default)]
    pub username: String,

    /// Stored password.
    pub password: Secret,

    /// Name of the username form field.
    #[serde(default)]
    pub username_field: String,

    /// Name of the password form field.
    #[serde(default)]
    pub password_field: String,

    /// How often the provider saw this credential used.
    #[serde(default)]
    pub times_used: u64,

    /// When the record was created.
    #[serde(default = "now", with = "chrono::serde::ts_milliseconds")]
    pub time_created: DateTime<Utc>,

    /// When the record was last used.
    #[serde(default = "now", with = "chrono::serde::ts_milliseconds")]
    pub time_last_used: DateTime<Utc>,

    /// When the password last changed.
    #[serde(default = "now", with = "chrono::serde::ts_milliseconds")]
    pub time_password_changed: DateTime<Utc>,
}

/// Fields supplied by a client when adding or updating a record.
///
/// Every field is optional; which ones are required depends on the
/// operation. Timestamps and usage counters sent by clients are ignored
/// because the cache and the provider own them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInput {
    #[serde(default, alias = "guid")]
    pub id: Option<RecordId>,

    #[serde(default, alias = "hostname")]
    pub origin: Option<String>,

    #[serde(default, alias = "formSubmitURL")]
    pub form_target_origin: Option<String>,

    #[serde(default)]
    pub http_realm: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<Secret>,

    #[serde(default)]
    pub username_field: Option<String>,

    #[serde(default)]
    pub password_field: Option<String>,
}

/// Read-only display view of a [`RawRecord`].
///
/// Serializes as the raw record's fields plus `title`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(flatten)]
    pub record: RawRecord,

    /// Human-readable name derived from the origin.
    pub title: String,
}

impl NormalizedRecord {
    /// Build the display view for a raw record.
    pub fn from_raw(record: RawRecord) -> Self {
        let title = derive_title(&record.origin);
        Self { record, title }
    }

    /// The underlying record ID.
    pub fn id(&self) -> &RecordId {
        &self.record.id
    }
}

impl From<RawRecord> for NormalizedRecord {
    fn from(record: RawRecord) -> Self {
        Self::from_raw(record)
    }
}
