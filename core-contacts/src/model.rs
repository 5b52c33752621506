//! Contact records and the normalization rules applied while building them.

use serde::{Deserialize, Serialize};

/// Fallback for vendor labels that are absent or not in the wrapped format.
pub const OTHER_LABEL: &str = "other";

/// Display name used when a contact has neither a name nor an organization.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Maximum number of trailing digits used as a phone index key.
pub const PHONE_KEY_DIGITS: usize = 10;

/// One phone number attached to a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneEntry {
    /// Raw value as stored in the source database
    pub value: String,
    /// Cleaned label ("mobile", "home", "work", "other", ...)
    pub label: String,
    /// Digits-only form, keeping a leading `+` when present
    pub normalized: String,
}

/// One email address attached to a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailEntry {
    /// Raw value as stored in the source database
    pub value: String,
    /// Cleaned label
    pub label: String,
}

/// A contact decoded from the backup's address book database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Source-database row id
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization: Option<String>,
    pub phones: Vec<PhoneEntry>,
    pub emails: Vec<EmailEntry>,
    /// Derived from name parts, organization, or [`UNKNOWN_NAME`]
    pub display_name: String,
}

/// Which index produced a lookup hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Phone,
    Email,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Phone => "phone",
            MatchKind::Email => "email",
        }
    }
}

/// A successful contact lookup, tagged with the index that matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMatch {
    pub contact: Contact,
    pub matched_by: MatchKind,
}

/// Size counters for the open store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactStoreStats {
    pub contact_count: usize,
    pub phone_index_size: usize,
    pub email_index_size: usize,
}

/// Unwrap a vendor label of the form `_$!<Label>!$_` to a lowercase string.
///
/// Absent labels and labels not in the wrapped format both clean to
/// [`OTHER_LABEL`].
pub(crate) fn clean_label(raw: Option<&str>) -> String {
    raw.and_then(|label| label.strip_prefix("_$!<"))
        .and_then(|label| label.strip_suffix(">!$_"))
        .map(str::to_lowercase)
        .unwrap_or_else(|| OTHER_LABEL.to_string())
}

/// Compute the display name: name parts first, then organization, then
/// [`UNKNOWN_NAME`].
pub(crate) fn display_name(
    first_name: Option<&str>,
    last_name: Option<&str>,
    organization: Option<&str>,
) -> String {
    let first = first_name.map(str::trim).filter(|part| !part.is_empty());
    let last = last_name.map(str::trim).filter(|part| !part.is_empty());

    if first.is_some() || last.is_some() {
        return first
            .into_iter()
            .chain(last)
            .collect::<Vec<_>>()
            .join(" ");
    }

    organization
        .map(str::trim)
        .filter(|org| !org.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

/// Strip punctuation from a phone number, keeping a leading `+`.
pub(crate) fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') {
        format!("+{}", digits)
    } else {
        digits
    }
}

/// Phone index key: the trailing [`PHONE_KEY_DIGITS`] digits of a number,
/// or all of them when shorter. Numbers with no digits produce no key.
pub(crate) fn trailing_digits_key(number: &str) -> Option<String> {
    let digits: Vec<char> = number.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let start = digits.len().saturating_sub(PHONE_KEY_DIGITS);
    Some(digits[start..].iter().collect())
}
