//! # Identity Matcher
//!
//! Decides whether a local item and a remote item denote the same title.
//!
//! Two items match when both carry a valid external identifier and the
//! identifiers are equal, or when their titles are equal ignoring case and
//! their years are equal. Identifiers are globally unique, so a match on them
//! holds even when the titles differ (localized or alternative titles). There
//! is no partial title matching.

use bridge_traits::{LocalItem, RemoteItem};

const ID_PREFIX: &str = "tt";
const MIN_ID_DIGITS: usize = 7;

/// Canonical form of an external identifier, or `None` when it is invalid.
///
/// Accepted forms are `tt` followed by at least seven digits, and a bare digit
/// string which is prefixed and zero-padded to seven digits.
///
/// ```
/// use core_sync::identity::normalize_external_id;
///
/// assert_eq!(normalize_external_id("tt0113277").as_deref(), Some("tt0113277"));
/// assert_eq!(normalize_external_id("113277").as_deref(), Some("tt0113277"));
/// assert_eq!(normalize_external_id("tt123"), None);
/// assert_eq!(normalize_external_id(""), None);
/// ```
pub fn normalize_external_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();

    let (digits, prefixed) = match trimmed.get(..ID_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(ID_PREFIX) => {
            (&trimmed[ID_PREFIX.len()..], true)
        }
        _ => (trimmed, false),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    // An all-zero number is a placeholder some scrapers write
    if digits.bytes().all(|b| b == b'0') {
        return None;
    }

    if prefixed {
        if digits.len() < MIN_ID_DIGITS {
            return None;
        }
        Some(format!("{}{}", ID_PREFIX, digits))
    } else {
        Some(format!("{}{:0>width$}", ID_PREFIX, digits, width = MIN_ID_DIGITS))
    }
}

pub fn is_valid_external_id(raw: &str) -> bool {
    normalize_external_id(raw).is_some()
}

fn ids_match(a: &str, b: &str) -> bool {
    match (normalize_external_id(a), normalize_external_id(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn titles_equal(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

fn title_year_match(
    title_a: &str,
    year_a: Option<i32>,
    title_b: &str,
    year_b: Option<i32>,
) -> bool {
    year_a == year_b && titles_equal(title_a, title_b)
}

/// Whether `local` and `remote` denote the same title.
pub fn matches(local: &LocalItem, remote: &RemoteItem) -> bool {
    ids_match(&local.external_id, &remote.external_id)
        || title_year_match(&local.title, local.year, &remote.title, remote.year)
}

/// Position of the first local item matching the given identity.
pub fn find_local_match(
    items: &[LocalItem],
    title: &str,
    year: Option<i32>,
    external_id: &str,
) -> Option<usize> {
    items.iter().position(|item| {
        ids_match(&item.external_id, external_id)
            || title_year_match(&item.title, item.year, title, year)
    })
}
