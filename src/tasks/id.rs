//! Identifier and slug generation.
//!
//! A slug is the lowercase ASCII-alphanumeric runs of a name joined by single
//! hyphens, e.g. `"Fix: the bug (urgent)"` becomes `fix-the-bug-urgent`.
//! Slugs must be unique among their siblings (projects globally, tasks within
//! a project). Record IDs are a shorter slug plus a 4-hex-digit suffix, so
//! they stay readable in CLI output.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum length of a slug.
pub const MAX_SLUG_LEN: usize = 50;

/// Maximum length of the slug part of a generated ID.
const ID_SLUG_LEN: usize = 30;

/// Slug used when a name contains no usable characters.
pub const FALLBACK_SLUG: &str = "untitled";

/// Identifiers accepted from callers: IDs and slugs alike.
static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,127}$").expect("valid identifier regex"));

/// Convert a name to a slug.
///
/// Returns an empty string if nothing alphanumeric survives; callers that need
/// a non-empty slug use [`slug_for`].
#[must_use]
pub fn slugify(name: &str) -> String {
    slugify_with_max_len(name, MAX_SLUG_LEN)
}

/// Convert a name to a slug with a custom maximum length.
#[must_use]
pub fn slugify_with_max_len(name: &str, max_len: usize) -> String {
    let words = name.split(|c: char| !c.is_ascii_alphanumeric()).filter(|w| !w.is_empty());

    let mut slug = String::with_capacity(name.len().min(max_len));
    for word in words {
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.extend(word.chars().map(|c| c.to_ascii_lowercase()));
        if slug.len() >= max_len {
            break;
        }
    }

    slug.truncate(max_len);
    slug.truncate(slug.trim_end_matches('-').len());
    slug
}

/// Slug for a name, never empty.
#[must_use]
pub fn slug_for(name: &str) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Pick the first slug derived from `base` that `taken` does not reject.
///
/// Tries `base`, then `base-2`, `base-3`, ...
///
/// # Errors
///
/// Propagates errors from `taken`.
pub fn unique_slug(base: &str, mut taken: impl FnMut(&str) -> Result<bool>) -> Result<String> {
    if !taken(base)? {
        return Ok(base.to_string());
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Four hex digits drawn from a randomly keyed hasher.
///
/// A process-wide counter is mixed in so back-to-back calls differ even when
/// the clock does not move.
fn random_suffix() -> String {
    static CALLS: AtomicU64 = AtomicU64::new(0);

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(CALLS.fetch_add(1, Ordering::Relaxed));
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().subsec_nanos();
    hasher.write_u32(nanos);
    format!("{:04x}", hasher.finish() & 0xffff)
}

/// Generate a record ID from a name.
///
/// The ID is the slugified name (at most 30 characters) plus a 4-character
/// random hex suffix. `fallback` is used in place of the slug when the name
/// has no usable characters.
#[must_use]
pub fn generate_id(name: &str, fallback: &str) -> String {
    let slug = slugify_with_max_len(name, ID_SLUG_LEN);
    let base = if slug.is_empty() { fallback } else { slug.as_str() };
    format!("{base}-{}", random_suffix())
}

/// Reject identifiers that cannot possibly name a record.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for empty or malformed identifiers.
pub fn validate_identifier(ident: &str) -> Result<()> {
    if IDENTIFIER_RE.is_match(ident) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("malformed identifier: '{ident}'")))
    }
}
