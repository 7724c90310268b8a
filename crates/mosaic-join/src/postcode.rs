//! Postcode normalization and shard routing.
//!
//! A postcode is joined on its canonical form (all whitespace removed, case
//! preserved) and routed by a shard key taken from its leading letters:
//! two letters unless the second character is a digit, in which case one.
//!
//! ```
//! use mosaic_join::postcode::normalize;
//!
//! let routed = normalize("AB1 2CD");
//! assert_eq!(routed.postcode, "AB12CD");
//! assert_eq!(routed.shard.unwrap().as_str(), "ab");
//!
//! let routed = normalize("Z99 9ZZ");
//! assert_eq!(routed.shard.unwrap().as_str(), "z");
//! ```

use mosaic_core::ShardKey;

/// A postcode reduced to its join key and shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedPostcode {
    /// Postcode with all whitespace removed
    pub postcode: String,
    /// Shard the postcode belongs to, `None` when it cannot be routed
    pub shard: Option<ShardKey>,
}

/// Remove all whitespace from a postcode.
#[must_use]
pub fn canonical(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Normalize a reference-file postcode: whitespace and double quotes removed.
#[must_use]
pub fn canonical_reference(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '"')
        .collect()
}

/// Derive the shard key from a canonical postcode.
///
/// Returns `None` if the postcode is empty, does not start with an ASCII
/// letter, or has a second character that is neither a letter nor a digit.
#[must_use]
pub fn shard_key(canonical: &str) -> Option<ShardKey> {
    let mut chars = canonical.chars();
    let first = chars.next().filter(char::is_ascii_alphabetic)?;

    let mut key = String::with_capacity(2);
    key.push(first.to_ascii_lowercase());
    match chars.next() {
        Some(second) if second.is_ascii_alphabetic() => key.push(second.to_ascii_lowercase()),
        Some(second) if second.is_ascii_digit() => {}
        Some(_) => return None,
        None => {}
    }

    ShardKey::new(key)
}

/// Canonicalize a raw postcode and route it to a shard.
#[must_use]
pub fn normalize(raw: &str) -> RoutedPostcode {
    let postcode = canonical(raw);
    let shard = shard_key(&postcode);
    RoutedPostcode { postcode, shard }
}
