//! Deterministic dedup fingerprint over `(target, normalized field set)`.
//!
//! Two submissions proposing the same values for the same POI must collide
//! here regardless of field ordering or submission time; the consensus
//! engine uses the digest to route a resubmission onto the existing pending
//! proposal. Collision resistance is a dedup concern, not a security one.

use crate::fields::FieldSet;
use sha2::{Digest as _, Sha256};
use std::fmt::Write as _;

/// Compute the dedup fingerprint for a proposed change.
///
/// The digest input is `target_id + ":" + canonical`, where `canonical` is
/// `name=value` lines in wire-name order. [`FieldSet`] has already dropped
/// empty values and fixed the iteration order, so equal field sets always
/// serialize identically.
pub fn fingerprint(target_id: &str, fields: &FieldSet) -> String {
    let mut canonical = String::new();
    for (field, value) in fields.iter() {
        if !canonical.is_empty() {
            canonical.push('\n');
        }
        let _ = write!(&mut canonical, "{}={}", field.wire_name(), value.render());
    }

    let mut hasher = Sha256::new();
    hasher.update(target_id.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
