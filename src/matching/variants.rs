//! Strict variant tags
//!
//! Some tags describe a different set of bytes even when everything else
//! about two releases agrees (an IMAX cut is not the theatrical cut, a
//! REPACK supersedes the original). For every tag in the curated list that
//! is present on either side, the other side must carry it too.
//!
//! The list is data, not control flow: adding a required-match tag is a
//! one-line addition here.

use std::collections::BTreeSet;

use crate::release::ParsedRelease;

/// Tags that must be present on both sides or neither
pub const STRICT_VARIANT_TAGS: &[&str] = &[
    "IMAX", "HYBRID", "PROPER", "RERIP", "OPEN MATTE", "REPACK", "REPACK2", "REPACK3", "REPACK4",
    "REPACK5", "REPACK6", "REPACK7", "REPACK8", "REPACK9", "REPACK10",
];

/// Collect the strict variants a release carries.
///
/// Variants are detected from the `collection` field and from token-split
/// forms of the `other`, `edition`, and `cut` fields.
pub fn strict_variants(release: &ParsedRelease) -> BTreeSet<&'static str> {
    let mut found = BTreeSet::new();

    let mut scan = |text: &str| {
        let upper = text.to_uppercase();
        for tag in STRICT_VARIANT_TAGS {
            if tag.contains(' ') {
                if upper.contains(tag) {
                    found.insert(*tag);
                }
            } else if upper
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|token| token == *tag)
            {
                found.insert(*tag);
            }
        }
    };

    if let Some(collection) = &release.collection {
        scan(collection);
    }
    for field in [&release.other, &release.edition, &release.cut] {
        for value in field {
            scan(value);
        }
    }

    found
}

/// Whether two releases carry the same strict variants.
///
/// Symmetric by construction: a tag present on exactly one side fails both
/// directions.
pub fn strict_variants_match(a: &ParsedRelease, b: &ParsedRelease) -> bool {
    strict_variants(a) == strict_variants(b)
}
