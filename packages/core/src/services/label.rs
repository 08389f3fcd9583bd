//! Serial Version Labels
//!
//! Labels are `major.minor` strings. A new version bumps the minor number by
//! default, or the major number when the caller asks for a major version
//! through the `versionType` metadata entry. The same calculation re-derives
//! labels for the corruption-repair path.

use crate::models::PropertyValue;
use std::collections::BTreeMap;

/// Metadata key a caller uses to request a major version.
pub const META_VERSION_TYPE: &str = "versionType";
/// Value of [`META_VERSION_TYPE`] requesting a major bump.
pub const VERSION_TYPE_MAJOR: &str = "major";

/// Compute the label following `previous` for the given version metadata.
///
/// A missing or unparseable previous label starts the history at `1.0`.
pub fn next_label(
    previous: Option<&str>,
    metadata: &BTreeMap<String, PropertyValue>,
) -> String {
    let major_bump = metadata
        .get(META_VERSION_TYPE)
        .and_then(|v| v.as_text())
        .map(|t| t.eq_ignore_ascii_case(VERSION_TYPE_MAJOR))
        .unwrap_or(false);

    match previous.and_then(parse_label) {
        None => "1.0".to_string(),
        Some((major, _)) if major_bump => format!("{}.0", major + 1),
        Some((major, minor)) => format!("{}.{}", major, minor + 1),
    }
}

fn parse_label(label: &str) -> Option<(u32, u32)> {
    let (major, minor) = label.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}
