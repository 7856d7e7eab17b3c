//! Semantic version tag classification
//!
//! Parses `vMAJOR.MINOR.PATCH` style tags (leading `v` optional) and
//! decides whether a tag marks a major version boundary.

use std::sync::LazyLock;

use regex::Regex;

/// Tags must be a bare three-component version, optionally `v`-prefixed.
/// Compiled once at first use.
static SEMVER_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)$").expect("semver tag regex is valid"));

/// Parsed semantic version tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Semver {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// The tag exactly as it arrived, prefix and whitespace included
    pub raw: String,
    /// Canonical `MAJOR.MINOR.PATCH` form
    pub normalized: String,
}

/// Parses a tag into its semver components.
///
/// Whitespace around the tag is tolerated; anything that is not exactly
/// three numeric components (pre-release suffixes, two-component tags)
/// returns `None`.
pub fn parse_semver_tag(tag: &str) -> Option<Semver> {
    let captures = SEMVER_TAG_RE.captures(tag.trim())?;

    let major: u64 = captures.get(1)?.as_str().parse().ok()?;
    let minor: u64 = captures.get(2)?.as_str().parse().ok()?;
    let patch: u64 = captures.get(3)?.as_str().parse().ok()?;

    Some(Semver {
        major,
        minor,
        patch,
        raw: tag.to_string(),
        normalized: format!("{}.{}.{}", major, minor, patch),
    })
}

/// Returns true when the tag is an `X.0.0` release with `X >= 1`.
pub fn is_major_version_tag(tag: &str) -> bool {
    match parse_semver_tag(tag) {
        Some(semver) => semver.major >= 1 && semver.minor == 0 && semver.patch == 0,
        None => false,
    }
}
