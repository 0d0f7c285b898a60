use std::sync::LazyLock;

use regex::Regex;
use semver::Version;

/// First dotted numeric run in a tag, e.g. "3.18" in "alpine3.18-slim"
static COERCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d])(\d{1,16})(?:\.(\d{1,16}))?(?:\.(\d{1,16}))?(?:$|[^\d])")
        .expect("coercion pattern is valid")
});

/// How a tag maps onto semantic versioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionKind {
    /// Parses as strict semver (after dropping a leading `v`)
    Semver(Version),
    /// Not strict semver, but a numeric triplet could be extracted
    Coerced(Version),
    /// No semver-shaped content at all
    NonSemver,
}

impl VersionKind {
    pub fn version(&self) -> Option<&Version> {
        match self {
            VersionKind::Semver(v) | VersionKind::Coerced(v) => Some(v),
            VersionKind::NonSemver => None,
        }
    }

    pub fn is_semver(&self) -> bool {
        self.version().is_some()
    }
}

/// Classify a tag, trying strict parsing before coercion.
///
/// Examples:
/// - "1.2.3" -> Semver(1.2.3)
/// - "v1.2.3-rc.1" -> Semver(1.2.3-rc.1)
/// - "1.2" -> Coerced(1.2.0)
/// - "3.18-alpine" -> Coerced(3.18.0)
/// - "latest" -> NonSemver
pub fn parse_tag(tag: &str) -> VersionKind {
    let stripped = tag.strip_prefix('v').unwrap_or(tag);
    if let Ok(version) = Version::parse(stripped) {
        return VersionKind::Semver(version);
    }
    match coerce(stripped) {
        Some(version) => VersionKind::Coerced(version),
        None => VersionKind::NonSemver,
    }
}

/// Whether a tag parses or coerces to a semantic version
pub fn is_semver(tag: &str) -> bool {
    parse_tag(tag).is_semver()
}

/// Extract the first `major[.minor[.patch]]` run, padding missing parts with zero
pub fn coerce(tag: &str) -> Option<Version> {
    let caps = COERCE_RE.captures(tag)?;
    let part = |i: usize| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    Some(Version::new(part(1)?, part(2)?, part(3)?))
}
