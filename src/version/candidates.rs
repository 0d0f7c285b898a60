//! Upgrade candidate selection
//!
//! Given the currently deployed tag and every tag a registry reports, decide
//! which tags count as an update:
//! - semver (or coercible) current tag: tags strictly greater under semver
//!   precedence, most recent first
//! - non-semver current tag: every other tag, in registry order

use regex::Regex;

use crate::version::semver::parse_tag;

/// Include/exclude regexes applied to raw tag strings
#[derive(Debug, Clone, Default)]
pub struct TagFilters {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl TagFilters {
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            include: include.map(Regex::new).transpose()?,
            exclude: exclude.map(Regex::new).transpose()?,
        })
    }

    /// Include is checked first, then exclude
    pub fn accepts(&self, tag: &str) -> bool {
        if let Some(include) = &self.include
            && !include.is_match(tag)
        {
            return false;
        }
        if let Some(exclude) = &self.exclude
            && exclude.is_match(tag)
        {
            return false;
        }
        true
    }
}

/// Compute the ordered candidate set for `current` among `available`.
///
/// An empty result means no update is available.
pub fn select_candidates(current: &str, available: &[String], filters: &TagFilters) -> Vec<String> {
    let Some(current_version) = parse_tag(current).version().cloned() else {
        return available
            .iter()
            .filter(|tag| tag.as_str() != current && filters.accepts(tag))
            .cloned()
            .collect();
    };

    let mut newer: Vec<(&String, semver::Version)> = available
        .iter()
        .filter(|tag| filters.accepts(tag))
        .filter_map(|tag| parse_tag(tag).version().cloned().map(|v| (tag, v)))
        .filter(|(_, v)| *v > current_version)
        .collect();

    newer.sort_by(|(_, a), (_, b)| b.cmp(a));

    newer.into_iter().map(|(tag, _)| tag.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("5.4.3", &["7.8.9", "4.5.6", "1.2.3"], &["7.8.9"])]
    #[case("5.4.3", &["10.11.12", "7.8.9", "4.5.6", "1.2.3"], &["10.11.12", "7.8.9"])]
    #[case("notasemver", &["10.11.12", "7.8.9", "notasemver", "1.2.3"], &["10.11.12", "7.8.9", "1.2.3"])]
    #[case("5.4.3", &[], &[])]
    #[case("notasemver", &[], &[])]
    #[case("7.8.9", &["7.8.9", "4.5.6"], &[])] // already on the greatest tag
    #[case("1.0.0", &["1.2.0", "latest", "1.1.0", "edge"], &["1.2.0", "1.1.0"])]
    #[case("v1.0.0", &["v1.1.0", "v2.0.0"], &["v2.0.0", "v1.1.0"])]
    #[case("1.2", &["1.2.1", "1.3", "1.1"], &["1.3", "1.2.1"])] // coerced current
    #[case("2.0.0", &["2.0.0-rc.1", "2.0.1-rc.1"], &["2.0.1-rc.1"])]
    fn select_candidates_without_filters(
        #[case] current: &str,
        #[case] available: &[&str],
        #[case] expected: &[&str],
    ) {
        let result = select_candidates(current, &tags(available), &TagFilters::default());
        assert_eq!(result, tags(expected));
    }

    #[rstest]
    #[case(Some(r"^\d+\.\d+\.\d+$"), None, &["2.0.0", "1.5.0"])]
    #[case(Some("^nothing$"), None, &[])]
    #[case(None, Some(r"^2\."), &["1.5.0"])]
    #[case(None, Some(".*"), &[])]
    #[case(Some(r"^\d"), Some("alpine"), &["2.0.0", "1.5.0"])]
    fn select_candidates_applies_filters(
        #[case] include: Option<&str>,
        #[case] exclude: Option<&str>,
        #[case] expected: &[&str],
    ) {
        let available = tags(&["1.5.0", "2.0.0-alpine", "2.0.0", "0.9.0"]);
        let filters = TagFilters::new(include, exclude).unwrap();
        assert_eq!(select_candidates("1.0.0", &available, &filters), tags(expected));
    }

    #[test]
    fn select_candidates_filters_non_semver_fallback() {
        let filters = TagFilters::new(Some("^stable"), Some("-rc$")).unwrap();
        let available = tags(&["stable-2", "edge", "stable-3-rc", "stable"]);

        let result = select_candidates("stable", &available, &filters);

        assert_eq!(result, tags(&["stable-2"]));
    }

    #[test]
    fn tag_filters_reject_invalid_regex() {
        assert!(TagFilters::new(Some("("), None).is_err());
    }
}
