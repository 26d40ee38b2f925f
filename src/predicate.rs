//! Predicate primitives shared by registry discovery, matching and
//! biological search.
//!
//! All text comparisons are case-insensitive. An absent (or empty) query term
//! always matches; a present term never matches an absent target value.

/// Case-insensitive substring match.
///
/// `needle = None` matches anything; `haystack = None` matches nothing else.
#[must_use]
pub fn text_contains(needle: Option<&str>, haystack: Option<&str>) -> bool {
    match (needle, haystack) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(needle), Some(haystack)) => haystack.to_lowercase().contains(&needle.to_lowercase()),
    }
}

/// Case-insensitive equality.
#[must_use]
pub fn text_eq(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// True if the two lists share at least one element (case-insensitive).
///
/// An absent or empty query list matches anything.
#[must_use]
pub fn overlaps_any<A, B>(query: Option<&[A]>, target: &[B]) -> bool
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    match query {
        None => true,
        Some(query) if query.is_empty() => true,
        Some(query) => query
            .iter()
            .any(|q| target.iter().any(|t| text_eq(q.as_ref(), t.as_ref()))),
    }
}

/// Exact match on a flag when the query specifies one.
#[must_use]
pub fn flag_matches(expected: Option<bool>, actual: bool) -> bool {
    expected.map_or(true, |expected| expected == actual)
}

/// True if every `required` tag is present in `have` (case-insensitive).
#[must_use]
pub fn contains_all<A, B>(required: &[A], have: &[B]) -> bool
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    required
        .iter()
        .all(|r| have.iter().any(|h| text_eq(r.as_ref(), h.as_ref())))
}

/// Number of distinct `wanted` tags present in `have` (case-insensitive).
#[must_use]
pub fn overlap_count<A, B>(wanted: &[A], have: &[B]) -> usize
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let mut seen: Vec<String> = Vec::with_capacity(wanted.len());
    for w in wanted {
        let w = w.as_ref().to_lowercase();
        if seen.contains(&w) {
            continue;
        }
        if have.iter().any(|h| h.as_ref().to_lowercase() == w) {
            seen.push(w);
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_contains() {
        assert!(text_contains(None, None));
        assert!(text_contains(None, Some("HeLa")));
        assert!(!text_contains(Some("hela"), None));
        assert!(text_contains(Some("hela"), Some("HeLa S3")));
        assert!(!text_contains(Some("MCF"), Some("HeLa")));
    }

    #[test]
    fn test_overlaps_any() {
        let target = vec!["GFP".to_string(), "mCherry".to_string()];
        assert!(overlaps_any::<String, _>(None, &target));
        assert!(overlaps_any::<&str, _>(Some(&[][..]), &target));
        assert!(overlaps_any(Some(&["gfp"][..]), &target));
        assert!(!overlaps_any(Some(&["YFP"][..]), &target));
        assert!(!overlaps_any(Some(&["YFP"][..]), &Vec::<String>::new()));
    }

    #[test]
    fn test_flag_matches() {
        assert!(flag_matches(None, false));
        assert!(flag_matches(Some(true), true));
        assert!(!flag_matches(Some(true), false));
    }

    #[test]
    fn test_contains_all_and_overlap() {
        let have = ["3d_imaging", "Live_Cell", "time_lapse"];
        assert!(contains_all(&["live_cell", "3D_IMAGING"], &have));
        assert!(!contains_all(&["deconvolution"], &have));
        assert!(contains_all::<&str, _>(&[], &have));

        assert_eq!(overlap_count(&["live_cell", "LIVE_CELL", "x"], &have), 1);
        assert_eq!(overlap_count(&["live_cell", "time_lapse"], &have), 2);
    }
}
