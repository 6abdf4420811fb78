//! Priority label ranking.
//!
//! Maps free-text priority labels onto a fixed total order. Unknown labels
//! all share one rank past the end of the table, so the sort's title
//! tie-break fully determines their relative order instead of this module
//! inventing one.

/// Known priority buckets, most urgent first. Positions are sort ranks.
pub const PRIORITY_ORDER: [&str; 9] = [
    "remember",
    "quick-task",
    "1st-priority",
    "2nd-priority",
    "3rd-priority",
    "4th-priority",
    "5th-priority",
    "errand",
    "meetings",
];

/// Shared rank for every label not in [`PRIORITY_ORDER`].
pub const UNRANKED: usize = PRIORITY_ORDER.len() + 1;

/// Lowercase, collapse runs of non-alphanumerics to a single hyphen, strip
/// edge hyphens. `"2nd Priority "` → `"2nd-priority"`.
pub fn normalize_priority_label(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Fold ordinal spelling variants onto the canonical tier names.
fn canonical_priority(slug: &str) -> &str {
    match slug {
        "1st" | "first" | "first-priority" => "1st-priority",
        "2nd" | "second" | "second-priority" => "2nd-priority",
        "3rd" | "third" | "third-priority" => "3rd-priority",
        "4th" | "fourth" | "fourth-priority" => "4th-priority",
        "5th" | "fifth" | "fifth-priority" => "5th-priority",
        other => other,
    }
}

/// Rank a raw priority label for sorting. Absent, blank, and unknown labels
/// all land in the shared [`UNRANKED`] bucket.
pub fn priority_sort_index(label: Option<&str>) -> usize {
    let Some(raw) = label else {
        return UNRANKED;
    };
    let slug = normalize_priority_label(raw);
    if slug.is_empty() {
        return UNRANKED;
    }
    let canonical = canonical_priority(&slug);
    PRIORITY_ORDER
        .iter()
        .position(|p| *p == canonical)
        .unwrap_or(UNRANKED)
}
