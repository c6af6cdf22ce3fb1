use super::loader::{normalize_key, RuleSet};
use super::path_segments;

/// Path of an event relative to its course folder.
///
/// `/Company Home/Courses/Real Estate/Module1/file.png` becomes
/// `Module1/file.png`: the content root and course segments are dropped.
/// Paths with fewer than three segments below the root label have no
/// course-relative part.
pub fn relative_path(event_path: &str) -> Option<String> {
    let parts = path_segments(event_path);
    if parts.len() < 3 {
        return None;
    }
    Some(parts[2..].join("/"))
}

/// Tags of every rule whose key equals the event's course-relative path.
///
/// Comparison is exact and case-sensitive after trimming and stripping
/// leading slashes on both sides. The result keeps first-seen order without
/// duplicates.
pub fn match_rules(event_path: &str, rules: &RuleSet) -> Vec<String> {
    let Some(relative) = relative_path(event_path) else {
        return Vec::new();
    };
    let relative = normalize_key(&relative);

    let mut matched: Vec<String> = Vec::new();
    for (key, tags) in rules.iter() {
        if normalize_key(key) != relative {
            continue;
        }
        for tag in tags {
            if !matched.contains(tag) {
                matched.push(tag.clone());
            }
        }
    }
    matched
}
