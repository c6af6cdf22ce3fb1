//! Folder-scoped tagging rules.
//!
//! Rule files live in a mirror tree under `RULE_BASED_TAGS`: the rules for
//! `/Company Home/Courses/Real Estate/...` are looked up in
//! `RULE_BASED_TAGS/Courses`, then `RULE_BASED_TAGS/Courses/Real Estate`, and
//! so on. Each rule maps a course-relative path to a list of tags.

pub mod discovery;
pub mod loader;
pub mod matcher;

pub use discovery::{find_nearest_rule, resolve_path};
pub use loader::{load_rules, parse_rules, RuleSet};
pub use matcher::{match_rules, relative_path};

use autotag_protocol::defaults::REPOSITORY_ROOT_LABEL;

/// Non-empty segments of a repository path, without the root label.
pub(crate) fn path_segments(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.first() == Some(&REPOSITORY_ROOT_LABEL) {
        parts.remove(0);
    }
    parts
}
