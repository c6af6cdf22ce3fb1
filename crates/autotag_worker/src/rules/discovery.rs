use autotag_protocol::defaults::{RULE_FILE_SUFFIX, RULE_ROOT};
use autotag_repository::{Repository, RepositoryError, ROOT_NODE_ID};
use tracing::{debug, info};

use super::path_segments;

/// Folder segments of an event path: root label and trailing file name
/// removed. A last segment counts as a file name when it contains a dot.
fn content_segments(event_path: &str) -> Vec<&str> {
    let mut parts = path_segments(event_path);
    if parts.last().is_some_and(|last| last.contains('.')) {
        parts.pop();
    }
    parts
}

/// Find the rule file closest to the repository root that covers
/// `event_path`.
///
/// For `/Company Home/Courses/Real Estate/Module1/file.png` the candidates
/// are `RULE_BASED_TAGS/Courses` then `RULE_BASED_TAGS/Courses/Real Estate`.
/// The first candidate folder holding a `*_tags.csv` wins. `None` means no
/// rule applies.
pub async fn find_nearest_rule(
    repo: &dyn Repository,
    event_path: &str,
) -> Result<Option<String>, RepositoryError> {
    let segments = content_segments(event_path);

    for depth in 1..segments.len() {
        let mut candidate = Vec::with_capacity(depth + 1);
        candidate.push(RULE_ROOT);
        candidate.extend_from_slice(&segments[..depth]);

        let Some(folder_id) = resolve_path(repo, &candidate).await? else {
            continue;
        };

        let children = repo.list_children(&folder_id).await?;
        if let Some(rule) = children
            .into_iter()
            .find(|c| c.name.to_lowercase().ends_with(RULE_FILE_SUFFIX))
        {
            info!(
                rule_folder = %candidate.join("/"),
                rule_file = %rule.name,
                rule_id = %rule.id,
                "Rule file discovered"
            );
            return Ok(Some(rule.id));
        }
    }

    Ok(None)
}

/// Resolve a folder path from the repository root by exact child-name match
/// at each level. A missing segment yields `None`.
pub async fn resolve_path(
    repo: &dyn Repository,
    segments: &[&str],
) -> Result<Option<String>, RepositoryError> {
    let mut current = ROOT_NODE_ID.to_string();

    for segment in segments {
        let children = repo.list_children(&current).await?;
        match children.into_iter().find(|c| c.name == *segment) {
            Some(child) => current = child.id,
            None => {
                debug!(parent_id = %current, segment, "Path segment not found");
                return Ok(None);
            }
        }
    }

    Ok(Some(current))
}
