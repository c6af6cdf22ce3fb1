//! Folder-rule tagging job.
//!
//! Flow: path → nearest rule file → rules → matched tags → missing tags
//! added. "No path" and "no applicable rule" are skips, not failures.

use autotag_protocol::{node_id, JobReceipt, RepoEvent, Stage};
use autotag_repository::{Repository, RepositoryError};
use tracing::{debug, info};

use crate::error::JobError;
use crate::metrics::TAGS_ADDED;
use crate::rules::{find_nearest_rule, load_rules, match_rules};

/// Attach `tags` to the node, skipping ones it already carries.
///
/// A 409 from the add call means another run got there first and counts as
/// success. Returns the number of tags actually added.
pub async fn apply_tags(
    repo: &dyn Repository,
    node_ref: &str,
    tags: &[String],
) -> Result<usize, RepositoryError> {
    let node = node_id(node_ref);
    let existing = repo.list_tags(node).await?;

    let missing: Vec<&String> = tags.iter().filter(|t| !existing.contains(*t)).collect();
    if missing.is_empty() {
        info!(node_ref, "All tags already present, skipping");
        return Ok(0);
    }

    let mut added = 0;
    for tag in missing {
        match repo.add_tag(node, tag).await {
            Ok(()) => {
                added += 1;
                info!(node_id = node, tag = %tag, "Tag applied");
            }
            Err(e) if e.is_conflict() => {
                debug!(node_id = node, tag = %tag, "Tag already present");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(added)
}

/// Run the tagging flow for one event.
pub async fn tag_node(repo: &dyn Repository, event: &RepoEvent) -> Result<JobReceipt, JobError> {
    let node_ref = event.node_ref.as_str();

    let Some(path) = event.path() else {
        info!(node_ref, stage = %Stage::Discovery, "Event has no path, skipping");
        return Ok(JobReceipt::skipped(Stage::Discovery, "event has no path"));
    };

    let rule_id = find_nearest_rule(repo, path)
        .await
        .map_err(|e| JobError::repository(Stage::Discovery, e))?;
    let Some(rule_id) = rule_id else {
        info!(node_ref, path, stage = %Stage::Discovery, "No applicable rule found");
        return Ok(JobReceipt::skipped(Stage::Discovery, "no applicable rule"));
    };

    let rules = load_rules(repo, &rule_id)
        .await
        .map_err(|e| JobError::repository(Stage::LoadRules, e))?;

    let tags = match_rules(path, &rules);
    if tags.is_empty() {
        info!(node_ref, path, stage = %Stage::Match, "No rule row matches path");
        return Ok(JobReceipt::skipped(Stage::Match, "no matching rule row"));
    }

    let added = apply_tags(repo, node_ref, &tags)
        .await
        .map_err(|e| JobError::repository(Stage::ApplyTags, e))?;

    info!(node_ref, path, matched = tags.len(), added, "Tagging complete");
    Ok(JobReceipt::success().with_metric(TAGS_ADDED, added as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotag_test_utils::{FakeRepository, Op};

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_adds_only_missing_tags() {
        let repo = FakeRepository::new();
        let folder = repo.mkdirs("Courses");
        let file = repo.add_file(&folder, "file.png", b"png");
        repo.add_tag(&file, "ECM").await.unwrap();

        let node_ref = format!("workspace://SpacesStore/{}", file);
        let added = apply_tags(&repo, &node_ref, &tags(&["ECM", "Real Estate"]))
            .await
            .unwrap();

        assert_eq!(added, 1);
        assert_eq!(repo.tags(&file), vec!["ECM", "Real Estate"]);
    }

    #[tokio::test]
    async fn test_nothing_missing_is_a_no_op() {
        let repo = FakeRepository::new();
        let folder = repo.mkdirs("Courses");
        let file = repo.add_file(&folder, "file.png", b"png");
        repo.add_tag(&file, "ECM").await.unwrap();
        let before = repo.count(Op::AddTag);

        let added = apply_tags(&repo, &file, &tags(&["ECM"])).await.unwrap();
        assert_eq!(added, 0);
        assert_eq!(repo.count(Op::AddTag), before);
    }

    #[tokio::test]
    async fn test_conflict_counts_as_success() {
        let repo = FakeRepository::new();
        let folder = repo.mkdirs("Courses");
        let file = repo.add_file(&folder, "file.png", b"png");
        repo.fail_next(Op::AddTag, 409, 1);

        let added = apply_tags(&repo, &file, &tags(&["A", "B"])).await.unwrap();
        assert_eq!(added, 1);
        assert_eq!(repo.tags(&file), vec!["B"]);
    }

    #[tokio::test]
    async fn test_other_add_failures_propagate() {
        let repo = FakeRepository::new();
        let folder = repo.mkdirs("Courses");
        let file = repo.add_file(&folder, "file.png", b"png");
        repo.fail_next(Op::AddTag, 500, 1);

        let err = apply_tags(&repo, &file, &tags(&["A"])).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Status { status: 500, .. }));
    }
}
