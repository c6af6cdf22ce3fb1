use autotag_protocol::defaults::{ARCHIVE_EXTENSION, ARCHIVE_MIME_TYPES};
use autotag_protocol::{EventType, JobReceipt, RepoEvent, Stage};
use autotag_repository::Repository;
use tracing::{info, warn};

use super::detect::detect_package;
use super::extract::safe_extract;
use super::upload::{ensure_folder, upload_tree};
use crate::error::JobError;
use crate::metrics::{FILES_UPLOADED, FOLDERS_CREATED};

/// File name of the archive an event refers to, or why the event is not a
/// package candidate.
///
/// Candidates are `BINARY_CHANGED` events for a `.zip` file (any case) whose
/// declared content type, when present, is one of the archive types.
pub fn archive_name(event: &RepoEvent) -> Result<&str, String> {
    if event.event_type != EventType::BinaryChanged {
        return Err(format!("event type {} is not a binary change", event.event_type));
    }

    let name = event
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or_else(|| event.path().and_then(|p| p.rsplit('/').find(|s| !s.is_empty())))
        .ok_or_else(|| "event has no file name".to_string())?;

    if archive_stem(name).is_none() {
        return Err(format!("{} is not a .{} archive", name, ARCHIVE_EXTENSION));
    }

    if let Some(mime) = event.mime_type.as_deref() {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if !ARCHIVE_MIME_TYPES.contains(&essence.as_str()) {
            return Err(format!("content type {} is not an archive type", mime));
        }
    }

    Ok(name)
}

/// `course.ZIP` → `course`; `None` when the extension does not match or
/// nothing precedes it.
fn archive_stem(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    (ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION) && !stem.is_empty()).then_some(stem)
}

async fn run_blocking<T, F>(stage: Stage, f: F) -> Result<T, JobError>
where
    F: FnOnce() -> Result<T, JobError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| JobError::transient(stage, format!("Blocking task failed: {}", e)))?
}

/// Ingest one package archive.
///
/// Download → detect → create folder → extract → upload. The scratch
/// directory is removed when this returns, on every path.
pub async fn process_package(
    repo: &dyn Repository,
    event: &RepoEvent,
) -> Result<JobReceipt, JobError> {
    let node_ref = event.node_ref.as_str();

    let name = match archive_name(event) {
        Ok(name) => name,
        Err(reason) => {
            info!(node_ref, stage = %Stage::Filter, reason = %reason, "Not a package candidate, skipping");
            return Ok(JobReceipt::skipped(Stage::Filter, reason));
        }
    };
    let folder_name = archive_stem(name).unwrap_or(name);
    let parent_id = event
        .parent_node_id()
        .ok_or_else(|| JobError::permanent(Stage::Filter, "event has no parentNodeRef"))?;

    let staging = tempfile::Builder::new()
        .prefix("autotag-package-")
        .tempdir()
        .map_err(|e| {
            JobError::transient(Stage::Download, format!("Cannot create staging directory: {}", e))
        })?;
    let archive_path = staging.path().join("archive.zip");
    let extract_dir = staging.path().join("extracted");

    // Any download failure, 404 included, means the binary may not be
    // readable yet.
    let bytes = repo
        .download_content(event.node_id(), &archive_path)
        .await
        .map_err(|e| JobError::transient(Stage::Download, e.to_string()))?;
    info!(node_ref, archive = name, bytes, "Downloaded archive");

    let detection = {
        let path = archive_path.clone();
        run_blocking(Stage::Detect, move || Ok(detect_package(&path))).await?
    };
    if !detection.is_package {
        let reason = format!("Not a package: {}", detection.errors.join("; "));
        warn!(node_ref, archive = name, stage = %Stage::Detect, reason = %reason, "Package rejected");
        return Err(JobError::permanent(Stage::Detect, reason));
    }
    if !detection.is_valid {
        let reason = format!("Invalid package: {}", detection.errors.join("; "));
        warn!(node_ref, archive = name, stage = %Stage::Detect, reason = %reason, "Package rejected");
        return Err(JobError::permanent(Stage::Detect, reason));
    }

    let (folder_id, created) = ensure_folder(repo, parent_id, folder_name)
        .await
        .map_err(|e| JobError::repository(Stage::CreateFolder, e))?;
    info!(node_ref, folder = folder_name, folder_id = %folder_id, created, "Package folder ready");

    {
        let archive_path = archive_path.clone();
        let extract_dir = extract_dir.clone();
        run_blocking(Stage::Extract, move || safe_extract(&archive_path, &extract_dir)).await?;
    }

    let summary = upload_tree(repo, &extract_dir, &folder_id).await?;

    info!(
        node_ref,
        archive = name,
        folder_id = %folder_id,
        files = summary.files_uploaded,
        "Package ingested"
    );
    Ok(JobReceipt::success()
        .with_metric(
            FOLDERS_CREATED,
            (summary.folders_created + usize::from(created)) as i64,
        )
        .with_metric(FILES_UPLOADED, summary.files_uploaded as i64))
}
