use autotag_protocol::Stage;
use autotag_repository::{Repository, RepositoryError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::JobError;

/// Counts reported by [`upload_tree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub folders_created: usize,
    pub files_uploaded: usize,
}

/// Create `name` under `parent_id`, or reuse an existing folder of that name
/// left behind by an earlier attempt. Returns the folder id and whether it
/// was newly created.
pub(crate) async fn ensure_folder(
    repo: &dyn Repository,
    parent_id: &str,
    name: &str,
) -> Result<(String, bool), RepositoryError> {
    match repo.create_folder(parent_id, name).await {
        Ok(id) => Ok((id, true)),
        Err(e) if e.is_conflict() => {
            let existing = repo
                .list_children(parent_id)
                .await?
                .into_iter()
                .find(|c| c.is_folder && c.name == name);
            match existing {
                Some(folder) => {
                    debug!(parent_id, name, folder_id = %folder.id, "Reusing existing folder");
                    Ok((folder.id, false))
                }
                None => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// Mirror the local tree under `local_root` into the remote folder
/// `remote_root`.
///
/// Pre-order walk: a directory's remote folder exists before anything inside
/// it is uploaded. Entries are visited in file-name order.
pub async fn upload_tree(
    repo: &dyn Repository,
    local_root: &Path,
    remote_root: &str,
) -> Result<UploadSummary, JobError> {
    let mut folders: HashMap<PathBuf, String> = HashMap::new();
    folders.insert(local_root.to_path_buf(), remote_root.to_string());
    let mut summary = UploadSummary::default();

    for entry in WalkDir::new(local_root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| JobError::transient(Stage::Upload, e.to_string()))?;
        let path = entry.path();

        let parent_id = path
            .parent()
            .and_then(|p| folders.get(p))
            .cloned()
            .ok_or_else(|| {
                JobError::fatal(
                    Stage::Upload,
                    format!("No remote folder for {}", path.display()),
                )
            })?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if entry.file_type().is_dir() {
            let (folder_id, created) = ensure_folder(repo, &parent_id, &name)
                .await
                .map_err(upload_error)?;
            if created {
                summary.folders_created += 1;
            }
            folders.insert(path.to_path_buf(), folder_id);
        } else if entry.file_type().is_file() {
            let node_id = repo
                .upload_file(&parent_id, path, &name)
                .await
                .map_err(upload_error)?;
            summary.files_uploaded += 1;
            debug!(file = %name, node_id = %node_id, "Uploaded file");
        }
    }

    info!(
        folders = summary.folders_created,
        files = summary.files_uploaded,
        remote_root,
        "Upload complete"
    );
    Ok(summary)
}

/// Upload failures are retryable whatever the response code.
fn upload_error(e: RepositoryError) -> JobError {
    JobError::transient(Stage::Upload, e.to_string())
}
