//! In-memory stand-in for the repository REST API.

use async_trait::async_trait;
use autotag_repository::{NodeEntry, Repository, RepositoryError, ROOT_NODE_ID};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

/// Repository operations, for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListChildren,
    Download,
    ReadText,
    CreateFolder,
    Upload,
    ListTags,
    AddTag,
}

#[derive(Debug, Clone)]
struct FakeNode {
    name: String,
    is_folder: bool,
    content: Vec<u8>,
    tags: Vec<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    nodes: BTreeMap<String, FakeNode>,
    /// Child ids per parent, in creation order.
    children: HashMap<String, Vec<String>>,
    next_id: u64,
    calls: Vec<(Op, String)>,
    /// Remaining injected failures per operation, as HTTP status codes.
    failures: HashMap<Op, Vec<u16>>,
}

/// Folder tree held in memory.
///
/// Behaves like the REST client where the job layer can observe it:
/// unknown ids are `NotFound`, adding a tag the node already carries is a
/// 409, and uploads with a clashing name are renamed (`name-1.ext`).
#[derive(Debug)]
pub struct FakeRepository {
    state: Mutex<FakeState>,
}

impl Default for FakeRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRepository {
    pub fn new() -> Self {
        let mut state = FakeState::default();
        state.nodes.insert(
            ROOT_NODE_ID.to_string(),
            FakeNode {
                name: "Company Home".to_string(),
                is_folder: true,
                content: Vec::new(),
                tags: Vec::new(),
            },
        );
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake repository lock poisoned")
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Create (or reuse) the folder chain `a/b/c` under the root; returns the
    /// id of the last folder.
    pub fn mkdirs(&self, path: &str) -> String {
        let mut state = self.lock();
        let mut current = ROOT_NODE_ID.to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = match find_child(&state, &current, segment) {
                Some(id) => id,
                None => insert_node(&mut state, None, &current, segment, true, Vec::new()),
            };
        }
        current
    }

    /// Add a file with a generated id.
    pub fn add_file(&self, parent_id: &str, name: &str, content: impl AsRef<[u8]>) -> String {
        let mut state = self.lock();
        insert_node(&mut state, None, parent_id, name, false, content.as_ref().to_vec())
    }

    /// Add a file with a fixed id, as referenced by an incoming event.
    pub fn add_node(&self, id: &str, parent_id: &str, name: &str, content: impl AsRef<[u8]>) {
        let mut state = self.lock();
        insert_node(
            &mut state,
            Some(id.to_string()),
            parent_id,
            name,
            false,
            content.as_ref().to_vec(),
        );
    }

    /// Make the next `times` calls of `op` fail with HTTP `status`.
    pub fn fail_next(&self, op: Op, status: u16, times: usize) {
        let mut state = self.lock();
        state
            .failures
            .entry(op)
            .or_default()
            .extend(std::iter::repeat(status).take(times));
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn tags(&self, node_id: &str) -> Vec<String> {
        self.lock()
            .nodes
            .get(node_id)
            .map(|n| n.tags.clone())
            .unwrap_or_default()
    }

    /// Resolve `a/b/c` from the root by exact name.
    pub fn find(&self, path: &str) -> Option<String> {
        let state = self.lock();
        let mut current = ROOT_NODE_ID.to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = find_child(&state, &current, segment)?;
        }
        Some(current)
    }

    pub fn child_names(&self, node_id: &str) -> Vec<String> {
        let state = self.lock();
        state
            .children
            .get(node_id)
            .map(|ids| ids.iter().map(|id| state.nodes[id].name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn content(&self, node_id: &str) -> Option<Vec<u8>> {
        self.lock().nodes.get(node_id).map(|n| n.content.clone())
    }

    pub fn is_folder(&self, node_id: &str) -> bool {
        self.lock()
            .nodes
            .get(node_id)
            .map(|n| n.is_folder)
            .unwrap_or(false)
    }

    /// Every call made through the `Repository` trait, with its primary id.
    pub fn calls(&self) -> Vec<(Op, String)> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn count(&self, op: Op) -> usize {
        self.lock().calls.iter().filter(|(o, _)| *o == op).count()
    }

    /// Record the call, then surface an injected failure or a missing node.
    fn enter(&self, op: Op, node_id: &str) -> Result<std::sync::MutexGuard<'_, FakeState>, RepositoryError> {
        let mut state = self.lock();
        state.calls.push((op, node_id.to_string()));

        let endpoint = format!("nodes/{}/{:?}", node_id, op);
        if let Some(queue) = state.failures.get_mut(&op) {
            if !queue.is_empty() {
                let status = queue.remove(0);
                return Err(status_error(endpoint, status));
            }
        }
        if !state.nodes.contains_key(node_id) {
            return Err(RepositoryError::NotFound { endpoint });
        }
        Ok(state)
    }
}

fn status_error(endpoint: String, status: u16) -> RepositoryError {
    if status == 404 {
        return RepositoryError::NotFound { endpoint };
    }
    RepositoryError::Status {
        endpoint,
        status,
        body: String::new(),
    }
}

fn find_child(state: &FakeState, parent_id: &str, name: &str) -> Option<String> {
    state
        .children
        .get(parent_id)?
        .iter()
        .find(|id| state.nodes[*id].name == name)
        .cloned()
}

fn insert_node(
    state: &mut FakeState,
    id: Option<String>,
    parent_id: &str,
    name: &str,
    is_folder: bool,
    content: Vec<u8>,
) -> String {
    let id = id.unwrap_or_else(|| {
        state.next_id += 1;
        format!("node-{:04}", state.next_id)
    });
    state.nodes.insert(
        id.clone(),
        FakeNode {
            name: name.to_string(),
            is_folder,
            content,
            tags: Vec::new(),
        },
    );
    state
        .children
        .entry(parent_id.to_string())
        .or_default()
        .push(id.clone());
    id
}

fn unique_name(state: &FakeState, parent_id: &str, name: &str) -> String {
    if find_child(state, parent_id, name).is_none() {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    (1..)
        .map(|n| format!("{}-{}{}", stem, n, ext))
        .find(|candidate| find_child(state, parent_id, candidate).is_none())
        .unwrap_or_else(|| name.to_string())
}

#[async_trait]
impl Repository for FakeRepository {
    async fn list_children(&self, node_id: &str) -> Result<Vec<NodeEntry>, RepositoryError> {
        let state = self.enter(Op::ListChildren, node_id)?;
        let entries = state
            .children
            .get(node_id)
            .map(|ids| {
                ids.iter()
                    .map(|id| {
                        let node = &state.nodes[id];
                        NodeEntry {
                            id: id.clone(),
                            name: node.name.clone(),
                            is_folder: node.is_folder,
                            is_file: !node.is_folder,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }

    async fn download_content(&self, node_id: &str, target: &Path) -> Result<u64, RepositoryError> {
        let content = {
            let state = self.enter(Op::Download, node_id)?;
            state.nodes[node_id].content.clone()
        };
        std::fs::write(target, &content).map_err(|source| RepositoryError::Io {
            path: target.to_path_buf(),
            source,
        })?;
        Ok(content.len() as u64)
    }

    async fn read_text(&self, node_id: &str) -> Result<String, RepositoryError> {
        let state = self.enter(Op::ReadText, node_id)?;
        Ok(String::from_utf8_lossy(&state.nodes[node_id].content).into_owned())
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, RepositoryError> {
        let mut state = self.enter(Op::CreateFolder, parent_id)?;
        if find_child(&state, parent_id, name).is_some() {
            return Err(status_error(format!("nodes/{}/children", parent_id), 409));
        }
        Ok(insert_node(&mut state, None, parent_id, name, true, Vec::new()))
    }

    async fn upload_file(
        &self,
        parent_id: &str,
        local_path: &Path,
        name: &str,
    ) -> Result<String, RepositoryError> {
        let content = std::fs::read(local_path).map_err(|source| RepositoryError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        let mut state = self.enter(Op::Upload, parent_id)?;
        let name = unique_name(&state, parent_id, name);
        Ok(insert_node(&mut state, None, parent_id, &name, false, content))
    }

    async fn list_tags(&self, node_id: &str) -> Result<Vec<String>, RepositoryError> {
        let state = self.enter(Op::ListTags, node_id)?;
        Ok(state.nodes[node_id].tags.clone())
    }

    async fn add_tag(&self, node_id: &str, tag: &str) -> Result<(), RepositoryError> {
        let mut state = self.enter(Op::AddTag, node_id)?;
        let node = state
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| RepositoryError::NotFound {
                endpoint: format!("nodes/{}/tags", node_id),
            })?;
        if node.tags.iter().any(|t| t == tag) {
            return Err(status_error(format!("nodes/{}/tags", node_id), 409));
        }
        node.tags.push(tag.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mkdirs_reuses_existing_folders() {
        let repo = FakeRepository::new();
        let a = repo.mkdirs("RULE_BASED_TAGS/Courses");
        let b = repo.mkdirs("RULE_BASED_TAGS/Courses");
        assert_eq!(a, b);
        assert_eq!(repo.find("RULE_BASED_TAGS/Courses"), Some(a));
        assert_eq!(repo.child_names(ROOT_NODE_ID), vec!["RULE_BASED_TAGS"]);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let repo = FakeRepository::new();
        repo.fail_next(Op::ListChildren, 503, 1);

        let first = repo.list_children(ROOT_NODE_ID).await;
        assert!(matches!(first, Err(RepositoryError::Status { status: 503, .. })));
        assert!(repo.list_children(ROOT_NODE_ID).await.is_ok());
        assert_eq!(repo.count(Op::ListChildren), 2);
    }

    #[tokio::test]
    async fn test_add_tag_twice_conflicts() {
        let repo = FakeRepository::new();
        let folder = repo.mkdirs("Docs");
        let file = repo.add_file(&folder, "a.pdf", b"%PDF");

        repo.add_tag(&file, "ECM").await.unwrap();
        let err = repo.add_tag(&file, "ECM").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(repo.tags(&file), vec!["ECM"]);
    }

    #[tokio::test]
    async fn test_upload_renames_on_clash() {
        let repo = FakeRepository::new();
        let folder = repo.mkdirs("Docs");
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.txt");
        std::fs::write(&local, "one").unwrap();

        repo.upload_file(&folder, &local, "a.txt").await.unwrap();
        repo.upload_file(&folder, &local, "a.txt").await.unwrap();
        assert_eq!(repo.child_names(&folder), vec!["a.txt", "a-1.txt"]);
    }
}
