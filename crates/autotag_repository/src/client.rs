//! Basic-auth HTTP client for the repository's public REST API (v1).
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `/nodes/{id}/children` | List children (paged) |
//! | POST   | `/nodes/{id}/children` | Create folder (JSON) / upload file (multipart) |
//! | GET    | `/nodes/{id}/content`  | Stream binary content |
//! | GET    | `/nodes/{id}/tags`     | List tags (paged) |
//! | POST   | `/nodes/{id}/tags`     | Add tag |

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::RepositoryConfig;
use crate::error::RepositoryError;
use crate::types::{CreatedEntry, Entry, ListResponse, NodeEntry, TagEntry};
use crate::Repository;

/// Path of the public API relative to the server root.
const API_PREFIX: &str = "alfresco/api/-default-/public/alfresco/versions/1";

/// Longest response body echoed into an error message.
const MAX_ERROR_BODY: usize = 500;

/// Repository client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct RestRepository {
    http: Client,
    config: RepositoryConfig,
}

impl RestRepository {
    pub fn new(config: RepositoryConfig) -> Result<Self, RepositoryError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RepositoryError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, node_id: &str, resource: &str) -> String {
        format!(
            "{}/{}/nodes/{}/{}",
            self.config.base_url.as_str().trim_end_matches('/'),
            API_PREFIX,
            node_id,
            resource
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.config.username, Some(&self.config.password))
    }

    async fn send(&self, builder: RequestBuilder, endpoint: &str) -> Result<Response, RepositoryError> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| RepositoryError::Http {
                endpoint: endpoint.to_string(),
                source: e,
            })?;
        check_status(response, endpoint).await
    }

    async fn json<T: DeserializeOwned>(response: Response, endpoint: &str) -> Result<T, RepositoryError> {
        let bytes = response.bytes().await.map_err(|e| RepositoryError::Http {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| RepositoryError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    /// Fetch every page of a `list` collection.
    async fn list_all<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>, RepositoryError> {
        let page_size = self.config.page_size;
        let mut items = Vec::new();
        let mut skip: u32 = 0;

        loop {
            let request = self.http.get(endpoint).query(&[
                ("skipCount", skip.to_string()),
                ("maxItems", page_size.to_string()),
            ]);
            let response = self.send(request, endpoint).await?;
            let page: ListResponse<T> = Self::json(response, endpoint).await?;

            let fetched = page.list.entries.len() as u32;
            items.extend(page.list.entries.into_iter().map(|e| e.entry));

            let has_more = page.list.pagination.map(|p| p.has_more_items).unwrap_or(false);
            if !has_more || fetched == 0 {
                break;
            }
            skip += fetched;
        }

        debug!(endpoint, count = items.len(), "Listed collection");
        Ok(items)
    }
}

#[async_trait]
impl Repository for RestRepository {
    async fn list_children(&self, node_id: &str) -> Result<Vec<NodeEntry>, RepositoryError> {
        let endpoint = self.endpoint(node_id, "children");
        self.list_all(&endpoint).await
    }

    async fn download_content(&self, node_id: &str, target: &Path) -> Result<u64, RepositoryError> {
        let endpoint = self.endpoint(node_id, "content");
        let mut response = self.send(self.http.get(&endpoint), &endpoint).await?;

        let io_err = |source| RepositoryError::Io {
            path: target.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(target).await.map_err(io_err)?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| RepositoryError::Http {
            endpoint: endpoint.clone(),
            source: e,
        })? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;

        debug!(node_id, bytes = written, path = %target.display(), "Downloaded content");
        Ok(written)
    }

    async fn read_text(&self, node_id: &str) -> Result<String, RepositoryError> {
        let endpoint = self.endpoint(node_id, "content");
        let response = self.send(self.http.get(&endpoint), &endpoint).await?;
        response.text().await.map_err(|e| RepositoryError::Http {
            endpoint,
            source: e,
        })
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, RepositoryError> {
        let endpoint = self.endpoint(parent_id, "children");
        let payload = serde_json::json!({ "name": name, "nodeType": "cm:folder" });
        let response = self
            .send(self.http.post(&endpoint).json(&payload), &endpoint)
            .await?;
        let created: Entry<CreatedEntry> = Self::json(response, &endpoint).await?;
        Ok(created.entry.id)
    }

    async fn upload_file(
        &self,
        parent_id: &str,
        local_path: &Path,
        name: &str,
    ) -> Result<String, RepositoryError> {
        let endpoint = self.endpoint(parent_id, "children");
        let io_err = |source| RepositoryError::Io {
            path: local_path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(local_path).await.map_err(io_err)?;
        let len = file.metadata().await.map_err(io_err)?.len();

        let part = multipart::Part::stream_with_length(file, len).file_name(name.to_string());
        let form = multipart::Form::new()
            .part("filedata", part)
            .text("name", name.to_string())
            .text("nodeType", "cm:content")
            .text("autoRename", "true");

        let response = self
            .send(self.http.post(&endpoint).multipart(form), &endpoint)
            .await?;
        let created: Entry<CreatedEntry> = Self::json(response, &endpoint).await?;
        Ok(created.entry.id)
    }

    async fn list_tags(&self, node_id: &str) -> Result<Vec<String>, RepositoryError> {
        let endpoint = self.endpoint(node_id, "tags");
        let tags: Vec<TagEntry> = self.list_all(&endpoint).await?;
        Ok(tags.into_iter().map(|t| t.tag).collect())
    }

    async fn add_tag(&self, node_id: &str, tag: &str) -> Result<(), RepositoryError> {
        let endpoint = self.endpoint(node_id, "tags");
        let payload = serde_json::json!({ "tag": tag });
        self.send(self.http.post(&endpoint).json(&payload), &endpoint)
            .await?;
        Ok(())
    }
}

/// Map non-success responses to errors, keeping a truncated body for context.
async fn check_status(response: Response, endpoint: &str) -> Result<Response, RepositoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(RepositoryError::NotFound {
            endpoint: endpoint.to_string(),
        });
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("... (truncated)");
    }
    Err(RepositoryError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}
