//! Canonical repository change notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use std::fmt;

use crate::error::{ProtocolError, Result};
use crate::types::JobKind;

/// Kind of change reported by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    NodeCreated,
    ContentReady,
    BinaryChanged,
    MetadataChanged,
    AuditUpdated,
    NodeDeleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NodeCreated => "NODE_CREATED",
            EventType::ContentReady => "CONTENT_READY",
            EventType::BinaryChanged => "BINARY_CHANGED",
            EventType::MetadataChanged => "METADATA_CHANGED",
            EventType::AuditUpdated => "AUDIT_UPDATED",
            EventType::NodeDeleted => "NODE_DELETED",
        }
    }

    /// Routing predicate for the intake controller.
    ///
    /// `CONTENT_READY` drives rule-based tagging and `BINARY_CHANGED` drives
    /// package extraction. Every other type is outside the handled set and is
    /// acknowledged without dispatch.
    pub fn job_kind(&self) -> Option<JobKind> {
        match self {
            EventType::ContentReady => Some(JobKind::Tagging),
            EventType::BinaryChanged => Some(JobKind::Package),
            EventType::NodeCreated
            | EventType::MetadataChanged
            | EventType::AuditUpdated
            | EventType::NodeDeleted => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change notification, constructed per message and discarded after
/// dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoEvent {
    /// Store locator plus id, e.g. `workspace://SpacesStore/<uuid>`.
    pub node_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_node_ref: Option<String>,
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl RepoEvent {
    /// Parse and validate a message body.
    ///
    /// Syntax errors map to [`ProtocolError::InvalidJson`]; well-formed JSON
    /// that does not fit the schema maps to [`ProtocolError::Schema`].
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let event: RepoEvent = serde_json::from_slice(body).map_err(|e| match e.classify() {
            Category::Data => ProtocolError::Schema(e.to_string()),
            Category::Syntax | Category::Eof | Category::Io => ProtocolError::InvalidJson(e),
        })?;
        event.validate()?;
        Ok(event)
    }

    fn validate(&self) -> Result<()> {
        if self.node_ref.trim().is_empty() {
            return Err(ProtocolError::Schema("nodeRef must not be empty".to_string()));
        }
        if matches!(&self.parent_node_ref, Some(parent) if parent.trim().is_empty()) {
            return Err(ProtocolError::Schema(
                "parentNodeRef must not be empty when present".to_string(),
            ));
        }
        Ok(())
    }

    /// Terminal identifier of `node_ref`.
    pub fn node_id(&self) -> &str {
        node_id(&self.node_ref)
    }

    pub fn parent_node_id(&self) -> Option<&str> {
        self.parent_node_ref.as_deref().map(node_id)
    }

    /// Repository path, treating an empty string as absent.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// Extract the final path segment of a node reference.
///
/// `workspace://SpacesStore/abc-123` becomes `abc-123`; a bare id is returned
/// unchanged.
pub fn node_id(node_ref: &str) -> &str {
    let trimmed = node_ref.trim().trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_event() {
        let body = br#"{
            "nodeRef": "workspace://SpacesStore/abc-123",
            "parentNodeRef": "workspace://SpacesStore/parent-9",
            "eventType": "BINARY_CHANGED",
            "path": "/Company Home/Courses/RealEstate/course.zip",
            "name": "course.zip",
            "mimeType": "application/zip",
            "modifiedAt": "2024-03-01T10:15:00Z",
            "extra": "ignored"
        }"#;

        let event = RepoEvent::from_json(body).unwrap();
        assert_eq!(event.event_type, EventType::BinaryChanged);
        assert_eq!(event.node_id(), "abc-123");
        assert_eq!(event.parent_node_id(), Some("parent-9"));
        assert_eq!(event.name.as_deref(), Some("course.zip"));
        assert!(event.modified_at.is_some());
    }

    #[test]
    fn test_minimal_event() {
        let event =
            RepoEvent::from_json(br#"{"nodeRef": "n-1", "eventType": "NODE_CREATED"}"#).unwrap();
        assert_eq!(event.node_id(), "n-1");
        assert!(event.path().is_none());
        assert!(event.parent_node_ref.is_none());
    }

    #[test]
    fn test_invalid_json_is_distinguished_from_schema() {
        let err = RepoEvent::from_json(b"{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));

        let err = RepoEvent::from_json(br#"{"eventType": "NODE_CREATED"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Schema(_)));

        let err =
            RepoEvent::from_json(br#"{"nodeRef": "n", "eventType": "NODE_RENAMED"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Schema(_)));
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_empty_node_ref_rejected() {
        let err =
            RepoEvent::from_json(br#"{"nodeRef": "  ", "eventType": "CONTENT_READY"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Schema(_)));
    }

    #[test]
    fn test_job_kind_routing() {
        assert_eq!(EventType::ContentReady.job_kind(), Some(JobKind::Tagging));
        assert_eq!(EventType::BinaryChanged.job_kind(), Some(JobKind::Package));
        for ignored in [
            EventType::NodeCreated,
            EventType::MetadataChanged,
            EventType::AuditUpdated,
            EventType::NodeDeleted,
        ] {
            assert_eq!(ignored.job_kind(), None, "{ignored} should not dispatch");
        }
    }

    #[test]
    fn test_node_id_extraction() {
        assert_eq!(node_id("workspace://SpacesStore/abc"), "abc");
        assert_eq!(node_id("workspace://SpacesStore/abc/"), "abc");
        assert_eq!(node_id("abc"), "abc");
    }
}
