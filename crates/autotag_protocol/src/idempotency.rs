use chrono::SecondsFormat;
use std::fmt;

use crate::event::RepoEvent;
use crate::types::JobKind;

const SEP: char = ':';

/// Key whose presence in the shared store means "already handled".
///
/// Components:
/// - job kind (keeps tagging and package markers apart)
/// - node_ref
/// - discriminator: `modifiedAt` for package jobs when present (each new
///   binary version is processed once), otherwise the event type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn for_job(kind: JobKind, event: &RepoEvent) -> Self {
        let discriminator = match (kind, event.modified_at) {
            (JobKind::Package, Some(modified_at)) => {
                modified_at.to_rfc3339_opts(SecondsFormat::Millis, true)
            }
            _ => event.event_type.as_str().to_string(),
        };
        Self::from_parts(&[kind.as_str(), event.node_ref.trim(), &discriminator])
    }

    fn from_parts(parts: &[&str]) -> Self {
        let mut key = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                key.push(SEP);
            }
            key.push_str(part);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
