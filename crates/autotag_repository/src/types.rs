//! Response shapes of the repository REST API.
//!
//! Collections arrive as `{"list": {"pagination": {...}, "entries": [{"entry": {...}}]}}`
//! and single objects as `{"entry": {...}}`. Unknown fields are ignored.

use serde::Deserialize;

/// Child of a folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub is_file: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagEntry {
    pub tag: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedEntry {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Entry<T> {
    pub entry: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse<T> {
    pub list: ListBody<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListBody<T> {
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default = "Vec::new")]
    pub entries: Vec<Entry<T>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Pagination {
    #[serde(default)]
    pub has_more_items: bool,
}
