use autotag_repository::{Repository, RepositoryError};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Course-relative path to tags. Keys are unique; a later row for the same
/// key replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeMap<String, Vec<String>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, tags: Vec<String>) {
        self.rules.insert(key, tags);
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.rules.get(key).map(|t| t.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Download a rule file and parse it.
pub async fn load_rules(repo: &dyn Repository, file_id: &str) -> Result<RuleSet, RepositoryError> {
    let text = repo.read_text(file_id).await?;
    let rules = parse_rules(&text);
    info!(rule_id = file_id, rules = rules.len(), "Loaded rules");
    Ok(rules)
}

/// Parse rule rows of the form `<relative path>,<tag>|<tag>|...`.
///
/// A leading byte order mark is dropped. Blank rows and `#` comments are
/// ignored. Rows with fewer than two
/// columns, an empty path or no tags are skipped with a warning; a broken
/// row never fails the whole file.
pub fn parse_rules(text: &str) -> RuleSet {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());

    let mut rules = RuleSet::new();

    for (idx, record) in reader.records().enumerate() {
        let line = idx + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(line, error = %e, "Invalid rule row (unparseable)");
                continue;
            }
        };

        let first = record.get(0).unwrap_or("").trim();
        if first.starts_with('#') || (record.len() < 2 && first.is_empty()) {
            continue;
        }

        if record.len() < 2 {
            warn!(line, row = ?record, "Invalid rule row (too few columns)");
            continue;
        }

        let key = normalize_key(first);
        let tags = parse_tags(record.get(1).unwrap_or(""));
        if key.is_empty() || tags.is_empty() {
            warn!(line, row = ?record, "Invalid rule row (empty path or tags)");
            continue;
        }

        rules.insert(key.to_string(), tags);
    }

    rules
}

pub(crate) fn normalize_key(path: &str) -> &str {
    path.trim().trim_start_matches('/')
}

fn parse_tags(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotag_test_utils::FakeRepository;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_rows() {
        let rules = parse_rules(
            "Module1/file.png, ECM | Real Estate\n\
             /module2/file.png, module2 | ECM2 | Real Estate\n",
        );
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.get("Module1/file.png"), Some(&tags(&["ECM", "Real Estate"])[..]));
        assert_eq!(
            rules.get("module2/file.png"),
            Some(&tags(&["module2", "ECM2", "Real Estate"])[..])
        );
    }

    #[test]
    fn test_leading_byte_order_mark_is_dropped() {
        let rules = parse_rules("\u{feff}Module1/file.png,ECM\n");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.get("Module1/file.png"), Some(&tags(&["ECM"])[..]));
    }

    #[test]
    fn test_single_column_row_is_skipped() {
        let rules = parse_rules("lonely/path.png\nok/path.png,Tag\n");
        assert_eq!(rules.len(), 1);
        assert!(rules.get("lonely/path.png").is_none());
        assert!(rules.get("ok/path.png").is_some());
    }

    #[test]
    fn test_comments_and_blank_rows_are_ignored() {
        let rules = parse_rules("# path,tags\n\n   # indented,comment\n\na.png,A\n");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.get("a.png"), Some(&tags(&["A"])[..]));
    }

    #[test]
    fn test_empty_key_or_tags_are_skipped() {
        let rules = parse_rules(" ,Tag\nb.png, | |\nc.png,C\n");
        assert_eq!(rules.len(), 1);
        assert!(rules.get("c.png").is_some());
    }

    #[test]
    fn test_later_rows_overwrite() {
        let rules = parse_rules("a.png,First\na.png,Second|Third\n");
        assert_eq!(rules.get("a.png"), Some(&tags(&["Second", "Third"])[..]));
    }

    #[test]
    fn test_quoted_fields() {
        let rules = parse_rules("\"Module 1/a, b.png\",\"X | Y\"\n");
        assert_eq!(rules.get("Module 1/a, b.png"), Some(&tags(&["X", "Y"])[..]));
    }

    #[tokio::test]
    async fn test_load_rules_reads_remote_file() {
        let repo = FakeRepository::new();
        let folder = repo.mkdirs("RULE_BASED_TAGS/Courses");
        let id = repo.add_file(&folder, "courses_tags.csv", "Module1/file.png,ECM|Real Estate\n");

        let rules = load_rules(&repo, &id).await.unwrap();
        assert_eq!(rules.get("Module1/file.png"), Some(&tags(&["ECM", "Real Estate"])[..]));
    }
}
