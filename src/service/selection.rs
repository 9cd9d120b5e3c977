use tracing::debug;

use crate::models::FileRecord;
use crate::service::identity::same_document;

/// Documents scoped into the next outgoing query, in the order they were added.
#[derive(Debug, Default, Clone)]
pub struct SelectionSet {
    entries: Vec<FileRecord>,
}

impl SelectionSet {
    /// Adds `record` unless an equivalent document is already selected.
    /// The first addition onto an empty `draft` seeds a suggested question.
    pub fn toggle_add(&mut self, record: FileRecord, draft: &mut String) -> bool {
        if self.contains(&record) {
            debug!("'{}' already selected", record.display_name);
            return false;
        }
        if draft.trim().is_empty() {
            *draft = format!("Tell me about \"{}\"", record.label());
        }
        self.entries.push(record);
        true
    }

    pub fn remove(&mut self, record: &FileRecord) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| !same_document(entry, record));
        self.entries.len() != before
    }

    pub fn contains(&self, record: &FileRecord) -> bool {
        self.entries.iter().any(|entry| same_document(entry, record))
    }

    pub fn list(&self) -> &[FileRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn file(identity: Option<&str>, filename: &str) -> FileRecord {
        FileRecord {
            identity: identity.map(str::to_string),
            document_id: identity.map(str::to_string),
            filename: Some(filename.to_string()),
            original_name: None,
            display_name: filename.to_string(),
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn adding_the_same_document_twice_is_idempotent() {
        let mut selection = SelectionSet::default();
        let mut draft = String::new();

        assert!(selection.toggle_add(file(Some("d1"), "a.pdf"), &mut draft));
        assert!(!selection.toggle_add(file(Some("d1"), "a-copy.pdf"), &mut draft));
        assert!(selection.toggle_add(file(None, "b.pdf"), &mut draft));
        assert!(!selection.toggle_add(file(None, "b.pdf"), &mut draft));

        assert_eq!(selection.len(), 2);
    }

    #[test]
    fn first_add_seeds_empty_draft_only() {
        let mut selection = SelectionSet::default();
        let mut draft = String::new();
        selection.toggle_add(file(Some("d1"), "a.pdf"), &mut draft);
        assert_eq!(draft, "Tell me about \"a.pdf\"");

        selection.toggle_add(file(Some("d2"), "b.pdf"), &mut draft);
        assert_eq!(draft, "Tell me about \"a.pdf\"");

        let mut typed = "compare the budgets".to_string();
        let mut other = SelectionSet::default();
        other.toggle_add(file(Some("d3"), "c.pdf"), &mut typed);
        assert_eq!(typed, "compare the budgets");
    }

    #[test]
    fn remove_and_contains_use_shared_comparator() {
        let mut selection = SelectionSet::default();
        let mut draft = String::new();
        selection.toggle_add(file(Some("d1"), "a.pdf"), &mut draft);
        selection.toggle_add(file(Some("d2"), "b.pdf"), &mut draft);

        let refreshed = file(Some("d1"), "a.pdf");
        assert!(selection.contains(&refreshed));
        assert!(selection.remove(&refreshed));
        assert!(!selection.contains(&refreshed));
        assert!(!selection.remove(&refreshed));

        let keys: Vec<_> = selection.list().iter().map(|f| f.key()).collect();
        assert_eq!(keys, vec!["d2".to_string()]);
    }
}
