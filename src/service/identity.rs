use crate::models::FileRecord;

/// Whether two records denote the same underlying document.
///
/// Keys are tried in order: identity, document id, filename, display name.
/// A key only counts when both sides carry a non-empty value; the first
/// key that matches decides. Records sharing no key are never equal.
pub fn same_document(a: &FileRecord, b: &FileRecord) -> bool {
    let keys: [(Option<&str>, Option<&str>); 4] = [
        (a.identity.as_deref(), b.identity.as_deref()),
        (a.document_id.as_deref(), b.document_id.as_deref()),
        (a.filename.as_deref(), b.filename.as_deref()),
        (Some(a.display_name.as_str()), Some(b.display_name.as_str())),
    ];
    keys.iter().any(|pair| match pair {
        (Some(x), Some(y)) => !x.is_empty() && x == y,
        _ => false,
    })
}
