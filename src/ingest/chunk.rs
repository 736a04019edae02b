//! Parent/child splitting for indexing.
//!
//! Parents are large non-overlapping spans kept to give the model full
//! surrounding context; children are the small overlapping spans that
//! actually get embedded and searched. Every child carries the verbatim
//! text of its parent so retrieval can expand back without a lookup.

use uuid::Uuid;

use super::Document;

/// Parent span size in characters. No overlap between siblings.
pub const PARENT_CHUNK_CHARS: usize = 800;
/// Child span size in characters. The last fragment of a parent may be shorter.
pub const CHILD_CHUNK_CHARS: usize = 200;
/// Exact overlap between consecutive children of one parent.
pub const CHILD_CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Clone)]
pub struct ParentChunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub page: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ChildChunk {
    pub id: String,
    pub text: String,
    /// Verbatim copy of the parent's text, not re-derived.
    pub parent_content: String,
    pub source: String,
    pub page: Option<u32>,
}

/// Splits one document into parent spans (per page when pages exist).
pub fn split_document(doc: &Document) -> Vec<ParentChunk> {
    let mut parents = Vec::new();
    for (page, text) in doc.pages() {
        for span in char_windows(text, PARENT_CHUNK_CHARS, PARENT_CHUNK_CHARS) {
            let trimmed = span.trim();
            if trimmed.is_empty() {
                continue;
            }
            parents.push(ParentChunk {
                id: Uuid::new_v4().to_string(),
                text: span,
                source: doc.source.clone(),
                page,
            });
        }
    }
    parents
}

/// Splits one parent into overlapping children. A parent shorter than
/// the child size yields a single child equal to the parent text.
pub fn split_parent(parent: &ParentChunk) -> Vec<ChildChunk> {
    let step = CHILD_CHUNK_CHARS - CHILD_CHUNK_OVERLAP;
    char_windows(&parent.text, CHILD_CHUNK_CHARS, step)
        .into_iter()
        .map(|text| ChildChunk {
            id: Uuid::new_v4().to_string(),
            text,
            parent_content: parent.text.clone(),
            source: parent.source.clone(),
            page: parent.page,
        })
        .collect()
}

/// Fixed-size character windows advancing by `step`. Operates on chars,
/// never splitting a code point. The final window may be shorter.
fn char_windows(text: &str, size: usize, step: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total == 0 {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(total);
        windows.push(chars[start..end].iter().collect());
        if end == total {
            break;
        }
        start += step;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            source: "sample.txt".to_string(),
            ext: "txt".to_string(),
            text: text.to_string(),
        }
    }

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn parents_bounded_and_non_overlapping() {
        let text = "x".repeat(2000);
        let parents = split_document(&doc(&text));

        assert_eq!(parents.len(), 3);
        for parent in &parents {
            assert!(char_len(&parent.text) <= PARENT_CHUNK_CHARS);
        }
        let total: usize = parents.iter().map(|p| char_len(&p.text)).sum();
        assert_eq!(total, 2000);
    }

    #[test]
    fn children_bounded_with_exact_overlap() {
        let text: String = ('a'..='z').cycle().take(800).collect();
        let parents = split_document(&doc(&text));
        assert_eq!(parents.len(), 1);

        let children = split_parent(&parents[0]);
        assert!(children.len() > 1);

        for (i, child) in children.iter().enumerate() {
            let len = char_len(&child.text);
            if i + 1 < children.len() {
                assert_eq!(len, CHILD_CHUNK_CHARS);
            } else {
                assert!(len <= CHILD_CHUNK_CHARS);
            }
        }

        for pair in children.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let next: Vec<char> = pair[1].text.chars().collect();
            let tail: String = prev[prev.len() - CHILD_CHUNK_OVERLAP..].iter().collect();
            let head: String = next[..CHILD_CHUNK_OVERLAP].iter().collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn parent_content_is_verbatim() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        for parent in split_document(&doc(&text)) {
            for child in split_parent(&parent) {
                assert_eq!(child.parent_content, parent.text);
                assert!(parent.text.contains(&child.text));
            }
        }
    }

    #[test]
    fn short_parent_yields_single_child() {
        let parents = split_document(&doc("only a handful of words"));
        assert_eq!(parents.len(), 1);

        let children = split_parent(&parents[0]);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].text, parents[0].text);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "日本語のテキストで切り出しを確認する。".repeat(60);
        for parent in split_document(&doc(&text)) {
            for child in split_parent(&parent) {
                assert!(child.text.chars().count() <= CHILD_CHUNK_CHARS);
            }
        }
    }

    #[test]
    fn empty_document_yields_nothing() {
        assert!(split_document(&doc("")).is_empty());
        assert!(split_document(&doc("   \n\n  ")).is_empty());
    }
}
