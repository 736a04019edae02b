//! Prompt assembly: retrieved context + bounded history + question.
//!
//! Matched children are expanded back to their parent text, deduplicated
//! by a content hash (several children of one parent must not quote it
//! twice), and laid out as a numbered excerpt block ahead of the
//! question, after the sliding history window.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::index::store::SearchHit;
use crate::llm::ChatMessage;

/// History suffix read for prompt assembly: 3 exchanges.
pub const HISTORY_WINDOW: usize = 6;

const ASSISTANT_PERSONA: &str = "You are a knowledge-base assistant. Answer the question using \
the numbered excerpts in the reference material. If the excerpts do not contain the answer, say \
that the documents do not cover it instead of guessing.";

pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Builds the final message sequence: persona, last ≤6 history
    /// turns in original order, then one user turn with the context
    /// block ahead of the literal question.
    pub fn assemble(
        &self,
        hits: &[SearchHit],
        history: &[ChatMessage],
        question: &str,
    ) -> Vec<ChatMessage> {
        let context_block = self.context_block(hits);

        let mut messages = Vec::with_capacity(history.len().min(HISTORY_WINDOW) + 2);
        messages.push(ChatMessage::system(ASSISTANT_PERSONA));

        let window_start = history.len().saturating_sub(HISTORY_WINDOW);
        messages.extend_from_slice(&history[window_start..]);

        let user_turn = match &context_block {
            Some(block) => format!(
                "Reference material:\n{}\nQuestion:\n{}",
                block, question
            ),
            None => format!(
                "No reference material was found for this question.\n\nQuestion:\n{}",
                question
            ),
        };
        messages.push(ChatMessage::user(user_turn));

        messages
    }

    /// Chat-only variant: same persona and history window, no context
    /// block. Used when routing decides retrieval is unnecessary.
    pub fn assemble_chat(&self, history: &[ChatMessage], question: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len().min(HISTORY_WINDOW) + 2);
        messages.push(ChatMessage::system(ASSISTANT_PERSONA));
        let window_start = history.len().saturating_sub(HISTORY_WINDOW);
        messages.extend_from_slice(&history[window_start..]);
        messages.push(ChatMessage::user(question));
        messages
    }

    /// Numbered, deduplicated excerpt block; `None` when nothing
    /// matched.
    fn context_block(&self, hits: &[SearchHit]) -> Option<String> {
        if hits.is_empty() {
            return None;
        }

        let mut seen: HashSet<[u8; 32]> = HashSet::new();
        let mut block = String::new();
        let mut number = 0;

        for hit in hits {
            let text = resolve_display_text(hit);
            if text.is_empty() {
                continue;
            }

            let fingerprint: [u8; 32] = Sha256::digest(text.as_bytes()).into();
            if !seen.insert(fingerprint) {
                continue;
            }

            number += 1;
            let citation = match (hit.record.source.as_str(), hit.record.page) {
                ("", _) => String::new(),
                (source, Some(page)) => format!(" (source: {}, page {})", source, page),
                (source, None) => format!(" (source: {})", source),
            };
            block.push_str(&format!("Excerpt {}{}:\n{}\n\n", number, citation, text));
        }

        if block.is_empty() {
            None
        } else {
            Some(block)
        }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Parent text when lineage is present, the child's own text otherwise
/// (legacy records indexed before parent tracking).
fn resolve_display_text(hit: &SearchHit) -> &str {
    if hit.record.parent_content.is_empty() {
        hit.record.content.trim()
    } else {
        hit.record.parent_content.trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::index::store::ChunkRecord;
    use crate::llm::Role;

    fn hit_with_parent(id: &str, child: &str, parent: &str) -> SearchHit {
        SearchHit {
            record: ChunkRecord {
                id: id.to_string(),
                content: child.to_string(),
                source: "contract.pdf".to_string(),
                page: Some(3),
                parent_content: parent.to_string(),
            },
            score: 0.9,
        }
    }

    fn turn(role: Role, text: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: text.to_string(),
        }
    }

    #[test]
    fn shared_parent_is_quoted_once() {
        let parent = "The termination clause allows either party thirty days notice.";
        let hits = vec![
            hit_with_parent("a", "termination clause", parent),
            hit_with_parent("b", "thirty days notice", parent),
        ];

        let messages = ContextAssembler::new().assemble(&hits, &[], "termination?");
        let user = &messages.last().unwrap().content;
        assert_eq!(user.matches(parent).count(), 1);
        assert!(user.contains("Excerpt 1"));
        assert!(!user.contains("Excerpt 2"));
    }

    #[test]
    fn falls_back_to_child_text_for_legacy_records() {
        let hits = vec![hit_with_parent("a", "orphan child text", "")];
        let messages = ContextAssembler::new().assemble(&hits, &[], "q");
        assert!(messages.last().unwrap().content.contains("orphan child text"));
    }

    #[test]
    fn dedup_preserves_rank_of_first_occurrence() {
        let hits = vec![
            hit_with_parent("a", "c1", "first parent"),
            hit_with_parent("b", "c2", "second parent"),
            hit_with_parent("c", "c3", "first parent"),
        ];

        let messages = ContextAssembler::new().assemble(&hits, &[], "q");
        let user = &messages.last().unwrap().content;
        let first = user.find("first parent").unwrap();
        let second = user.find("second parent").unwrap();
        assert!(first < second);
        assert_eq!(user.matches("first parent").count(), 1);
    }

    #[test]
    fn history_is_clamped_to_the_last_six_turns() {
        let history: Vec<ChatMessage> = (0..8)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                turn(role, &format!("turn {}", i))
            })
            .collect();

        let messages = ContextAssembler::new().assemble(&[], &history, "q");

        // persona + 6 history turns + final user turn
        assert_eq!(messages.len(), 8);
        assert_eq!(messages[1].content, "turn 2");
        assert_eq!(messages[6].content, "turn 7");
        assert!(!messages.iter().any(|m| m.content == "turn 0"));
        assert!(!messages.iter().any(|m| m.content == "turn 1"));
    }

    #[test]
    fn ordering_is_system_history_then_question() {
        let history = vec![turn(Role::User, "earlier"), turn(Role::Assistant, "reply")];
        let hits = vec![hit_with_parent("a", "child", "parent text")];

        let messages = ContextAssembler::new().assemble(&hits, &history, "the question");

        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "earlier");
        assert_eq!(messages[2].content, "reply");

        let user = &messages[3].content;
        assert_eq!(messages[3].role, Role::User);
        let context_pos = user.find("parent text").unwrap();
        let question_pos = user.find("the question").unwrap();
        assert!(context_pos < question_pos);
        assert!(user.ends_with("the question"));
    }

    #[test]
    fn empty_hits_still_carry_the_question() {
        let messages = ContextAssembler::new().assemble(&[], &[], "anything there?");
        assert_eq!(messages.len(), 2);
        let user = &messages[1].content;
        assert!(user.contains("No reference material"));
        assert!(user.contains("anything there?"));
    }

    #[test]
    fn citation_includes_source_and_page() {
        let hits = vec![hit_with_parent("a", "child", "parent text")];
        let messages = ContextAssembler::new().assemble(&hits, &[], "q");
        assert!(messages
            .last()
            .unwrap()
            .content
            .contains("(source: contract.pdf, page 3)"));
    }
}
