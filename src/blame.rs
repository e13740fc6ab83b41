//! Blame assembly: turn ranked matches into an explanation request.
//!
//! Each match is re-read from the repository as full commit text (header,
//! message and patch). The stored vector is never shown to the model. The
//! conversation carries one user message per commit, most similar first,
//! followed by the user's question.

use tracing::debug;

use crate::chat::ChatModel;
use crate::error::Result;
use crate::models::{ChatMessage, Conversation, Match};
use crate::repo::Repository;

pub const SYSTEM_PROMPT: &str = "\
You are a code archaeologist. The user will show you a number of commits \
from a git repository, each with its message and full patch, ordered from \
most to least relevant, followed by a question. Answer the question by \
identifying which of the commits are responsible for the behavior or code \
the user asks about. Cite commits by their hash, quote the relevant lines \
of the patch, and say briefly what each one changed and why it matters. If \
none of the commits answer the question, say so plainly instead of guessing.";

/// Build the conversation for `query` over `matches`, in match order.
pub async fn assemble(
    repo: &dyn Repository,
    matches: &[Match],
    query: &str,
) -> Result<Conversation> {
    let mut messages = Vec::with_capacity(matches.len() + 1);
    for m in matches {
        let text = repo.get_commit(&m.key).await?;
        debug!(commit = %m.key, distance = m.distance, bytes = text.len(), "attached commit");
        messages.push(ChatMessage::user(text));
    }
    messages.push(ChatMessage::user(query));

    Ok(Conversation {
        system: SYSTEM_PROMPT.to_string(),
        messages,
    })
}

/// Assemble the conversation and hand it to `chat`.
pub async fn explain(
    repo: &dyn Repository,
    chat: &dyn ChatModel,
    matches: &[Match],
    query: &str,
) -> Result<String> {
    let conversation = assemble(repo, matches, query).await?;
    chat.run_conversation(&conversation.system, &conversation.messages)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::Role;
    use crate::repo::memory::InMemoryRepository;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingChat {
        seen: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    #[async_trait]
    impl ChatModel for RecordingChat {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn run_conversation(
            &self,
            system: &str,
            messages: &[ChatMessage],
        ) -> Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), messages.to_vec()));
            Ok(format!("{} messages", messages.len()))
        }
    }

    fn matches(keys: &[&str]) -> Vec<Match> {
        keys.iter()
            .enumerate()
            .map(|(i, k)| Match {
                key: k.to_string(),
                distance: i as f64 * 0.1,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_assemble_orders_commits_then_query() {
        let repo = InMemoryRepository::new();
        repo.add_commit("aaa", "    first\n");
        repo.add_commit("bbb", "    second\n");

        let conv = assemble(&repo, &matches(&["bbb", "aaa"]), "who broke it?")
            .await
            .unwrap();

        assert_eq!(conv.system, SYSTEM_PROMPT);
        assert_eq!(conv.messages.len(), 3);
        assert!(conv.messages[0].content.starts_with("commit bbb"));
        assert!(conv.messages[1].content.starts_with("commit aaa"));
        assert_eq!(conv.messages[2].content, "who broke it?");
        assert!(conv.messages.iter().all(|m| m.role == Role::User));
    }

    #[tokio::test]
    async fn test_assemble_with_no_matches_is_just_the_query() {
        let repo = InMemoryRepository::new();
        let conv = assemble(&repo, &[], "anything").await.unwrap();
        assert_eq!(conv.messages, vec![ChatMessage::user("anything")]);
    }

    #[tokio::test]
    async fn test_missing_commit_fails_assembly() {
        let repo = InMemoryRepository::new();
        repo.add_commit("aaa", "    first\n");
        let err = assemble(&repo, &matches(&["aaa", "gone"]), "q")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Process(_)));
    }

    #[tokio::test]
    async fn test_explain_hands_off_conversation() {
        let repo = InMemoryRepository::new();
        repo.add_commit("aaa", "    first\n");
        let chat = RecordingChat {
            seen: Mutex::new(Vec::new()),
        };

        let reply = explain(&repo, &chat, &matches(&["aaa"]), "why?")
            .await
            .unwrap();
        assert_eq!(reply, "2 messages");

        let seen = chat.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, SYSTEM_PROMPT);
        assert_eq!(seen[0].1.last().unwrap().content, "why?");
    }
}
