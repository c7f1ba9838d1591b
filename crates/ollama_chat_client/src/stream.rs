//! Streaming accumulator: one chat request in, a finite sequence of
//! progressively longer reply strings out.

use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::warn;

use crate::client::{ChatBackend, ChunkStream};
use crate::messages::{ChatRequest, Message};
use crate::session::Turn;

/// System message sent first in every request.
pub const SYSTEM_PREAMBLE: &str =
    "Please respond using naturally written language, as if writing a well-formed text response.";

/// One element of a reply stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    /// Reply text accumulated so far.
    Partial(String),
    /// The request failed; always the last element.
    Failed(String),
}

impl ReplyEvent {
    /// Text to show in the transcript.
    pub fn render(&self) -> String {
        match self {
            ReplyEvent::Partial(text) => text.clone(),
            ReplyEvent::Failed(description) => format!("Error: {}", description),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ReplyEvent::Failed(_))
    }
}

/// Preamble, then each prior turn as a user/assistant pair, then `message`.
pub fn build_messages(message: &str, history: &[Turn]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(Message::system(SYSTEM_PREAMBLE));
    for turn in history {
        messages.push(Message::user(turn.user_text.as_str()));
        messages.push(Message::assistant(turn.assistant_text.as_str()));
    }
    messages.push(Message::user(message));
    messages
}

/// Ask `backend` for a streamed reply to `message` given the prior `history`.
///
/// Each call is a fresh round trip; the stream cannot be restarted.
pub fn stream_reply<B>(
    backend: &B,
    message: &str,
    history: &[Turn],
    model: &str,
) -> BoxStream<'static, ReplyEvent>
where
    B: ChatBackend + ?Sized,
{
    let request = ChatRequest::streaming(model, build_messages(message, history));
    accumulate(backend.chat(request))
}

/// Fold chunk fragments into a running string, yielding the running total per chunk.
///
/// Chunks without a `message` object yield nothing; an empty fragment still yields
/// (repeating the previous total). The first error ends the stream with
/// [`ReplyEvent::Failed`].
pub fn accumulate(chunks: ChunkStream) -> BoxStream<'static, ReplyEvent> {
    stream::unfold(Some((chunks, String::new())), |state| async move {
        let (mut chunks, mut text) = match state {
            Some(state) => state,
            None => return None,
        };
        loop {
            match chunks.next().await {
                Some(Ok(chunk)) => {
                    if let Some(fragment) = chunk.fragment() {
                        text.push_str(fragment);
                        let event = ReplyEvent::Partial(text.clone());
                        return Some((event, Some((chunks, text))));
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "chat stream failed");
                    return Some((ReplyEvent::Failed(e.to_string()), None));
                }
                None => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::messages::{ChatChunk, Role};

    fn chunks(items: Vec<Result<ChatChunk, ClientError>>) -> ChunkStream {
        stream::iter(items).boxed()
    }

    #[test]
    fn preamble_first_with_empty_history() {
        let messages = build_messages("hi", &[]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::system(SYSTEM_PREAMBLE));
        assert_eq!(messages[1], Message::user("hi"));
    }

    #[test]
    fn history_alternates_user_and_assistant() {
        let history = vec![
            Turn {
                user_text: "a".into(),
                assistant_text: "b".into(),
            },
            Turn {
                user_text: "c".into(),
                assistant_text: String::new(),
            },
        ];
        let roles: Vec<Role> = build_messages("d", &history)
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User
            ]
        );
    }

    #[tokio::test]
    async fn error_after_content_ends_stream() {
        let events: Vec<_> = accumulate(chunks(vec![
            Ok(ChatChunk::with_content("Hel")),
            Err(ClientError::Server("model unloaded".into())),
            Ok(ChatChunk::with_content("never")),
        ]))
        .collect()
        .await;
        assert_eq!(
            events,
            vec![
                ReplyEvent::Partial("Hel".into()),
                ReplyEvent::Failed("model unloaded".into())
            ]
        );
        assert_eq!(events[1].render(), "Error: model unloaded");
    }
}
