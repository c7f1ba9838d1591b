//! Turn controller: drives one streamed reply per submission and keeps the
//! trailing turn of the history in step with it.

use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{Connector, InferenceClient};
use crate::stream::{stream_reply, ReplyEvent};

/// One exchange of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user_text: String,
    pub assistant_text: String,
}

impl Turn {
    /// A turn whose reply has not arrived yet.
    pub fn pending(user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            assistant_text: String::new(),
        }
    }
}

/// History after a clear action.
pub fn clear_history() -> Vec<Turn> {
    Vec::new()
}

/// Owns the inference client wrapper and runs submissions against it.
///
/// Submissions must not overlap; `&mut self` on [`ChatSession::submit`] enforces it
/// for the reconnect step, and callers finish one stream before starting the next.
pub struct ChatSession<C: Connector> {
    client: InferenceClient<C>,
}

impl<C: Connector> ChatSession<C> {
    pub fn new(connector: C) -> Self {
        Self {
            client: InferenceClient::new(connector),
        }
    }

    pub fn client(&self) -> &InferenceClient<C> {
        &self.client
    }

    /// Submit `message`. Yields `(cleared input, history so far)` once per reply update.
    ///
    /// Exactly one turn is appended to `history`; earlier turns are passed through
    /// untouched. A missing history counts as empty.
    pub fn submit(
        &mut self,
        message: &str,
        history: Option<Vec<Turn>>,
        model: &str,
        host: &str,
    ) -> BoxStream<'static, (String, Vec<Turn>)> {
        self.submit_events(message, history, model, host)
            .map(|(_, history)| (String::new(), history))
            .boxed()
    }

    /// Like [`ChatSession::submit`], but pairs each history snapshot with the reply
    /// event that produced it.
    pub fn submit_events(
        &mut self,
        message: &str,
        history: Option<Vec<Turn>>,
        model: &str,
        host: &str,
    ) -> BoxStream<'static, (ReplyEvent, Vec<Turn>)> {
        let prior = history.unwrap_or_default();
        debug!(model, host, prior_turns = prior.len(), "submitting chat turn");

        let replies = match self.client.ensure_connected(host) {
            Ok(handle) => stream_reply(handle, message, &prior, model),
            Err(e) => {
                warn!(error = %e, host, "could not connect");
                stream::iter(std::iter::once(ReplyEvent::Failed(e.to_string()))).boxed()
            }
        };

        let mut history = prior;
        history.push(Turn::pending(message));
        replies
            .map(move |event| {
                if let Some(last) = history.last_mut() {
                    last.assistant_text = event.render();
                }
                (event, history.clone())
            })
            .boxed()
    }
}
