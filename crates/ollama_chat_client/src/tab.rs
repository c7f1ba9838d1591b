//! Chat tab: the state a UI host binds its widgets to (model choice, host field,
//! transcript) and the send / clear actions those widgets trigger.

use futures_util::StreamExt;

use crate::client::Connector;
use crate::config::OllamaConfig;
use crate::session::{clear_history, ChatSession, Turn};
use crate::settings::SettingsStore;
use crate::stream::ReplyEvent;

/// How a send action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Complete,
    Failed,
}

pub struct ChatTab<C: Connector> {
    config: OllamaConfig,
    session: ChatSession<C>,
    history: Vec<Turn>,
    model: String,
    host: String,
}

impl<C: Connector> ChatTab<C> {
    /// Open the tab: refresh `config` from `store`, then seed the model and host
    /// fields from the refreshed defaults.
    pub fn open(mut config: OllamaConfig, store: &dyn SettingsStore, connector: C) -> Self {
        config.refresh(store);
        Self {
            model: config.default_model.clone(),
            host: config.default_host.clone(),
            history: clear_history(),
            session: ChatSession::new(connector),
            config,
        }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    pub fn model_choices(&self) -> &[String] {
        &self.config.available_models
    }

    pub fn selected_model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn session(&self) -> &ChatSession<C> {
        &self.session
    }

    /// Clear action: drop the transcript.
    pub fn clear(&mut self) {
        self.history = clear_history();
    }

    /// Send action: stream a reply to `message`, storing every history update and
    /// handing it to `on_update` for redraw.
    pub async fn send<F>(&mut self, message: &str, mut on_update: F) -> ReplyStatus
    where
        F: FnMut(&ReplyEvent, &[Turn]),
    {
        let mut updates = self.session.submit_events(
            message,
            Some(self.history.clone()),
            &self.model,
            &self.host,
        );
        // Shown even if the server never answers.
        self.history.push(Turn::pending(message));
        let mut status = ReplyStatus::Complete;
        while let Some((event, history)) = updates.next().await {
            self.history = history;
            if event.is_failure() {
                status = ReplyStatus::Failed;
            }
            on_update(&event, &self.history);
        }
        status
    }
}
