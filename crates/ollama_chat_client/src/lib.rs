//! Ollama chat client library: configuration, a lazily reconnecting inference
//! client, streamed reply accumulation, and the turn controller a chat UI drives.
//! Used by the `ollama-chat` terminal front end.

pub mod client;
pub mod config;
pub mod messages;
pub mod session;
pub mod settings;
pub mod stream;
pub mod tab;

pub use client::{
    ChatBackend, ChunkStream, ClientError, ConnectionState, Connector, InferenceClient,
    OllamaClient, OllamaConnector,
};
pub use config::OllamaConfig;
pub use messages::{ChatChunk, ChatRequest, Message, Role};
pub use session::{clear_history, ChatSession, Turn};
pub use settings::{
    register_settings, OptionInfo, SettingsError, SettingsFile, SettingsRegistry, SettingsStore,
};
pub use stream::{build_messages, stream_reply, ReplyEvent, SYSTEM_PREAMBLE};
pub use tab::{ChatTab, ReplyStatus};
