//! ollama-chat: terminal chat front end for an Ollama server.
//! Reads the settings file, then either answers one message or runs an interactive
//! session on stdin, printing streamed replies to stdout as they arrive.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use ollama_chat_client::settings::{self, SettingsFile};
use ollama_chat_client::{
    register_settings, ChatTab, OllamaConfig, OllamaConnector, ReplyEvent, ReplyStatus, Turn,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Parser)]
#[command(name = "ollama-chat", version, about = "Chat with an Ollama server")]
struct Cli {
    /// Settings file (defaults to ~/.ollama-chat/settings.yaml).
    #[arg(long, env = "OLLAMA_CHAT_SETTINGS")]
    settings: Option<PathBuf>,

    /// Ollama host for this run, overriding the configured default.
    #[arg(long)]
    host: Option<String>,

    /// Model for this run, overriding the configured default.
    #[arg(long)]
    model: Option<String>,

    /// Print the selectable models and exit.
    #[arg(long)]
    list_models: bool,

    /// Send this message, print the reply and exit.
    message: Option<String>,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_env("OLLAMA_CHAT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(true)
        .init();
}

fn resolve_settings_path(cli: &Cli) -> PathBuf {
    if let Some(path) = &cli.settings {
        return path.clone();
    }
    settings::default_settings_path().unwrap_or_else(|| {
        eprintln!("Error: unable to determine settings path (set --settings or OLLAMA_CHAT_SETTINGS)");
        process::exit(1);
    })
}

/// Load the settings file and declare our options in it, writing back any new defaults.
fn load_settings(path: &std::path::Path) -> SettingsFile {
    let mut store = match settings::load_or_default(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to load settings from {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    let before = store.clone();
    register_settings(&OllamaConfig::load_defaults(), &mut store);
    if store != before {
        if let Err(e) = settings::save(path, &store) {
            tracing::warn!(path = %path.display(), error = %e, "could not save settings");
        }
    }
    store
}

/// Prints the growing reply of the trailing turn as deltas.
#[derive(Default)]
struct TranscriptPrinter {
    shown: String,
}

impl TranscriptPrinter {
    fn update(&mut self, event: &ReplyEvent, history: &[Turn]) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        match event {
            ReplyEvent::Partial(_) => {
                let Some(turn) = history.last() else { return };
                let text = &turn.assistant_text;
                match text.strip_prefix(self.shown.as_str()) {
                    Some(delta) => {
                        let _ = write!(out, "{}", delta);
                    }
                    None => {
                        let _ = write!(out, "\n{}", text);
                    }
                }
                let _ = out.flush();
                self.shown = text.clone();
            }
            ReplyEvent::Failed(_) => {
                if !self.shown.is_empty() {
                    let _ = writeln!(out);
                }
                let _ = out.flush();
                eprintln!("{}", event.render());
                self.shown.clear();
            }
        }
    }

    /// Terminate the reply line, if one was started.
    fn finish(&mut self) {
        if !self.shown.is_empty() {
            println!();
        }
        self.shown.clear();
    }
}

async fn run_once(tab: &mut ChatTab<OllamaConnector>, message: &str) -> i32 {
    let mut printer = TranscriptPrinter::default();
    let status = tab
        .send(message, |event, history| printer.update(event, history))
        .await;
    printer.finish();
    match status {
        ReplyStatus::Complete => 0,
        ReplyStatus::Failed => 1,
    }
}

async fn run_interactive(tab: &mut ChatTab<OllamaConnector>) {
    let prompt = io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if prompt {
            print!("> ");
            let _ = io::stdout().flush();
        }
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error: failed to read stdin: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) | ("/exit", _) => break,
            ("/clear", _) => {
                tab.clear();
                println!("(history cleared)");
            }
            ("/models", _) => {
                for model in tab.model_choices() {
                    let marker = if model == tab.selected_model() { "*" } else { " " };
                    println!("{} {}", marker, model);
                }
            }
            ("/model", name) if !name.trim().is_empty() => {
                tab.set_model(name.trim());
                println!("(model: {})", tab.selected_model());
            }
            ("/host", url) if !url.trim().is_empty() => {
                tab.set_host(url.trim());
                println!("(host: {})", tab.host());
            }
            _ => {
                run_once(tab, line).await;
            }
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let settings_path = resolve_settings_path(&cli);
    let store = load_settings(&settings_path);

    let mut tab = ChatTab::open(OllamaConfig::load_defaults(), &store, OllamaConnector::default());
    if let Some(host) = &cli.host {
        tab.set_host(host.as_str());
    }
    if let Some(model) = &cli.model {
        tab.set_model(model.as_str());
    }

    if cli.list_models {
        for model in tab.model_choices() {
            println!("{}", model);
        }
        return;
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    let code = rt.block_on(async {
        match cli.message.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => run_once(&mut tab, message).await,
            Some(_) => {
                eprintln!("Error: empty message");
                1
            }
            None => {
                run_interactive(&mut tab).await;
                0
            }
        }
    });
    process::exit(code);
}
