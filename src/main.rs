use anyhow::{Context, Result};

mod api;
mod app;
mod config;
mod format;
mod handler;
mod history;
mod markdown;
mod message;
mod sse;
mod theme;
mod tui;
mod ui;

use app::App;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = config::Config::load().unwrap_or_else(|_| config::Config::new());
    let client = api::ChatClient::new(&config)?;
    let history = history::HistoryStore::open()?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();
    let tx = events.sender();

    let mut app = App::new(&config, history, client);
    tracing::info!("started with model {}", config.model());

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;
        if let Some(event) = events.next().await {
            handler::handle_event(&mut app, event, &tx)?;
        }
    }

    tui::restore()?;
    Ok(())
}

/// The terminal owns stderr, so diagnostics go to a file under the data dir.
fn init_logging() -> Result<()> {
    let dir = dirs::data_dir()
        .context("could not determine data directory")?
        .join("mathchat");
    std::fs::create_dir_all(&dir)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("mathchat.log"))?;

    tracing_subscriber::fmt()
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    Ok(())
}
