// Entry point: wire the store, audio sink, resolver, catalog, and
// playback engine together and hand them to the TUI.

mod catalog;
mod error;
mod player;
mod resolver;
mod store;
mod track;
mod ui;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::catalog::RemoteCatalog;
use crate::player::audio::RodioSink;
use crate::player::engine::PlayerEngine;
use crate::player::session::PlayerSession;
use crate::resolver::YtDlpResolver;
use crate::store::Store;
use crate::ui::app::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Suppress ALSA buffer warnings that would pollute the TUI.
    std::env::set_var("ALSA_PCM_NO_MMAP", "1");

    let data_dir = dirs::config_dir()
        .context("no config directory")?
        .join("resonate");
    std::fs::create_dir_all(&data_dir)?;

    // The TUI owns the terminal, so logs go to a file instead.
    let log_file = std::fs::File::create(data_dir.join("resonate.log"))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::sync::Arc::new(log_file))
        .with_ansi(false)
        .init();

    let store = Store::open()?;
    let region = store.region().to_string();

    let sink = Box::new(RodioSink::new(data_dir.join("stream-cache")));
    let resolver = Arc::new(YtDlpResolver::new());
    let catalog = Arc::new(RemoteCatalog::new(
        std::env::var("RESONATE_CATALOG_URL").ok(),
    ));

    let (engine, player_events) = PlayerEngine::new();
    let session = PlayerSession::new(engine, sink, resolver, catalog, region);

    let mut app = App::new(session, store, player_events);
    app.run().await
}
