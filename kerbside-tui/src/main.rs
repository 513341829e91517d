//! Terminal console for operating a kerbside district: bins, pickups, routes, and reports.

mod app;
mod config;
mod input;
mod seed;
mod ui;

use std::{io, sync::Arc, time::Duration as StdDuration};

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use kerbside_core::{EventDispatcher, EventSink, KerbsideService, SystemClock, TracingSink};
use kerbside_store_memory::{MemoryStore, OfflinePaymentGateway, backend};
use ratatui::{Terminal, backend::CrosstermBackend};
use reqwest::Client;
use tracing::info;

use crate::app::App;
use crate::config::Config;
use crate::input::Action;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load();
    let _guard = config::init_logging(&config.log_dir)?;

    // HTTP + event sinks
    let client = Client::builder().user_agent("kerbside/0.1").build()?;
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink)];
    if let Some(url) = &config.webhook_url {
        info!(endpoint = %url, "forwarding events to webhook");
        sinks.push(kerbside_notify_webhook::sink(client, url.clone()));
    }

    let dispatcher = EventDispatcher::new(sinks);
    info!(sinks = dispatcher.sink_count(), "event delivery ready");

    let store = Arc::new(MemoryStore::new());
    let service = KerbsideService::new(
        backend(
            &store,
            Arc::new(OfflinePaymentGateway::new()),
            Arc::new(SystemClock),
        ),
        dispatcher,
    );

    let home = config.home();
    let cast = seed::populate(&store, &service, &home).await?;
    info!(operator = %cast.operator.id, "console starting");

    // App state
    let mut app = App::new(service, cast, home);
    app.refresh().await;

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run event loop
    let res = run(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    info!("console stopped");
    res
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Poll for input (non-blocking, small timeout to keep CPU low)
        if event::poll(StdDuration::from_millis(100))?
            && let CEvent::Key(key) = event::read()?
        {
            match input::handle_key_event(key, &mut app) {
                Action::Quit => break,
                Action::None => {}
                action => {
                    app.is_loading = true;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    app.perform(action).await;
                    app.is_loading = false;
                }
            }
        }
    }

    Ok(())
}
