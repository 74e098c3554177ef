use std::sync::Arc;

use anyhow::Context;
use taggr_link::bluetooth::{BtleplugTransport, RetryController, ScanDispatcher, SessionSequencer};
use taggr_link::config::{default_settings_path, AppConfig};
use taggr_link::status::{SharedStatusSink, StatusBoard};
use taggr_link::configure_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("scan") => scan().await,
        Some("config") => show_config(),
        Some(_) => {
            print_usage();
            Ok(())
        }
    }
}

async fn scan() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading settings")?;
    if let Err(e) = configure_logging(config.log_level, config.log_file.clone(), true) {
        eprintln!("Logging unavailable: {}", e);
    }

    let transport = Arc::new(
        BtleplugTransport::new()
            .await
            .context("opening Bluetooth adapter")?,
    );
    let board = StatusBoard::new();
    let sink: SharedStatusSink = Arc::new(board.clone());

    let sequencer = SessionSequencer::new(transport.clone(), sink.clone(), config.to_session_config());
    let retry = RetryController::new(config.to_retry_policy());
    let dispatcher = Arc::new(
        ScanDispatcher::new(transport, sink, sequencer, retry).with_name_prefix(&config.name_prefix),
    );

    dispatcher.start().await.context("starting scan")?;
    render(&board.snapshot().render());

    let mut updates = board.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let lines = updates.borrow_and_update().render();
                render(&lines);
            }
        }
    }

    dispatcher.stop().await.context("stopping scan")?;
    Ok(())
}

fn render(lines: &[String]) {
    println!("----");
    for line in lines {
        println!("{}", line);
    }
}

fn show_config() -> anyhow::Result<()> {
    let path = default_settings_path();
    let config = AppConfig::load_from(&path).context("loading settings")?;
    println!("Settings file: {}", path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn print_usage() {
    println!("Usage:");
    println!("  taggr-link [scan]   - Scan for Taggr devices and run a session with each");
    println!("  taggr-link config   - Show the effective settings");
}
