//! Headless console client for the avatar backend.
//!
//! Connects to a backend, picks the first catalog character, and runs a
//! text REPL while logging what the avatar would present. Useful for
//! exercising a backend without the rendering frontend.

use anyhow::{Context, Result};
use avatalk::client::AvatarClient;
use avatalk::config::ClientConfig;
use avatalk::playback::{CancelToken, Presenter};
use avatalk::state::Author;
use avatalk::voice::{CaptureEvent, CaptureSource};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Presenter that logs directives and simulates audio playback by
/// sleeping for the clip duration.
struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn set_expression(&self, name: &str) {
        info!("[avatar] expression: {}", name);
    }

    fn start_motion(&self, group: &str, index: u32, priority: u32) {
        info!("[avatar] motion: {}[{}] priority {}", group, index, priority);
    }

    fn play_audio(&self, wav: Vec<u8>, cancel: &CancelToken) -> avatalk::Result<()> {
        let duration = wav_duration(&wav).unwrap_or(Duration::from_millis(500));
        info!("[avatar] playing {:.1}s of audio", duration.as_secs_f32());
        let deadline = std::time::Instant::now() + duration;
        while std::time::Instant::now() < deadline {
            if cancel.is_cancelled() {
                info!("[avatar] playback cancelled");
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        Ok(())
    }
}

fn wav_duration(wav: &[u8]) -> Option<Duration> {
    let reader = hound::WavReader::new(std::io::Cursor::new(wav)).ok()?;
    let spec = reader.spec();
    let frames = reader.duration() as f64;
    Some(Duration::from_secs_f64(frames / spec.sample_rate as f64))
}

/// No microphone in the console client; capture start/pause are no-ops
/// and no capture events are ever produced.
struct NullCapture;

impl CaptureSource for NullCapture {
    fn start(&mut self) -> avatalk::Result<()> {
        Ok(())
    }

    fn pause(&mut self) -> avatalk::Result<()> {
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avatalk=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let backend_url =
        std::env::var("AVATALK_BACKEND_URL").unwrap_or_else(|_| "localhost:8000".to_string());
    info!("Starting avatalk console client against {}", backend_url);

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let _guard = runtime.enter();

    let config = ClientConfig::new(backend_url);
    let (_capture_tx, capture_rx) =
        crossbeam_channel::bounded::<CaptureEvent>(config.channel_capacity);
    let client = AvatarClient::new(config, Arc::new(ConsolePresenter), NullCapture, capture_rx)?;

    let characters = runtime
        .block_on(client.fetch_characters())
        .context("failed to fetch character catalog")?;
    let first = characters
        .first()
        .context("backend returned an empty character catalog")?;
    info!("Selecting character '{}'", first.name);
    client.select_character(&first.id);

    // Print AI replies as they grow.
    let updates = client.subscribe();
    std::thread::spawn(move || {
        let mut last_printed = String::new();
        for snapshot in updates {
            if let Some(message) = snapshot.messages.last() {
                if message.author == Author::Ai && message.text != last_printed {
                    println!("ai> {}", message.text);
                    last_printed = message.text.clone();
                }
            }
        }
    });

    println!("Type a message, '/interrupt' to stop the AI, or '/quit' to exit.");
    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "" => {}
            "/quit" => break,
            "/interrupt" => client.interrupt(),
            text => client.send_text(text),
        }
    }

    client.disconnect();
    info!("Goodbye");
    Ok(())
}
