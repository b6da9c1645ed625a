// I420 Player - demo binary
// Opens a render window and plays a synthetic color-bar stream

use anyhow::{Context, Result};
use i420_player_lib::convert::fill_color_bars;
use i420_player_lib::renderer::i420_frame_len;
use i420_player_lib::{PlayerConfig, RenderWindow, WindowEvent};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);
/// Frames between resolution switches
const FRAMES_PER_RESOLUTION: u64 = 150;
const RESOLUTIONS: [(u32, u32); 2] = [(1280, 720), (640, 480)];

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .try_init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => PlayerConfig::from_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    tracing::info!(?config, "Starting player");

    let handle = RenderWindow::create(config).context("creating render window")?;
    let submitter = handle.submitter();
    let producer_handle = handle.clone();

    let producer = std::thread::Builder::new()
        .name("color-bars".to_string())
        .spawn(move || {
            let mut frame = Vec::new();
            let mut index = 0u64;
            let mut next = Instant::now();
            while producer_handle.is_open() {
                let (width, height) =
                    RESOLUTIONS[(index / FRAMES_PER_RESOLUTION) as usize % RESOLUTIONS.len()];
                let Some(len) = i420_frame_len(width, height) else {
                    break;
                };
                frame.resize(len, 0);

                if let Err(e) = fill_color_bars(&mut frame, width, height, index)
                    .and_then(|_| submitter.submit(&frame, width, height))
                {
                    tracing::error!("Failed to submit frame {}: {}", index, e);
                    break;
                }
                index += 1;

                next += FRAME_INTERVAL;
                let now = Instant::now();
                if next > now {
                    std::thread::sleep(next - now);
                } else {
                    next = now;
                }
            }
            index
        })
        .context("spawning producer thread")?;

    let mut failure = None;
    while let Some(event) = handle.recv_event() {
        match event {
            WindowEvent::CloseRequested => break,
            WindowEvent::Failed(reason) => {
                failure = Some(reason);
                break;
            }
            WindowEvent::Resized(width, height) => {
                tracing::debug!("Window resized to {}x{}", width, height);
            }
            WindowEvent::Focused(_) => {}
        }
    }
    handle.close();

    let produced = producer
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
    let stats = handle.stats();
    tracing::info!(
        produced,
        submitted = stats.submitted,
        dropped = stats.dropped,
        "Player stopped"
    );

    match failure {
        Some(reason) => Err(anyhow::anyhow!("renderer failed: {}", reason)),
        None => Ok(()),
    }
}
