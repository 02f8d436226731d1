//! Worker output scraping.
//!
//! The worker prints periodic throughput reports such as
//! `speed 10s/60s/15m 812.4 n/a n/a H/s max 830.1 H/s`. The text after
//! `speed`, up to an optional `;`, becomes the node's hashrate figure.

use std::borrow::Cow;

use p2pminer_core::{EventBus, NodeEvent, StatusHandle};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

const ESC: char = '\u{1b}';

/// Removes ANSI escape sequences (`ESC [ params final`).
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    if !line.contains(ESC) {
        return Cow::Borrowed(line);
    }

    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c != ESC {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'[') {
            chars.next();
            // Parameters and intermediates run until a byte in '@'..='~'.
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
        }
    }
    Cow::Owned(out)
}

/// Extracts the throughput figure from one output line, if it carries one.
pub fn parse_hashrate(line: &str) -> Option<String> {
    let line = strip_ansi(line);
    if !line.contains("H/s") {
        return None;
    }
    let (_, rest) = line.split_once("speed")?;
    let figure = rest.split(';').next().map(str::trim)?;
    (!figure.is_empty()).then(|| figure.to_string())
}

/// Reads worker stdout to the end, recording every throughput figure.
/// When the stream ends the status returns to unavailable.
pub async fn scrape_stdout<R>(stdout: R, status: StatusHandle, events: EventBus)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: "worker", "{}", strip_ansi(&line));
                if let Some(hashrate) = parse_hashrate(&line) {
                    status.record_hashrate(hashrate.clone());
                    events.emit(NodeEvent::HashrateUpdated { hashrate });
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read worker output");
                break;
            }
        }
    }

    info!("Worker output finished");
    status.mark_unavailable();
}

/// Logs worker stderr lines as warnings until the stream ends.
pub async fn log_stderr<R>(stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!(target: "worker", "{}", strip_ansi(&line));
    }
}
