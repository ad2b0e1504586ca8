//! Progress reporting for long operations.
//!
//! The engine publishes [`ProgressEvent`]s into a `tokio::sync::watch`
//! channel through [`ChannelProgress`]. The channel is coalescing: a slow
//! renderer only ever sees the latest tick, and producers never block.
//! The CLI renders events on **stderr** so stdout remains parseable for
//! scripts.

use std::io::Write;

use inbox_lens_core::progress::{ProgressEvent, ProgressSink};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// [`ProgressSink`] that publishes into a watch channel.
pub struct ChannelProgress {
    tx: watch::Sender<Option<ProgressEvent>>,
}

impl ChannelProgress {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressEvent>> {
        self.tx.subscribe()
    }
}

impl Default for ChannelProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        self.tx.send_replace(Some(event));
    }
}

/// Renders progress events. Implementations write to stderr.
pub trait ProgressRenderer: Send + Sync {
    fn render(&self, event: &ProgressEvent);
}

/// Human-friendly progress on stderr: "embedding  1,234 / 5,000".
pub struct StderrProgress;

impl ProgressRenderer for StderrProgress {
    fn render(&self, event: &ProgressEvent) {
        let line = human_line(event);
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

fn human_line(event: &ProgressEvent) -> String {
    format!(
        "{}  {} / {}\n",
        event.phase.as_str(),
        format_number(event.current),
        format_number(event.total)
    )
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressRenderer for JsonProgress {
    fn render(&self, event: &ProgressEvent) {
        let obj = json_event(event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

fn json_event(event: &ProgressEvent) -> serde_json::Value {
    serde_json::json!({
        "event": "progress",
        "phase": event.phase,
        "n": event.current,
        "total": event.total
    })
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn renderer(&self) -> Option<Box<dyn ProgressRenderer>> {
        match self {
            ProgressMode::Off => None,
            ProgressMode::Human => Some(Box::new(StderrProgress)),
            ProgressMode::Json => Some(Box::new(JsonProgress)),
        }
    }

    /// Render every tick observed on `rx` until the sender is dropped.
    pub fn spawn(&self, mut rx: watch::Receiver<Option<ProgressEvent>>) -> Option<JoinHandle<()>> {
        let renderer = self.renderer()?;
        Some(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let event = *rx.borrow_and_update();
                if let Some(event) = event {
                    renderer.render(&event);
                }
            }
        }))
    }
}
