//! Import progress reporting.
//!
//! The pipeline reports what it is doing through an [`ImportObserver`]
//! instead of printing. Progress goes to **stderr** so stdout stays
//! reserved for the final summary.

use std::io::Write;
use std::time::Duration;

use crate::import::ImportStage;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ImportEvent {
    /// The orchestrator entered a new stage.
    Stage { stage: ImportStage },
    /// One chunk finished (successfully or not).
    Chunk {
        label: String,
        index: usize,
        total: usize,
        records: usize,
        ok: bool,
    },
    /// A chunk will be retried after `delay`.
    Retry {
        label: String,
        attempt: u32,
        delay: Duration,
        reason: String,
    },
}

/// Receives progress events. Implementations write to stderr (human or JSON).
pub trait ImportObserver: Send + Sync {
    fn report(&self, event: ImportEvent);
}

/// Human-friendly progress on stderr: "contacts  batch 2/3  100 records  ok".
pub struct StderrProgress;

impl ImportObserver for StderrProgress {
    fn report(&self, event: ImportEvent) {
        let line = match &event {
            ImportEvent::Stage { stage } => format!("==> {}\n", stage.describe()),
            ImportEvent::Chunk {
                label,
                index,
                total,
                records,
                ok,
            } => format!(
                "{}  batch {}/{}  {} records  {}\n",
                label,
                index + 1,
                total,
                records,
                if *ok { "ok" } else { "FAILED" }
            ),
            ImportEvent::Retry {
                label,
                attempt,
                delay,
                reason,
            } => format!(
                "{}  retry {} in {:.1}s ({})\n",
                label,
                attempt,
                delay.as_secs_f64(),
                reason
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ImportObserver for JsonProgress {
    fn report(&self, event: ImportEvent) {
        let obj = match &event {
            ImportEvent::Stage { stage } => serde_json::json!({
                "event": "stage",
                "stage": stage.name(),
            }),
            ImportEvent::Chunk {
                label,
                index,
                total,
                records,
                ok,
            } => serde_json::json!({
                "event": "chunk",
                "label": label,
                "index": index,
                "total": total,
                "records": records,
                "ok": ok
            }),
            ImportEvent::Retry {
                label,
                attempt,
                delay,
                reason,
            } => serde_json::json!({
                "event": "retry",
                "label": label,
                "attempt": attempt,
                "delay_secs": delay.as_secs_f64(),
                "reason": reason
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op observer when progress is disabled.
pub struct NoProgress;

impl ImportObserver for NoProgress {
    fn report(&self, _event: ImportEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Parse a `--progress` value; `auto` picks human output on a TTY.
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "auto" => Ok(Self::default_for_tty()),
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!(
                "Unknown progress mode: '{}'. Must be auto, off, human, or json.",
                other
            ),
        }
    }

    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn observer(&self) -> Box<dyn ImportObserver> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
