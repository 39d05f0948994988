//! Index build progress reporting.
//!
//! Reports what `philo build` is doing per school: scanning the data
//! directory, how many chunks are embedded so far, and when the index is
//! installed. Progress goes to **stderr** so stdout stays parseable.

use std::io::Write;

/// A single progress event for an index build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildProgressEvent {
    /// Reading the school's data directory. Total unknown.
    Scanning { school: String },
    /// `n` of `total` chunks embedded.
    Embedding { school: String, n: u64, total: u64 },
    /// Index persisted and installed.
    Done { school: String, chunks: u64 },
}

/// Reports build progress. Implementations write to stderr (human or JSON).
pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress: "build stoicism  embedding  128 / 1,024 chunks".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Scanning { school } => format!("build {}  scanning...\n", school),
            BuildProgressEvent::Embedding { school, n, total } => format!(
                "build {}  embedding  {} / {} chunks\n",
                school,
                format_number(*n),
                format_number(*total)
            ),
            BuildProgressEvent::Done { school, chunks } => {
                format!("build {}  done  {} chunks\n", school, format_number(*chunks))
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &BuildProgressEvent) -> serde_json::Value {
        match event {
            BuildProgressEvent::Scanning { school } => serde_json::json!({
                "event": "progress",
                "school": school,
                "phase": "scanning"
            }),
            BuildProgressEvent::Embedding { school, n, total } => serde_json::json!({
                "event": "progress",
                "school": school,
                "phase": "embedding",
                "n": n,
                "total": total
            }),
            BuildProgressEvent::Done { school, chunks } => serde_json::json!({
                "event": "progress",
                "school": school,
                "phase": "done",
                "chunks": chunks
            }),
        }
    }
}

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
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

    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!("unknown progress mode '{}': expected human, json or off", other)),
        }
    }
}
