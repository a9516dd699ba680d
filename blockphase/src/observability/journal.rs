//! Session journal
//!
//! One JSON object per line for every event a session handles. Each record
//! carries a `"type"` tag and a `sequence` number that increases by one per
//! record, so a journal can be replayed or diffed line by line.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A journal entry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Record {
    /// The session loop started.
    SessionStarted {
        /// When the loop started.
        timestamp: DateTime<Utc>,
        /// Machine name.
        machine: String,
        /// Phase the session starts in.
        phase: String,
    },

    /// An event was taken off the queue.
    EventReceived {
        /// When processing began.
        timestamp: DateTime<Utc>,
        /// Event name.
        event: String,
        /// Current phase at that moment.
        phase: String,
    },

    /// A transition fired.
    TransitionFired {
        /// When the phase changed.
        timestamp: DateTime<Utc>,
        /// Event name.
        event: String,
        /// Transition handle.
        transition: u32,
        /// Phase left.
        from: String,
        /// Phase entered.
        to: String,
    },

    /// No guard passed; the phase is unchanged.
    EventIgnored {
        /// When processing ended.
        timestamp: DateTime<Utc>,
        /// Event name.
        event: String,
        /// Current phase.
        phase: String,
        /// Guards evaluated.
        candidates: usize,
    },

    /// A guard or exec graph failed.
    EvaluationFailed {
        /// When processing ended.
        timestamp: DateTime<Utc>,
        /// Event name.
        event: String,
        /// Current phase.
        phase: String,
        /// Error message.
        error: String,
    },

    /// The session loop stopped.
    SessionStopped {
        /// When the loop exited.
        timestamp: DateTime<Utc>,
        /// Phase the session ended in.
        phase: String,
        /// Events handled.
        events: u64,
    },
}

#[derive(Debug, Serialize)]
struct RecordEnvelope {
    sequence: u64,
    #[serde(flatten)]
    record: Record,
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL writer.
///
/// Serialization or I/O failures are dropped; a broken journal never stops
/// a session.
pub struct Journal {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Journal {
    /// Creates a journal over any writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Journal on stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Journal that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Journal written to a new file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Appends a record as one line and flushes.
    pub fn record(&self, record: Record) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = RecordEnvelope { sequence, record };

        if let Ok(mut w) = self.writer.lock()
            && let Ok(line) = serde_json::to_string(&envelope)
        {
            let _ = writeln!(w, "{line}");
            let _ = w.flush();
        }
    }

    /// Number of records written so far.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}
