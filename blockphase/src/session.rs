//! Event session
//!
//! A session owns a [`PhaseDb`] inside a tokio task and processes events
//! strictly one at a time, in the order they were sent. Callers talk to it
//! through a cloneable [`SessionHandle`]. Edits to the database go through
//! [`SessionHandle::with_db`], which runs between two events, so a graph is
//! never changed while one of its scripts is being evaluated.
//!
//! ```no_run
//! # async fn demo() -> Result<(), blockphase::error::PhaseError> {
//! use blockphase::phase::{Phase, PhaseDb};
//! use blockphase::session::Session;
//! use serde_json::Value;
//!
//! let db = PhaseDb::new("cards", Phase::new("lobby"));
//! let evaluator = |_: &str, _: &mut blockphase::evaluator::GameState| {
//!     Ok::<_, blockphase::error::EvalError>(Value::Bool(true))
//! };
//! let (handle, task) = Session::new(db, evaluator).spawn();
//! handle.dispatch("start").await?;
//! handle.shutdown();
//! let db = task.await.expect("session task panicked");
//! # let _ = db;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PhaseError;
use crate::evaluator::ScriptEvaluator;
use crate::observability::{Journal, Record};
use crate::phase::{GameEvent, Outcome, PhaseDb};

type Reply = oneshot::Sender<Result<Outcome, PhaseError>>;
type Edit = Box<dyn FnOnce(&mut PhaseDb) + Send>;

enum Command {
    Dispatch { event: GameEvent, reply: Reply },
    With(Edit),
}

// ============================================================================
// Session
// ============================================================================

/// A phase database paired with the evaluator that runs its scripts.
pub struct Session<E> {
    db: PhaseDb,
    evaluator: E,
    journal: Option<Arc<Journal>>,
    cancel: CancellationToken,
}

impl<E> Session<E>
where
    E: ScriptEvaluator + Send + 'static,
{
    /// Creates a session that is not running yet.
    pub fn new(db: PhaseDb, evaluator: E) -> Self {
        Self {
            db,
            evaluator,
            journal: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Records every handled event in `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Stops the session when `token` (or a parent of it) is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Starts the event loop on the current tokio runtime.
    ///
    /// The task yields the database back once the loop has stopped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(self) -> (SessionHandle, JoinHandle<PhaseDb>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            tx,
            cancel: self.cancel.clone(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) -> PhaseDb {
        info!(
            machine = self.db.name(),
            phase = self.db.current_name(),
            "session started"
        );
        self.journal(|db| Record::SessionStarted {
            timestamp: Utc::now(),
            machine: db.name().to_string(),
            phase: db.current_name().to_string(),
        });

        let mut handled = 0_u64;
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("session cancelled");
                    break;
                }
                command = rx.recv() => match command {
                    Some(command) => handled += self.handle(command),
                    None => break,
                }
            }
        }

        // Anything queued before the shutdown still gets an answer.
        rx.close();
        while let Ok(command) = rx.try_recv() {
            handled += self.handle(command);
        }

        info!(phase = self.db.current_name(), events = handled, "session stopped");
        self.journal(|db| Record::SessionStopped {
            timestamp: Utc::now(),
            phase: db.current_name().to_string(),
            events: handled,
        });
        self.db
    }

    /// Handles one command, returning the number of events processed.
    fn handle(&mut self, command: Command) -> u64 {
        match command {
            Command::Dispatch { event, reply } => {
                let result = self.process(&event);
                if reply.send(result).is_err() {
                    debug!(%event, "dispatcher went away before the reply");
                }
                1
            }
            Command::With(edit) => {
                edit(&mut self.db);
                0
            }
        }
    }

    fn process(&mut self, event: &GameEvent) -> Result<Outcome, PhaseError> {
        let phase = self.db.current_name().to_string();
        self.journal(|_| Record::EventReceived {
            timestamp: Utc::now(),
            event: event.name().to_string(),
            phase: phase.clone(),
        });

        let result = self.db.process(event, &mut self.evaluator);
        match &result {
            Ok(Outcome::Fired {
                transition,
                from,
                to,
            }) => self.journal(|_| Record::TransitionFired {
                timestamp: Utc::now(),
                event: event.name().to_string(),
                transition: transition.0,
                from: from.clone(),
                to: to.clone(),
            }),
            Ok(Outcome::Ignored { candidates }) => self.journal(|_| Record::EventIgnored {
                timestamp: Utc::now(),
                event: event.name().to_string(),
                phase: phase.clone(),
                candidates: *candidates,
            }),
            Err(err) => {
                warn!(%event, error = %err, "event processing failed");
                self.journal(|_| Record::EvaluationFailed {
                    timestamp: Utc::now(),
                    event: event.name().to_string(),
                    phase: phase.clone(),
                    error: err.to_string(),
                });
            }
        }
        result
    }

    fn journal(&self, record: impl FnOnce(&PhaseDb) -> Record) {
        if let Some(journal) = &self.journal {
            journal.record(record(&self.db));
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable sender side of a running [`Session`].
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// Queues an event and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the processing error for this event, or
    /// [`PhaseError::SessionClosed`] if the session stopped first.
    pub async fn dispatch(&self, event: impl Into<GameEvent>) -> Result<Outcome, PhaseError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(Command::Dispatch {
                event: event.into(),
                reply,
            })
            .map_err(|_| PhaseError::SessionClosed)?;
        outcome.await.map_err(|_| PhaseError::SessionClosed)?
    }

    /// Runs `edit` against the database between two events and returns its
    /// result.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::SessionClosed`] if the session stopped first.
    pub async fn with_db<R, F>(&self, edit: F) -> Result<R, PhaseError>
    where
        F: FnOnce(&mut PhaseDb) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let edit: Edit = Box::new(move |db| {
            let _ = reply.send(edit(db));
        });
        self.tx
            .send(Command::With(edit))
            .map_err(|_| PhaseError::SessionClosed)?;
        result.await.map_err(|_| PhaseError::SessionClosed)
    }

    /// Asks the session to stop once the commands already queued are done.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the session no longer accepts commands.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
