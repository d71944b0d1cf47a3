//! Lifecycle controller: the single owner of all conversion sessions.
//!
//! The controller orchestrates submit → trigger → poll → terminal for every
//! file, and is the only code that writes the session collection. Pollers run
//! as independent tasks and report through an mpsc channel; their output only
//! reaches the collection through [`LifecycleController::apply_update`], which
//! the controller calls from its own `&mut self` methods.
//!
//! # State machine
//! - `uploaded → converting`: right after a successful submit, via `trigger_convert`.
//! - `converting → converting | completed | failed`: driven by poll updates.
//! - `failed → converting`: explicit [`LifecycleController::retry`].
//! - Removal is allowed from every state except `converting`.
//!
//! # Errors
//! Validation and transport failures are returned to the caller *and* surfaced
//! once on the notice channel. A conversion that fails remotely is not an
//! error: it is recorded on the session and can be retried.
//!
//! # Stale updates
//! Each poll started by the controller gets a fresh generation number. An
//! update whose generation is not the session's current one (a query that was
//! in flight when the poll was cancelled, or one from before a retry) is
//! discarded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::contract::{ConversionBackend, ConversionStatus, TransportError};
use crate::notify::{NoticeReceiver, Notifier};
use crate::poller::{self, PollConfig, PollEvent, PollHandle};
use crate::session::{InvalidTransition, Session};
use crate::validation::{validate, Candidate, ValidationError};

pub const REMOVE_WHILE_CONVERTING: &str =
    "Cannot remove a file while it is converting. Please wait for the conversion to finish.";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("File {0} not found")]
    UnknownSession(String),

    #[error(transparent)]
    RetryNotAllowed(#[from] InvalidTransition),

    #[error("{}", REMOVE_WHILE_CONVERTING)]
    RemoveWhileConverting { id: String },

    #[error("File {id} is {status}; its result is only available once completed")]
    NotCompleted { id: String, status: ConversionStatus },
}

/// A document to submit.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A poller's report, tagged with the poll it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollUpdate {
    pub id: String,
    pub generation: u64,
    pub event: PollEvent,
}

struct ActivePoll {
    generation: u64,
    handle: PollHandle,
}

pub struct LifecycleController<B: ?Sized> {
    backend: Arc<B>,
    sessions: Vec<Session>,
    polls: HashMap<String, ActivePoll>,
    next_generation: u64,
    updates_tx: UnboundedSender<PollUpdate>,
    updates_rx: UnboundedReceiver<PollUpdate>,
    notifier: Notifier,
    poll_config: PollConfig,
}

impl<B> LifecycleController<B>
where
    B: ConversionBackend + ?Sized + 'static,
{
    /// Returns the controller and the receiving end of its notice channel.
    pub fn new(backend: Arc<B>, config: &ControllerConfig) -> (Self, NoticeReceiver) {
        let (notifier, notices) = Notifier::channel();
        let (updates_tx, updates_rx) = unbounded_channel();
        let controller = Self {
            backend,
            sessions: Vec::new(),
            polls: HashMap::new(),
            next_generation: 0,
            updates_tx,
            updates_rx,
            notifier,
            poll_config: config.poll_config(),
        };
        (controller, notices)
    }

    /// All sessions, in the order they were added.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn active_polls(&self) -> usize {
        self.polls.len()
    }

    pub fn is_polling(&self, id: &str) -> bool {
        self.polls.contains_key(id)
    }

    /// Run the validation gate on a file's name and size without touching its content.
    /// A rejection is surfaced like any other error.
    pub fn screen(&self, candidate: &Candidate<'_>) -> Result<(), ControllerError> {
        validate(candidate).into_result().map_err(|e| {
            warn!(
                file = %candidate.name,
                size_bytes = candidate.size_bytes,
                reason = %e,
                "Rejected file before upload"
            );
            self.surface(e)
        })
    }

    /// Validate, upload and start converting a document. Returns the new session id.
    pub async fn submit(&mut self, upload: Upload) -> Result<String, ControllerError> {
        let size_bytes = upload.bytes.len() as u64;
        self.screen(&Candidate {
            name: &upload.name,
            size_bytes,
        })?;

        info!(file = %upload.name, size_bytes, "Uploading file");
        let uploaded = match self.backend.submit(upload.bytes, &upload.name).await {
            Ok(resp) => resp,
            Err(e) => {
                error!(file = %upload.name, error = ?e, "Upload failed");
                return Err(self.surface(e));
            }
        };
        let id = uploaded.file_id;

        if self.session(&id).is_some() {
            error!(file_id = %id, "Service returned an id that is already tracked");
            return Err(self.surface(TransportError::Decode(format!(
                "service returned duplicate file id {id}"
            ))));
        }

        info!(file_id = %id, file = %upload.name, "Upload succeeded, starting conversion");
        let triggered = match self.backend.trigger_convert(&id).await {
            Ok(report) => report,
            Err(e) => {
                error!(file_id = %id, error = ?e, "Could not start conversion after upload");
                return Err(self.surface(e));
            }
        };

        let session =
            Session::uploaded(id.clone(), upload.name.clone(), size_bytes).with_report(&triggered);
        let status = session.status();
        self.sessions.push(session);
        info!(file_id = %id, %status, "Tracking new conversion");

        if !status.is_terminal() {
            self.start_poll(&id);
        }
        self.notifier
            .success(format!("File \"{}\" uploaded successfully!", upload.name));
        Ok(id)
    }

    /// Restart a failed conversion with one fresh poll.
    pub async fn retry(&mut self, id: &str) -> Result<(), ControllerError> {
        let index = self.index_of(id)?;
        let previous = self.sessions[index].clone();
        let retried = match previous.retried() {
            Ok(session) => session,
            Err(e) => return Err(self.surface(e)),
        };

        self.release_poll(id);
        self.sessions[index] = retried;
        info!(file_id = %id, "Retrying conversion");

        match self.backend.trigger_convert(id).await {
            Ok(report) => {
                let next = self.sessions[index].with_report(&report);
                let status = next.status();
                self.sessions[index] = next;
                if !status.is_terminal() {
                    self.start_poll(id);
                }
                Ok(())
            }
            Err(e) => {
                error!(file_id = %id, error = ?e, "Retry could not start conversion");
                self.sessions[index] = previous;
                Err(self.surface(e))
            }
        }
    }

    /// Delete a file remotely and stop tracking it. Rejected while converting.
    pub async fn remove(&mut self, id: &str) -> Result<(), ControllerError> {
        let index = self.index_of(id)?;
        if self.sessions[index].status() == ConversionStatus::Converting {
            warn!(file_id = %id, "Refusing to remove a converting file");
            return Err(self.surface(ControllerError::RemoveWhileConverting { id: id.to_string() }));
        }

        if let Err(e) = self.backend.remove(id).await {
            error!(file_id = %id, error = ?e, "Remote delete failed");
            return Err(self.surface(e));
        }

        self.sessions.retain(|s| s.id() != id);
        self.release_poll(id);
        info!(file_id = %id, "Removed file");
        self.notifier.success("File removed successfully");
        Ok(())
    }

    /// Replace the collection with the service's listing and poll every
    /// converting file that is not already being polled.
    pub async fn refresh(&mut self) -> Result<usize, ControllerError> {
        let listing = match self.backend.list_all().await {
            Ok(listing) => listing,
            Err(e) => {
                error!(error = ?e, "Failed to list files");
                return Err(self.surface(e));
            }
        };
        debug!(total = listing.total, received = listing.files.len(), "Fetched file listing");

        let backend = Arc::clone(&self.backend);
        let mut seen = HashSet::new();
        let sessions: Vec<Session> = listing
            .files
            .iter()
            .filter(|info| seen.insert(info.id.clone()))
            .map(|info| Session::from_file_info(info, |id| backend.result_location(id)))
            .collect();

        let stale: Vec<String> = self
            .polls
            .keys()
            .filter(|id| {
                !sessions
                    .iter()
                    .any(|s| s.id() == id.as_str() && s.status() == ConversionStatus::Converting)
            })
            .cloned()
            .collect();
        for id in &stale {
            self.release_poll(id);
        }

        self.sessions = sessions;
        let unpolled: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| {
                s.status() == ConversionStatus::Converting && !self.polls.contains_key(s.id())
            })
            .map(|s| s.id().to_string())
            .collect();
        for id in &unpolled {
            self.start_poll(id);
        }

        info!(
            files = self.sessions.len(),
            polling = self.polls.len(),
            "Reconciled with file listing"
        );
        Ok(self.sessions.len())
    }

    /// Where the converted artifact of a completed file can be fetched from.
    pub fn fetch_result(&self, id: &str) -> Result<String, ControllerError> {
        let session = self.session(id).ok_or_else(|| {
            self.surface(ControllerError::UnknownSession(id.to_string()))
        })?;
        match session.status() {
            ConversionStatus::Completed => Ok(self.backend.result_location(id)),
            status => Err(self.surface(ControllerError::NotCompleted {
                id: id.to_string(),
                status,
            })),
        }
    }

    /// Intake for poller output. Returns whether the update was applied.
    pub fn apply_update(&mut self, update: PollUpdate) -> bool {
        let PollUpdate { id, generation, event } = update;
        if self.polls.get(&id).map(|p| p.generation) != Some(generation) {
            debug!(file_id = %id, generation, "Discarding update from an inactive poll");
            return false;
        }
        let Some(index) = self.sessions.iter().position(|s| s.id() == id) else {
            self.release_poll(&id);
            return false;
        };

        let (next, poll_ended) = match event {
            PollEvent::Status(report) => {
                let ended = report.status != ConversionStatus::Converting;
                (self.sessions[index].with_report(&report), ended)
            }
            PollEvent::GaveUp { error } => {
                let session = &self.sessions[index];
                self.notifier.error(format!(
                    "Lost track of \"{}\": {error}",
                    session.original_name()
                ));
                (session.lost(&error.to_string()), true)
            }
        };

        if next.status() != self.sessions[index].status() {
            info!(file_id = %id, status = %next.status(), "Conversion status changed");
        }
        self.sessions[index] = next;
        if poll_ended {
            self.release_poll(&id);
        }
        true
    }

    /// Apply every update already queued, without waiting. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.updates_rx.try_recv() {
            if self.apply_update(update) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next poll update and apply it. Returns `false` once nothing is polling.
    ///
    /// A poll task that ends without reporting a final status is abandoned and
    /// its session marked failed, so this never waits on a poll that cannot deliver.
    pub async fn next_update(&mut self) -> bool {
        loop {
            // Tasks that had already finished before the drain below cannot send afterwards.
            let finished: Vec<String> = self
                .polls
                .iter()
                .filter(|(_, p)| p.handle.is_finished())
                .map(|(id, _)| id.clone())
                .collect();
            if let Ok(update) = self.updates_rx.try_recv() {
                self.apply_update(update);
                return true;
            }
            for id in finished {
                if self.polls.contains_key(&id) {
                    self.abandon(&id);
                }
            }
            if self.polls.is_empty() {
                return false;
            }
            let wait = self.poll_config.interval;
            if let Ok(Some(update)) = tokio::time::timeout(wait, self.updates_rx.recv()).await {
                self.apply_update(update);
                return true;
            }
        }
    }

    /// Apply updates until no session is being polled.
    pub async fn run_until_settled(&mut self) {
        while self.next_update().await {}
    }

    fn start_poll(&mut self, id: &str) {
        self.release_poll(id);
        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.updates_tx.clone();
        let poll_id = id.to_string();
        let handle = poller::poll(
            Arc::clone(&self.backend),
            id,
            move |event| {
                // The receiver lives as long as the controller.
                let _ = tx.send(PollUpdate {
                    id: poll_id.clone(),
                    generation,
                    event,
                });
            },
            &self.poll_config,
        );
        debug!(file_id = %id, generation, "Started poll");
        self.polls.insert(id.to_string(), ActivePoll { generation, handle });
    }

    fn release_poll(&mut self, id: &str) {
        if let Some(active) = self.polls.remove(id) {
            active.handle.cancel();
            debug!(file_id = %id, generation = active.generation, "Released poll");
        }
    }

    /// A poll task ended without reporting a final status.
    fn abandon(&mut self, id: &str) {
        self.release_poll(id);
        if let Some(index) = self.sessions.iter().position(|s| s.id() == id) {
            if self.sessions[index].status() == ConversionStatus::Converting {
                warn!(file_id = %id, "Status polling stopped unexpectedly");
                self.sessions[index] =
                    self.sessions[index].lost("status polling stopped unexpectedly");
                self.notifier.error(format!(
                    "Lost track of \"{}\": status polling stopped unexpectedly",
                    self.sessions[index].original_name()
                ));
            }
        }
    }

    fn index_of(&self, id: &str) -> Result<usize, ControllerError> {
        self.sessions
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| self.surface(ControllerError::UnknownSession(id.to_string())))
    }

    fn surface(&self, e: impl Into<ControllerError>) -> ControllerError {
        let e = e.into();
        self.notifier.error(e.to_string());
        e
    }
}
