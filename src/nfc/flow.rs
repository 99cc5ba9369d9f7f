use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{NfcEvent, NfcReader, NfcState, NfcTag, NfcTech, TagPolicy};
use crate::core::notice::Notice;
use crate::core::task::TaskId;
use crate::error::NfcError;

type PendingRelease = Arc<Mutex<Option<JoinHandle<()>>>>;

pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CheckInOptions {
    pub timeout: Duration,
    pub policy: TagPolicy,
    /// The app-level NFC toggle from the settings screen.
    pub enabled: bool,
}

impl Default for CheckInOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SCAN_TIMEOUT,
            policy: TagPolicy::AnyTag,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInOutcome {
    CheckedIn { task_id: TaskId, tag: NfcTag },
    Cancelled { task_id: TaskId },
    Failed { task_id: TaskId, error: NfcError },
}

impl CheckInOutcome {
    /// Alert to show; a user cancellation shows nothing.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::CheckedIn { .. } => Some(Notice::check_in_succeeded()),
            Self::Cancelled { .. } => None,
            Self::Failed { error, .. } => Some(Notice::from_nfc_error(error)),
        }
    }
}

/// Drives one NFC check-in at a time against the platform reader.
pub struct CheckInFlow {
    reader: Arc<dyn NfcReader>,
    options: CheckInOptions,
    state: NfcState,
    // Release spawned by a scan that was dropped before it finished.
    orphaned_release: PendingRelease,
}

impl CheckInFlow {
    pub fn new(reader: Arc<dyn NfcReader>, options: CheckInOptions) -> Self {
        Self {
            reader,
            options,
            state: NfcState::Idle,
            orphaned_release: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> &NfcState {
        &self.state
    }

    /// Scan for a tag confirming `task_id`.
    ///
    /// Resolves on the first of: tag read, deadline, `cancel`, reader error.
    /// Once a technology request has been issued the reader session is
    /// released exactly once, whatever the outcome, including when this
    /// future is dropped before it resolves. No retry is attempted.
    pub async fn scan(&mut self, task_id: TaskId, cancel: &CancellationToken) -> CheckInOutcome {
        if self.state.is_active() {
            log::debug!("Abandoning unfinished NFC scan: {:?}", self.state);
            self.step(NfcEvent::Cancel);
        }
        let pending = self
            .orphaned_release
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(release) = pending {
            // The platform allows one session; the old one must be gone first.
            if let Err(e) = release.await {
                log::warn!("Release of abandoned NFC session failed: {}", e);
            }
        }
        if self.state.is_terminal() {
            self.step(NfcEvent::Reset);
        }
        self.step(NfcEvent::Start(task_id.clone()));
        log::info!("NFC check-in started for task {}", task_id);

        if let Some(event) = self.preflight().await {
            self.step(event);
            return self.finish();
        }
        if cancel.is_cancelled() {
            self.step(NfcEvent::Cancel);
            return self.finish();
        }

        let session = ReaderSession::open(&self.reader, &self.orphaned_release);
        let event = self.acquire_and_wait(&task_id, cancel).await;
        session.release().await;
        self.step(event);
        self.finish()
    }

    /// Checks that need no reader session.
    async fn preflight(&self) -> Option<NfcEvent> {
        if !self.options.enabled {
            return Some(NfcEvent::Disabled("désactivé dans les réglages".into()));
        }
        match self.reader.is_supported().await {
            Ok(true) => {}
            Ok(false) => return Some(NfcEvent::Unsupported),
            Err(e) => return Some(event_for_error(e)),
        }
        match self.reader.is_enabled().await {
            Ok(true) => None,
            Ok(false) => Some(NfcEvent::Disabled("désactivé sur l'appareil".into())),
            Err(e) => Some(event_for_error(e)),
        }
    }

    async fn acquire_and_wait(&mut self, task_id: &TaskId, cancel: &CancellationToken) -> NfcEvent {
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => return NfcEvent::Cancel,
            r = self.reader.request_technology(NfcTech::Ndef) => r,
        };
        if let Err(e) = acquired {
            return event_for_error(e);
        }

        let deadline = Instant::now() + self.options.timeout;
        self.step(NfcEvent::Acquired { deadline });
        log::debug!("NFC session acquired, waiting up to {:?}", self.options.timeout);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => NfcEvent::Cancel,
            r = self.reader.read_tag() => match r {
                Ok(tag) => match self.options.policy.check(&tag, task_id) {
                    Ok(()) => NfcEvent::TagRead(tag),
                    Err(e) => NfcEvent::TagRejected(e),
                },
                Err(e) => event_for_error(e),
            },
            _ = tokio::time::sleep_until(deadline) => NfcEvent::TimerFired,
        }
    }

    fn step(&mut self, event: NfcEvent) {
        let state = std::mem::replace(&mut self.state, NfcState::Idle);
        self.state = state.apply(event);
    }

    fn finish(&self) -> CheckInOutcome {
        let outcome = match &self.state {
            NfcState::Success { task_id, tag } => CheckInOutcome::CheckedIn {
                task_id: task_id.clone(),
                tag: tag.clone(),
            },
            NfcState::Cancelled { task_id } => CheckInOutcome::Cancelled {
                task_id: task_id.clone(),
            },
            NfcState::TimedOut { task_id } => CheckInOutcome::Failed {
                task_id: task_id.clone(),
                error: NfcError::Timeout,
            },
            NfcState::Failed { task_id, reason } => CheckInOutcome::Failed {
                task_id: task_id.clone(),
                error: reason.clone(),
            },
            other => CheckInOutcome::Failed {
                task_id: other.task_id().cloned().unwrap_or_else(|| TaskId::new("")),
                error: NfcError::Reader(format!("check-in stopped in state {:?}", other)),
            },
        };
        match &outcome {
            CheckInOutcome::CheckedIn { task_id, tag } => {
                log::info!("NFC check-in confirmed for task {} (tag {})", task_id, tag.id)
            }
            CheckInOutcome::Cancelled { task_id } => {
                log::info!("NFC check-in cancelled for task {}", task_id)
            }
            CheckInOutcome::Failed { task_id, error } => {
                log::warn!("NFC check-in failed for task {}: {}", task_id, error)
            }
        }
        outcome
    }
}

/// An outstanding technology request. Released by `release`, or from `Drop`
/// on the current runtime when the scan future is dropped first.
struct ReaderSession {
    reader: Option<Arc<dyn NfcReader>>,
    orphaned_release: PendingRelease,
}

impl ReaderSession {
    fn open(reader: &Arc<dyn NfcReader>, orphaned_release: &PendingRelease) -> Self {
        Self {
            reader: Some(reader.clone()),
            orphaned_release: orphaned_release.clone(),
        }
    }

    async fn release(mut self) {
        if let Some(reader) = self.reader.take() {
            release_reader(reader.as_ref()).await;
        }
    }
}

impl Drop for ReaderSession {
    fn drop(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let release = handle.spawn(async move { release_reader(reader.as_ref()).await });
                *self
                    .orphaned_release
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(release);
            }
            Err(_) => log::warn!("NFC session dropped outside a runtime, not released"),
        }
    }
}

async fn release_reader(reader: &dyn NfcReader) {
    if let Err(e) = reader.cancel_technology_request().await {
        log::warn!("Failed to release NFC session: {}", e);
    }
}

fn event_for_error(error: NfcError) -> NfcEvent {
    match error {
        NfcError::Unsupported => NfcEvent::Unsupported,
        NfcError::Disabled(why) => NfcEvent::Disabled(why),
        other => NfcEvent::ReaderFailed(other.to_string()),
    }
}
