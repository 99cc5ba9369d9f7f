pub mod account;
pub mod gateway;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::notice::Notice;
use crate::core::task::{Task, TaskId, decode_task_list};
use crate::{Error, Result};
use gateway::CareApi;
use store::{PreferenceStore, keys, save_json, session_token};

/// What a screen renders: one coherent list plus the offline banner flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskView {
    pub tasks: Vec<Task>,
    pub offline: bool,
}

/// Result of a refresh attempt.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// No session token; nothing was requested.
    NotAuthenticated,
    /// Fresh list from the server, now also the cache snapshot.
    Online { view: TaskView, quarantined: usize },
    /// The request failed; the view falls back to the cache snapshot.
    Offline {
        view: TaskView,
        notice: Option<Notice>,
        error: Error,
    },
    /// A refresh that started later has already been applied; this result
    /// was discarded.
    Superseded(TaskView),
}

impl RefreshOutcome {
    pub fn view(&self) -> Option<&TaskView> {
        match self {
            Self::NotAuthenticated => None,
            Self::Online { view, .. }
            | Self::Offline { view, .. }
            | Self::Superseded(view) => Some(view),
        }
    }

    pub fn notice(&self) -> Option<&Notice> {
        match self {
            Self::Offline { notice, .. } => notice.as_ref(),
            _ => None,
        }
    }
}

/// A remark the server accepted, kept until a refresh that started after it
/// has been applied.
#[derive(Debug, Clone)]
struct RemarkEdit {
    stamp: u64,
    task_id: TaskId,
    text: String,
}

#[derive(Debug, Default)]
struct SyncState {
    tasks: Vec<Task>,
    offline: bool,
    /// Stamp of the newest refresh whose result is on screen.
    applied_refresh: u64,
    /// Bumped on every change to `tasks`; orders snapshot writes.
    version: u64,
    /// Last stamp handed out, to refreshes and accepted remarks alike.
    clock: u64,
    /// Stamps of refreshes whose result has not landed yet.
    in_flight: Vec<u64>,
    pending_remarks: Vec<RemarkEdit>,
}

impl SyncState {
    fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// A remark only needs replaying over refreshes that started before it
    /// and are still running.
    fn prune_remarks(&mut self) {
        match self.in_flight.iter().min().copied() {
            Some(oldest) => self.pending_remarks.retain(|edit| edit.stamp > oldest),
            None => self.pending_remarks.clear(),
        }
    }

    fn view(&self) -> TaskView {
        TaskView {
            tasks: self.tasks.clone(),
            offline: self.offline,
        }
    }

    fn apply_remark(&mut self, task_id: &TaskId, text: &str) -> bool {
        match self.tasks.iter_mut().find(|t| &t.id == task_id) {
            Some(task) => {
                task.remarks = Some(text.to_string());
                true
            }
            None => false,
        }
    }

    /// Replace the list with the result of refresh `stamp`, unless a newer
    /// refresh already landed. Remarks accepted after `stamp` started are
    /// replayed on top.
    fn apply_refresh(&mut self, stamp: u64, tasks: Vec<Task>, offline: bool) -> bool {
        if stamp <= self.applied_refresh {
            return false;
        }
        self.tasks = tasks;
        self.offline = offline;
        self.applied_refresh = stamp;
        self.pending_remarks.retain(|edit| edit.stamp > stamp);
        let replay = self.pending_remarks.clone();
        for edit in &replay {
            self.apply_remark(&edit.task_id, &edit.text);
        }
        self.version += 1;
        true
    }
}

/// Keeps the task list in sync with the server, falling back to the local
/// snapshot when the network is unavailable.
///
/// Every refresh and every accepted remark takes a stamp from one counter.
/// Overlapping calls therefore resolve by start order, not by which
/// response arrives last.
pub struct TaskSynchronizer {
    api: Arc<dyn CareApi>,
    store: Arc<dyn PreferenceStore>,
    state: Mutex<SyncState>,
    // Version of the last snapshot written to the store.
    persisted: tokio::sync::Mutex<u64>,
}

impl TaskSynchronizer {
    pub fn new(api: Arc<dyn CareApi>, store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            api,
            store,
            state: Mutex::new(SyncState::default()),
            persisted: tokio::sync::Mutex::new(0),
        }
    }

    pub fn view(&self) -> TaskView {
        self.lock().view()
    }

    /// Screen mount: show the snapshot straight away, then try the network.
    /// The offline notice is only raised when there was nothing cached.
    pub async fn mount(&self) -> RefreshOutcome {
        let snapshot = self.load_snapshot().await;
        let had_snapshot = snapshot.is_some();
        if let Some(tasks) = snapshot {
            let mut state = self.lock();
            if state.applied_refresh == 0 && state.version == 0 {
                log::debug!("Showing {} cached tasks", tasks.len());
                state.tasks = tasks;
                state.version += 1;
            }
        }
        self.refresh(!had_snapshot).await
    }

    pub async fn refresh(&self, show_failure_notice: bool) -> RefreshOutcome {
        let token = match session_token(self.store.as_ref()).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                log::debug!("Refresh skipped: not signed in");
                return RefreshOutcome::NotAuthenticated;
            }
            Err(e) => {
                log::warn!("Failed to read session token: {}", e);
                return RefreshOutcome::NotAuthenticated;
            }
        };

        let in_flight = self.begin_refresh();
        let stamp = in_flight.stamp;

        match self.api.fetch_tasks(&token).await {
            Ok(decoded) => {
                let quarantined = decoded.quarantined.len();
                match self.apply(stamp, decoded.tasks, false) {
                    Some(view) => {
                        self.persist_snapshot().await;
                        RefreshOutcome::Online { view, quarantined }
                    }
                    None => {
                        log::info!("Discarding refresh #{}: a newer one was applied", stamp);
                        RefreshOutcome::Superseded(self.view())
                    }
                }
            }
            Err(error) => {
                log::warn!("Task refresh failed, using cached tasks: {}", error);
                let tasks = self.load_snapshot().await.unwrap_or_default();
                match self.apply(stamp, tasks, true) {
                    Some(view) => RefreshOutcome::Offline {
                        view,
                        notice: show_failure_notice.then(Notice::offline),
                        error,
                    },
                    None => RefreshOutcome::Superseded(self.view()),
                }
            }
        }
    }

    /// Save a remark on the server, then on the local list and snapshot.
    /// On failure nothing local changes.
    pub async fn update_remark(&self, task_id: &TaskId, text: &str) -> Result<()> {
        let token = session_token(self.store.as_ref())
            .await?
            .ok_or(Error::AuthMissing)?;

        self.api.update_remark(&token, task_id, text).await?;

        {
            let mut state = self.lock();
            let stamp = state.next_stamp();
            if !state.apply_remark(task_id, text) {
                log::warn!("Remark saved for task {} which is not in the local list", task_id);
            }
            state.pending_remarks.push(RemarkEdit {
                stamp,
                task_id: task_id.clone(),
                text: text.to_string(),
            });
            state.prune_remarks();
            state.version += 1;
        }
        log::info!("Remark updated for task {}", task_id);
        self.persist_snapshot().await;
        Ok(())
    }

    fn begin_refresh(&self) -> InFlightRefresh<'_> {
        let mut state = self.lock();
        let stamp = state.next_stamp();
        state.in_flight.push(stamp);
        InFlightRefresh { sync: self, stamp }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        // The state is plain data; a panic mid-update cannot leave it torn
        // in a way later readers care about.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply(&self, stamp: u64, tasks: Vec<Task>, offline: bool) -> Option<TaskView> {
        let mut state = self.lock();
        state
            .apply_refresh(stamp, tasks, offline)
            .then(|| state.view())
    }

    /// Last persisted list. Read failures count as "no snapshot".
    async fn load_snapshot(&self) -> Option<Vec<Task>> {
        let raw = match self.store.get(keys::TASKS).await {
            Ok(raw) => raw?,
            Err(e) => {
                log::warn!("Failed to read task cache: {}", e);
                return None;
            }
        };
        match decode_task_list(&raw) {
            Ok(decoded) => Some(decoded.tasks),
            Err(e) => {
                log::warn!("Ignoring unreadable task cache: {}", e);
                None
            }
        }
    }

    /// Best-effort write of the current list. Writes are serialized and a
    /// snapshot older than the last written one is never written.
    async fn persist_snapshot(&self) {
        let mut persisted = self.persisted.lock().await;
        let (version, tasks) = {
            let state = self.lock();
            (state.version, state.tasks.clone())
        };
        if version <= *persisted {
            return;
        }
        match save_json(self.store.as_ref(), keys::TASKS, &tasks).await {
            Ok(()) => *persisted = version,
            Err(e) => log::warn!("Failed to persist task cache: {}", e),
        }
    }
}

/// Registers a refresh as running until dropped, including when the caller
/// drops the refresh future mid-request.
struct InFlightRefresh<'a> {
    sync: &'a TaskSynchronizer,
    stamp: u64,
}

impl Drop for InFlightRefresh<'_> {
    fn drop(&mut self) {
        let mut state = self.sync.lock();
        state.in_flight.retain(|s| *s != self.stamp);
        state.prune_remarks();
    }
}
