pub mod flow;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::core::task::TaskId;
use crate::error::NfcError;

/// Tag technologies a reader session can be requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NfcTech {
    Ndef,
}

/// A tag as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfcTag {
    /// Hardware identifier, hex encoded.
    pub id: String,
    /// Decoded NDEF text records, in order.
    pub text_records: Vec<String>,
}

/// NFC capability exposed by the host platform.
///
/// Only one technology request may be outstanding at a time; the platform
/// rejects a second one until `cancel_technology_request` runs.
#[async_trait]
pub trait NfcReader: Send + Sync {
    async fn is_supported(&self) -> Result<bool, NfcError>;
    async fn is_enabled(&self) -> Result<bool, NfcError>;
    async fn request_technology(&self, tech: NfcTech) -> Result<(), NfcError>;
    async fn read_tag(&self) -> Result<NfcTag, NfcError>;
    async fn cancel_technology_request(&self) -> Result<(), NfcError>;
}

/// Whether a detected tag must name the task being checked in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagPolicy {
    /// Any tag confirms the check-in.
    #[default]
    AnyTag,
    /// One of the tag's text records must equal the task id.
    MatchTaskId,
}

impl TagPolicy {
    pub fn check(&self, tag: &NfcTag, task_id: &TaskId) -> Result<(), NfcError> {
        match self {
            Self::AnyTag => Ok(()),
            Self::MatchTaskId => {
                if tag
                    .text_records
                    .iter()
                    .any(|r| r.trim() == task_id.as_str())
                {
                    Ok(())
                } else {
                    Err(NfcError::WrongTag(tag.id.clone()))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfcState {
    Idle,
    Requesting { task_id: TaskId },
    Waiting { task_id: TaskId, deadline: Instant },
    Success { task_id: TaskId, tag: NfcTag },
    TimedOut { task_id: TaskId },
    Failed { task_id: TaskId, reason: NfcError },
    Cancelled { task_id: TaskId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfcEvent {
    Start(TaskId),
    Acquired { deadline: Instant },
    Unsupported,
    Disabled(String),
    TagRead(NfcTag),
    TagRejected(NfcError),
    TimerFired,
    Cancel,
    ReaderFailed(String),
    Reset,
}

impl NfcState {
    /// Transition function of the check-in flow. Events that make no sense
    /// in the current state leave it unchanged.
    pub fn apply(self, event: NfcEvent) -> NfcState {
        use NfcEvent as E;
        use NfcState as S;

        match (self, event) {
            (S::Idle, E::Start(task_id)) => S::Requesting { task_id },

            (S::Requesting { task_id }, E::Acquired { deadline }) => {
                S::Waiting { task_id, deadline }
            }
            (S::Requesting { task_id }, E::Unsupported) => S::Failed {
                task_id,
                reason: NfcError::Unsupported,
            },
            (S::Requesting { task_id }, E::Disabled(why)) => S::Failed {
                task_id,
                reason: NfcError::Disabled(why),
            },

            (S::Waiting { task_id, .. }, E::TagRead(tag)) => S::Success { task_id, tag },
            (S::Waiting { task_id, .. }, E::TagRejected(reason)) => {
                S::Failed { task_id, reason }
            }
            (S::Waiting { task_id, .. }, E::TimerFired) => S::TimedOut { task_id },

            (S::Requesting { task_id } | S::Waiting { task_id, .. }, E::Cancel) => {
                S::Cancelled { task_id }
            }
            (S::Requesting { task_id } | S::Waiting { task_id, .. }, E::ReaderFailed(msg)) => {
                S::Failed {
                    task_id,
                    reason: NfcError::Reader(msg),
                }
            }

            (state, E::Reset) if state.is_terminal() => S::Idle,

            (state, _) => state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success { .. } | Self::TimedOut { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    /// True while a reader session may be held.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Requesting { .. } | Self::Waiting { .. })
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::Idle => None,
            Self::Requesting { task_id }
            | Self::Waiting { task_id, .. }
            | Self::Success { task_id, .. }
            | Self::TimedOut { task_id }
            | Self::Failed { task_id, .. }
            | Self::Cancelled { task_id } => Some(task_id),
        }
    }
}
