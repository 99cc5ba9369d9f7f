//! In-memory fake of the remote API for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use tokio::sync::oneshot;

use super::account::Registration;
use super::gateway::{CareApi, RegisteredAccount};
use crate::core::profile::UserProfile;
use crate::core::task::{DecodedTasks, Task, TaskId};
use crate::{Error, Result};

/// A task on day `day` of March 2024.
pub fn sample_task(id: &str, day: u32) -> Task {
    Task::new(
        id,
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        "Aide au repas",
    )
}

fn sample_profile() -> UserProfile {
    UserProfile {
        id: "8".into(),
        last_name: Some("Martin".into()),
        first_name: Some("Sophie".into()),
        email: Some("sophie@example.com".into()),
        phone: Some("0601020304".into()),
        address: None,
        role: Some("Auxiliaire de vie".into()),
        profile_picture: None,
    }
}

#[derive(Default)]
struct FakeState {
    tasks: Vec<Task>,
    failure: Option<Error>,
    gates: VecDeque<oneshot::Receiver<Result<Vec<Task>>>>,
    fetches_started: usize,
    last_token: Option<String>,
    remarks: Vec<(TaskId, String)>,
    profile: Option<UserProfile>,
    profile_fetches: usize,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_tasks(&self, tasks: Vec<Task>) {
        self.with(|s| s.tasks = tasks);
    }

    /// Make every call fail with `error` until cleared.
    pub fn fail_with(&self, error: Error) {
        self.with(|s| s.failure = Some(error));
    }

    pub fn fail_with_server(&self, status: u16, message: &str) {
        self.fail_with(Error::Server {
            status,
            message: message.to_string(),
        });
    }

    pub fn clear_failure(&self) {
        self.with(|s| s.failure = None);
    }

    /// The next unanswered `fetch_tasks` call blocks until the returned
    /// sender delivers its result.
    pub fn hold_next_fetch(&self) -> oneshot::Sender<Result<Vec<Task>>> {
        let (tx, rx) = oneshot::channel();
        self.with(|s| s.gates.push_back(rx));
        tx
    }

    pub fn fetches_started(&self) -> usize {
        self.with(|s| s.fetches_started)
    }

    pub fn last_token(&self) -> Option<String> {
        self.with(|s| s.last_token.clone())
    }

    pub fn remarks(&self) -> Vec<(TaskId, String)> {
        self.with(|s| s.remarks.clone())
    }

    pub fn profile_fetches(&self) -> usize {
        self.with(|s| s.profile_fetches)
    }

    fn check(&self) -> Result<()> {
        match self.with(|s| s.failure.clone()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CareApi for FakeApi {
    async fn fetch_tasks(&self, token: &str) -> Result<DecodedTasks> {
        let gate = self.with(|s| {
            s.fetches_started += 1;
            s.last_token = Some(token.to_string());
            s.gates.pop_front()
        });
        let tasks = match gate {
            Some(rx) => rx
                .await
                .map_err(|_| Error::NetworkUnavailable("gate dropped".into()))??,
            None => {
                self.check()?;
                self.with(|s| s.tasks.clone())
            }
        };
        Ok(DecodedTasks {
            tasks,
            quarantined: Vec::new(),
        })
    }

    async fn update_remark(&self, _token: &str, task_id: &TaskId, remark: &str) -> Result<()> {
        self.check()?;
        self.with(|s| s.remarks.push((task_id.clone(), remark.to_string())));
        Ok(())
    }

    async fn login(&self, email: &str, _password: &str) -> Result<String> {
        self.check()?;
        Ok(format!("token-{}", email))
    }

    async fn register(&self, form: &Registration) -> Result<RegisteredAccount> {
        self.check()?;
        let mut user = sample_profile();
        user.last_name = Some(form.name.clone());
        user.first_name = Some(form.forename.clone());
        user.email = Some(form.email.clone());
        Ok(RegisteredAccount {
            token: format!("token-{}", form.email),
            user: Some(user),
        })
    }

    async fn fetch_profile(&self, _token: &str) -> Result<UserProfile> {
        self.check()?;
        Ok(self.with(|s| {
            s.profile_fetches += 1;
            s.profile.clone().unwrap_or_else(sample_profile)
        }))
    }

    async fn save_profile(&self, _token: &str, profile: &UserProfile) -> Result<UserProfile> {
        self.check()?;
        self.with(|s| s.profile = Some(profile.clone()));
        Ok(profile.clone())
    }
}
