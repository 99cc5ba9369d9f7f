use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;

use super::account::Registration;
use crate::core::profile::UserProfile;
use crate::core::task::{DecodedTasks, TaskId, decode_task_list};
use crate::{Error, Result};

/// Account returned by a successful registration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredAccount {
    pub token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// The remote Care Tracker API.
#[async_trait]
pub trait CareApi: Send + Sync {
    async fn fetch_tasks(&self, token: &str) -> Result<DecodedTasks>;
    async fn update_remark(&self, token: &str, task_id: &TaskId, remark: &str) -> Result<()>;
    async fn login(&self, email: &str, password: &str) -> Result<String>;
    async fn register(&self, form: &Registration) -> Result<RegisteredAccount>;
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile>;
    async fn save_profile(&self, token: &str, profile: &UserProfile) -> Result<UserProfile>;
}

/// REST client for the Care Tracker backend.
#[derive(Clone)]
pub struct HttpGateway {
    base_url: String,
    http: Client,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::NetworkUnavailable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: &str, http: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/tasks/{id}` with the id escaped as a single path segment.
    fn task_url(&self, task_id: &TaskId) -> Result<Url> {
        let invalid = || Error::NetworkUnavailable(format!("Invalid API URL: {}", self.base_url));
        let mut url = Url::parse(&self.url("/tasks")).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .push(task_id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl CareApi for HttpGateway {
    async fn fetch_tasks(&self, token: &str) -> Result<DecodedTasks> {
        let resp = self
            .http
            .get(self.url("/tasks"))
            .header(AUTHORIZATION, bearer(token))
            .send()
            .await?;
        let body = success_body(resp).await?;
        let decoded = decode_task_list(&body)?;
        log::info!(
            "Fetched {} tasks ({} quarantined)",
            decoded.tasks.len(),
            decoded.quarantined.len()
        );
        Ok(decoded)
    }

    async fn update_remark(&self, token: &str, task_id: &TaskId, remark: &str) -> Result<()> {
        let resp = self
            .http
            .put(self.task_url(task_id)?)
            .header(AUTHORIZATION, bearer(token))
            .json(&serde_json::json!({ "remarques": remark }))
            .send()
            .await?;
        success_body(resp).await?;
        Ok(())
    }

    async fn login(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct LoginResponse {
            token: String,
        }

        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body = success_body(resp).await?;
        let parsed: LoginResponse = serde_json::from_str(&body)?;
        Ok(parsed.token)
    }

    async fn register(&self, form: &Registration) -> Result<RegisteredAccount> {
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(&serde_json::json!({
                "name": form.name,
                "forename": form.forename,
                "email": form.email,
                "phone": form.phone,
                "password": form.password,
            }))
            .send()
            .await?;
        let body = success_body(resp).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_profile(&self, token: &str) -> Result<UserProfile> {
        let resp = self
            .http
            .get(self.url("/users/me"))
            .header(AUTHORIZATION, bearer(token))
            .send()
            .await?;
        let body = success_body(resp).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn save_profile(&self, token: &str, profile: &UserProfile) -> Result<UserProfile> {
        let resp = self
            .http
            .put(self.url("/users/me"))
            .header(AUTHORIZATION, bearer(token))
            .json(profile)
            .send()
            .await?;
        let body = success_body(resp).await?;
        // Some deployments answer 204 with no body.
        if body.trim().is_empty() {
            return Ok(profile.clone());
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Body of a 2xx response, or a `Server` error carrying the API's `message`.
async fn success_body(resp: Response) -> Result<String> {
    let status = resp.status();
    let text = resp.text().await?;
    if status.is_success() {
        return Ok(text);
    }
    Err(Error::Server {
        status: status.as_u16(),
        message: server_message(status, &text),
    })
}

fn server_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            format!(
                "Erreur serveur ({})",
                status.canonical_reason().unwrap_or(status.as_str())
            )
        })
}
