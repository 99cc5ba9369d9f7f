use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::gateway::CareApi;
use super::store::{PreferenceStore, keys, load_json, save_json, session_token};
use crate::core::profile::{ProfileEdit, UserProfile};
use crate::{Error, Result};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// The sign-up form.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: String,
    pub forename: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
}

impl Registration {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            &self.name,
            &self.forename,
            &self.email,
            &self.phone,
            &self.password,
            &self.confirm_password,
        ];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(Error::Validation("Veuillez remplir tous les champs".into()));
        }
        if self.password != self.confirm_password {
            return Err(Error::Validation(
                "Les mots de passe ne correspondent pas".into(),
            ));
        }
        if !is_valid_email(&self.email) {
            return Err(Error::Validation("Adresse email invalide".into()));
        }
        Ok(())
    }
}

/// Sign-in, sign-out and profile management on top of the session store.
pub struct AccountService {
    api: Arc<dyn CareApi>,
    store: Arc<dyn PreferenceStore>,
}

impl AccountService {
    pub fn new(api: Arc<dyn CareApi>, store: Arc<dyn PreferenceStore>) -> Self {
        Self { api, store }
    }

    pub async fn is_signed_in(&self) -> Result<bool> {
        Ok(session_token(self.store.as_ref()).await?.is_some())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(Error::Validation(
                "Veuillez saisir votre email et votre mot de passe".into(),
            ));
        }
        let token = self.api.login(email.trim(), password).await?;
        // A different account may sign in; its profile must be fetched afresh.
        self.store.remove(keys::USER).await?;
        self.store.set(keys::TOKEN, &token).await?;
        log::info!("Signed in as {}", email.trim());
        Ok(())
    }

    pub async fn register(&self, form: &Registration) -> Result<Option<UserProfile>> {
        form.validate()?;
        let account = self.api.register(form).await?;
        self.store.set(keys::TOKEN, &account.token).await?;
        match &account.user {
            Some(user) => save_json(self.store.as_ref(), keys::USER, user).await?,
            None => self.store.remove(keys::USER).await?,
        }
        log::info!("Registered new account for {}", form.email.trim());
        Ok(account.user)
    }

    /// Drop the session and every cached value.
    pub async fn logout(&self) -> Result<()> {
        self.store.clear().await?;
        log::info!("Signed out");
        Ok(())
    }

    /// The cached profile if there is one, otherwise `/users/me`.
    pub async fn profile(&self) -> Result<UserProfile> {
        match load_json::<UserProfile>(self.store.as_ref(), keys::USER).await {
            Ok(Some(user)) => return Ok(user),
            Ok(None) => {}
            Err(e) => log::warn!("Failed to read cached profile: {}", e),
        }
        self.refresh_profile().await
    }

    pub async fn refresh_profile(&self) -> Result<UserProfile> {
        let token = self.token().await?;
        let user = self.api.fetch_profile(&token).await?;
        if let Err(e) = save_json(self.store.as_ref(), keys::USER, &user).await {
            log::warn!("Failed to cache profile: {}", e);
        }
        Ok(user)
    }

    /// Merge the edit form into the current profile and save it remotely.
    pub async fn save_profile(&self, edit: &ProfileEdit) -> Result<UserProfile> {
        if let Some(email) = &edit.email {
            if !is_valid_email(email) {
                return Err(Error::Validation("Adresse email invalide".into()));
            }
        }
        let current = self.profile().await?;
        let merged = current.merged_with(edit);
        let token = self.token().await?;
        let saved = self.api.save_profile(&token, &merged).await?;
        if let Err(e) = save_json(self.store.as_ref(), keys::USER, &saved).await {
            log::warn!("Failed to cache profile: {}", e);
        }
        Ok(saved)
    }

    async fn token(&self) -> Result<String> {
        session_token(self.store.as_ref())
            .await?
            .ok_or(Error::AuthMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::store::MemoryStore;
    use crate::sync::testing::FakeApi;

    fn form() -> Registration {
        Registration {
            name: "Martin".into(),
            forename: "Sophie".into(),
            email: "sophie@example.com".into(),
            phone: "0601020304".into(),
            password: "hunter22".into(),
            confirm_password: "hunter22".into(),
        }
    }

    fn service(api: &Arc<FakeApi>) -> (AccountService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (AccountService::new(api.clone(), store.clone()), store)
    }

    #[test]
    fn registration_validation() {
        assert!(form().validate().is_ok());

        let mut missing = form();
        missing.phone = "  ".into();
        assert!(matches!(missing.validate(), Err(Error::Validation(m)) if m.contains("remplir")));

        let mut mismatch = form();
        mismatch.confirm_password = "other".into();
        assert!(matches!(mismatch.validate(), Err(Error::Validation(m)) if m.contains("correspondent")));

        let mut bad_email = form();
        bad_email.email = "sophie.example.com".into();
        assert!(matches!(bad_email.validate(), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn login_stores_token_and_drops_cached_user() {
        let api = Arc::new(FakeApi::default());
        let (accounts, store) = service(&api);
        store.set(keys::USER, r#"{"id": "old"}"#).await.unwrap();

        accounts.login("sophie@example.com", "pw").await.unwrap();
        assert_eq!(store.get(keys::TOKEN).await.unwrap().as_deref(), Some("token-sophie@example.com"));
        assert_eq!(store.get(keys::USER).await.unwrap(), None);
        assert!(accounts.is_signed_in().await.unwrap());
    }

    #[tokio::test]
    async fn failed_login_keeps_previous_session() {
        let api = Arc::new(FakeApi::default());
        api.fail_with_server(401, "Email ou mot de passe incorrect");
        let (accounts, store) = service(&api);
        store.set(keys::TOKEN, "previous").await.unwrap();

        let err = accounts.login("x@y.fr", "bad").await.unwrap_err();
        assert!(matches!(err, Error::Server { status: 401, .. }));
        assert_eq!(store.get(keys::TOKEN).await.unwrap().as_deref(), Some("previous"));
    }

    #[tokio::test]
    async fn register_persists_token_and_user() {
        let api = Arc::new(FakeApi::default());
        let (accounts, store) = service(&api);

        let user = accounts.register(&form()).await.unwrap().unwrap();
        assert_eq!(user.email.as_deref(), Some("sophie@example.com"));
        assert!(accounts.is_signed_in().await.unwrap());
        let cached: UserProfile = load_json(store.as_ref(), keys::USER).await.unwrap().unwrap();
        assert_eq!(cached, user);
    }

    #[tokio::test]
    async fn profile_prefers_cache_then_network() {
        let api = Arc::new(FakeApi::default());
        let (accounts, store) = service(&api);

        assert!(matches!(accounts.profile().await.unwrap_err(), Error::AuthMissing));

        store.set(keys::TOKEN, "t").await.unwrap();
        let fetched = accounts.profile().await.unwrap();
        assert_eq!(api.profile_fetches(), 1);

        let again = accounts.profile().await.unwrap();
        assert_eq!(again, fetched);
        assert_eq!(api.profile_fetches(), 1);
    }

    #[tokio::test]
    async fn save_profile_merges_and_caches() {
        let api = Arc::new(FakeApi::default());
        let (accounts, store) = service(&api);
        store.set(keys::TOKEN, "t").await.unwrap();

        let mut edit = ProfileEdit::default();
        edit.set("tel", "0700000000");
        let saved = accounts.save_profile(&edit).await.unwrap();
        assert_eq!(saved.phone.as_deref(), Some("0700000000"));
        assert_eq!(saved.last_name.as_deref(), Some("Martin"));

        let cached: UserProfile = load_json(store.as_ref(), keys::USER).await.unwrap().unwrap();
        assert_eq!(cached, saved);
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let api = Arc::new(FakeApi::default());
        let (accounts, store) = service(&api);
        store.set(keys::TOKEN, "t").await.unwrap();
        store.set(keys::TASKS, "[]").await.unwrap();

        accounts.logout().await.unwrap();
        assert!(!accounts.is_signed_in().await.unwrap());
        assert_eq!(store.get(keys::TASKS).await.unwrap(), None);
    }
}
