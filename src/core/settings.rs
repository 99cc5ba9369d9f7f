use crate::Result;
use crate::sync::store::{PreferenceStore, keys};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

/// App-level toggles from the settings screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `None` until the user picks one; the host then follows the system theme.
    pub theme: Option<Theme>,
    pub offline_mode: bool,
    pub nfc_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: None,
            offline_mode: false,
            nfc_enabled: true,
        }
    }
}

impl Settings {
    /// Load stored toggles; missing keys keep their defaults.
    pub async fn load(store: &dyn PreferenceStore) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(theme) = store.get(keys::THEME).await? {
            settings.theme = Some(if theme == "dark" { Theme::Dark } else { Theme::Light });
        }
        if let Some(offline) = store.get(keys::OFFLINE_MODE).await? {
            settings.offline_mode = offline == "true";
        }
        if let Some(nfc) = store.get(keys::NFC_ENABLED).await? {
            settings.nfc_enabled = nfc == "true";
        }
        Ok(settings)
    }

    /// Flip the theme. `system_dark` is what the host currently shows when no
    /// theme was stored yet.
    pub async fn toggle_theme(
        &mut self,
        store: &dyn PreferenceStore,
        system_dark: bool,
    ) -> Result<Theme> {
        let current = self
            .theme
            .unwrap_or(if system_dark { Theme::Dark } else { Theme::Light });
        let next = current.toggled();
        store.set(keys::THEME, next.as_str()).await?;
        self.theme = Some(next);
        Ok(next)
    }

    pub async fn toggle_offline_mode(&mut self, store: &dyn PreferenceStore) -> Result<bool> {
        let next = !self.offline_mode;
        store.set(keys::OFFLINE_MODE, &next.to_string()).await?;
        self.offline_mode = next;
        Ok(next)
    }

    pub async fn toggle_nfc(&mut self, store: &dyn PreferenceStore) -> Result<bool> {
        let next = !self.nfc_enabled;
        store.set(keys::NFC_ENABLED, &next.to_string()).await?;
        self.nfc_enabled = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::store::MemoryStore;

    #[tokio::test]
    async fn defaults_when_nothing_stored() {
        let store = MemoryStore::new();
        let settings = Settings::load(&store).await.unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.nfc_enabled);
    }

    #[tokio::test]
    async fn toggles_persist_as_strings() {
        let store = MemoryStore::new();
        let mut settings = Settings::load(&store).await.unwrap();

        assert_eq!(settings.toggle_theme(&store, false).await.unwrap(), Theme::Dark);
        assert!(settings.toggle_offline_mode(&store).await.unwrap());
        assert!(!settings.toggle_nfc(&store).await.unwrap());

        assert_eq!(store.get(keys::THEME).await.unwrap().as_deref(), Some("dark"));
        assert_eq!(store.get(keys::OFFLINE_MODE).await.unwrap().as_deref(), Some("true"));
        assert_eq!(store.get(keys::NFC_ENABLED).await.unwrap().as_deref(), Some("false"));

        let reloaded = Settings::load(&store).await.unwrap();
        assert_eq!(reloaded, settings);
    }

    #[tokio::test]
    async fn first_theme_toggle_starts_from_system() {
        let store = MemoryStore::new();
        let mut settings = Settings::default();
        assert_eq!(settings.toggle_theme(&store, true).await.unwrap(), Theme::Light);
    }
}
