use crate::error::{Error, NfcError};

/// A user-facing alert or banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    /// Shown when a refresh fails and the cached list is used instead.
    pub fn offline() -> Self {
        Self::new(
            "Mode hors-ligne",
            "Impossible de récupérer les dernières tâches. Utilisation des données stockées.",
        )
    }

    pub fn remark_saved() -> Self {
        Self::new("Succès", "Le commentaire a été mis à jour.")
    }

    pub fn check_in_succeeded() -> Self {
        Self::new(
            "Pointage NFC réussi",
            "La tâche a été marquée comme complétée.",
        )
    }

    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::NetworkUnavailable(_) => {
                Self::new("Erreur", "Erreur de connexion, vérifiez votre réseau.")
            }
            Error::AuthMissing => Self::new("Session expirée", "Veuillez vous reconnecter."),
            Error::Server { message, .. } => Self::new("Erreur", message.clone()),
            Error::Decode(_) => Self::new("Erreur", "Réponse du serveur illisible."),
            Error::Storage(_) => Self::new("Erreur", "Impossible d'accéder aux données locales."),
            Error::Validation(message) => Self::new("Formulaire incomplet", message.clone()),
            Error::Nfc(nfc) => Self::from_nfc_error(nfc),
        }
    }

    pub fn from_nfc_error(error: &NfcError) -> Self {
        let message = match error {
            NfcError::Unsupported => "Cet appareil ne prend pas en charge le NFC.".to_string(),
            NfcError::Disabled(reason) => format!("Le NFC est désactivé ({reason})."),
            NfcError::Timeout => "Aucun badge détecté. Réessayez.".to_string(),
            NfcError::WrongTag(_) => "Ce badge ne correspond pas à cette intervention.".to_string(),
            NfcError::Reader(_) => "Impossible de valider la tâche via NFC.".to_string(),
        };
        Self::new("Échec du scan NFC", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_is_shown_verbatim() {
        let notice = Notice::from_error(&Error::Server {
            status: 401,
            message: "Email ou mot de passe incorrect".into(),
        });
        assert_eq!(notice.message, "Email ou mot de passe incorrect");
    }

    #[test]
    fn nfc_errors_share_a_title() {
        for e in [NfcError::Unsupported, NfcError::Timeout, NfcError::Reader("io".into())] {
            assert_eq!(Notice::from_error(&Error::Nfc(e)).title, "Échec du scan NFC");
        }
    }
}
