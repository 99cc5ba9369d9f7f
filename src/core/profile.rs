use serde::{Deserialize, Serialize};

/// The signed-in care worker, as returned by `/users/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    #[serde(rename = "nom", default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(rename = "prenom", default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "tel", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "adresse", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(rename = "profilePicture", default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        [self.last_name.as_deref(), self.first_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Apply an edit form: fields present in the form win, the rest keep
    /// their previous value.
    pub fn merged_with(&self, edit: &ProfileEdit) -> Self {
        fn pick(new: &Option<String>, old: &Option<String>) -> Option<String> {
            new.clone().or_else(|| old.clone())
        }

        Self {
            id: self.id.clone(),
            last_name: pick(&edit.last_name, &self.last_name),
            first_name: pick(&edit.first_name, &self.first_name),
            email: pick(&edit.email, &self.email),
            phone: pick(&edit.phone, &self.phone),
            address: pick(&edit.address, &self.address),
            role: self.role.clone(),
            profile_picture: pick(&edit.profile_picture, &self.profile_picture),
        }
    }
}

/// Values typed into the profile edit form. `None` means "left untouched".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileEdit {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub profile_picture: Option<String>,
}

impl ProfileEdit {
    /// Set a field by its wire name. Returns false for unknown or read-only fields.
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> bool {
        let slot = match field {
            "nom" => &mut self.last_name,
            "prenom" => &mut self.first_name,
            "email" => &mut self.email,
            "tel" => &mut self.phone,
            "adresse" => &mut self.address,
            "profilePicture" => &mut self.profile_picture,
            _ => return false,
        };
        *slot = Some(value.into());
        true
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}
