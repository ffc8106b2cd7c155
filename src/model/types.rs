//! Vault record types as emitted by the vault CLI.
//!
//! Listing records yields only the overview; fetching a single record also
//! carries the [`Detail`] payload.

use serde::{Deserialize, Deserializer, Serialize};

/// A vault entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable unique identifier assigned by the vault.
    #[serde(rename = "uuid")]
    pub id: String,
    pub overview: Overview,
    /// Populated only when the record is fetched individually.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Detail>,
}

impl Record {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            overview: Overview {
                title: title.into(),
                ainfo: String::new(),
            },
            details: None,
        }
    }

    /// Attach auxiliary info shown under the title.
    pub fn with_ainfo(mut self, ainfo: impl Into<String>) -> Self {
        self.overview.ainfo = ainfo.into();
        self
    }

    pub fn with_details(mut self, details: Detail) -> Self {
        self.details = Some(details);
        self
    }

    pub fn title(&self) -> &str {
        &self.overview.title
    }

    pub fn has_details(&self) -> bool {
        self.details.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    #[serde(default)]
    pub title: String,
    /// Short auxiliary info (usually the account name).
    #[serde(default)]
    pub ainfo: String,
}

/// Sensitive payload of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detail {
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<DetailField>,
    #[serde(rename = "notesPlain", default, deserialize_with = "null_as_default")]
    pub notes: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sections: Vec<Section>,
}

impl Detail {
    /// First field carrying the given designation tag.
    pub fn designated(&self, designation: &str) -> Option<&DetailField> {
        self.fields.iter().find(|f| f.designation == designation)
    }

    pub fn username(&self) -> Option<&str> {
        self.designated("username").map(|f| f.value.as_str())
    }

    pub fn password(&self) -> Option<&str> {
        self.designated("password").map(|f| f.value.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailField {
    #[serde(default)]
    pub designation: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<SectionField>,
}

/// Typed sub-field of a section (`k` is the kind, e.g. `string` or `concealed`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionField {
    #[serde(rename = "k", default)]
    pub kind: String,
    #[serde(rename = "t", default)]
    pub title: String,
    #[serde(rename = "v", default, deserialize_with = "null_as_default")]
    pub value: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
