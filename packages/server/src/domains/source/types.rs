//! Typed views over the upstream payloads.
//!
//! Every field is optional with a defined fallback so a malformed item
//! degrades to empty values instead of failing the whole page.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `GET /me`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Me {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub is_employer: bool,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub employer: Option<EmployerRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmployerRef {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// The verified upstream account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Employer identifier used to list postings
    pub id: String,
    pub email: String,
    pub is_employer: bool,
}

impl Me {
    /// Employer id, falling back to the account id.
    pub fn account_id(&self) -> Option<String> {
        self.employer
            .as_ref()
            .and_then(|e| e.id.clone())
            .or_else(|| self.id.clone())
    }
}

/// One page of any paginated listing. Items are kept raw and decoded one by one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageEnvelope {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub found: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Posting {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Posting {
    pub fn title(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Unknown position")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Negotiation {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub resume: Option<Resume>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resume {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub alternate_url: Option<String>,
    #[serde(default)]
    pub area: Option<Area>,
    #[serde(default)]
    pub salary: Option<Salary>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub contact: Vec<Contact>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Area {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Salary {
    #[serde(default)]
    pub from: Option<u64>,
    #[serde(default)]
    pub to: Option<u64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Contact {
    #[serde(rename = "type", default)]
    pub kind: Option<ContactType>,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactType {
    #[serde(default)]
    pub id: Option<String>,
}

impl Contact {
    pub fn kind_id(&self) -> Option<&str> {
        self.kind.as_ref().and_then(|k| k.id.as_deref())
    }

    /// Plain-text value. Phones may arrive as an object with a
    /// `formatted` field.
    pub fn text(&self) -> Option<String> {
        match &self.value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Object(map) => map
                .get("formatted")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().to_string()),
            _ => None,
        }
    }
}

/// A negotiation not yet in the ledger, with the title of its posting.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationEvent {
    pub id: String,
    pub vacancy_title: String,
    pub raw: Value,
}

impl ApplicationEvent {
    /// Decoded view of the raw payload; malformed payloads decode to defaults.
    pub fn negotiation(&self) -> Negotiation {
        Negotiation::deserialize(&self.raw).unwrap_or_default()
    }
}

/// Ids arrive as strings or numbers depending on the endpoint.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts a list, ignoring entries that do not decode; anything else is empty.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}
