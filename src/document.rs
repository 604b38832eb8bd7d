//! Schedules and themes as stored in the blob store.
//!
//! Both are read-only value objects. Their `id` always comes from the
//! storage key: whatever the stored content says is overwritten by
//! [`Document::assign_id`] before anything reaches a client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SchemaError;
use crate::item::Item;

pub const SCHEDULE_PREFIX: &str = "schedule/";
pub const THEME_PREFIX: &str = "theme/";

const DOCUMENT_SUFFIX: &str = ".json";

/// Behaviour shared by everything the API serves out of the store.
pub trait Document: Serialize + Sized {
    /// Key prefix under which documents of this type live.
    const PREFIX: &'static str;

    fn parse(raw: &[u8]) -> Result<Self, SchemaError>;

    fn id(&self) -> Option<&str>;

    /// Returns the document with its `id` replaced.
    fn assign_id(self, id: impl Into<String>) -> Self;

    fn key_for(id: &str) -> String {
        format!("{}{}{}", Self::PREFIX, id, DOCUMENT_SUFFIX)
    }
}

/// An ordered list of items presented in one session.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
    pub description: String,
    pub items: Vec<Item>,
}

/// A named group of schedules.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    #[serde(default)]
    pub id: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub schedule_ids: Vec<String>,
}

/// One entry of a list response.
#[derive(Clone, Debug, Serialize)]
pub struct Listed<D> {
    pub id: String,
    pub content: D,
}

impl<D: Document> Listed<D> {
    /// Wraps a document whose ID has already been assigned.
    pub fn new(id: String, content: D) -> Self {
        Listed {
            content: content.assign_id(id.clone()),
            id,
        }
    }
}

/// The raw shape of a stored schedule. Items stay untyped until each one
/// is validated on its own, so errors can name the offending index.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchedule {
    #[serde(default)]
    schedule_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    items: Option<Vec<Value>>,
}

impl Document for Schedule {
    const PREFIX: &'static str = SCHEDULE_PREFIX;

    fn parse(raw: &[u8]) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_slice(raw).map_err(SchemaError::MalformedJson)?;

        if !value.is_object() {
            return Err(SchemaError::NotAnObject);
        }

        let raw: RawSchedule = serde_json::from_value(value).map_err(SchemaError::MalformedJson)?;

        let description = raw
            .description
            .ok_or(SchemaError::MissingField("description"))?;
        let raw_items = raw.items.ok_or(SchemaError::MissingField("items"))?;

        let items = raw_items
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                Item::from_value(value).map_err(|e| SchemaError::Item {
                    index,
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Schedule {
            id: None,
            schedule_id: raw.schedule_id,
            description,
            items,
        })
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn assign_id(self, id: impl Into<String>) -> Self {
        Schedule {
            id: Some(id.into()),
            ..self
        }
    }
}

impl Document for Theme {
    const PREFIX: &'static str = THEME_PREFIX;

    fn parse(raw: &[u8]) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_slice(raw).map_err(SchemaError::MalformedJson)?;

        match value.as_object() {
            None => return Err(SchemaError::NotAnObject),
            Some(object) if !object.contains_key("description") => {
                return Err(SchemaError::MissingField("description"))
            }
            Some(_) => {}
        }

        serde_json::from_value(value).map_err(SchemaError::MalformedJson)
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn assign_id(self, id: impl Into<String>) -> Self {
        Theme {
            id: Some(id.into()),
            ..self
        }
    }
}

/// Derives a document ID from its storage key, or `None` for the
/// directory marker and anything outside `prefix`.
pub fn id_from_key(prefix: &str, key: &str) -> Option<String> {
    let filename = key.strip_prefix(prefix)?;

    if filename.is_empty() {
        return None;
    }

    let id = filename.replace(DOCUMENT_SUFFIX, "");
    let id = id.trim();

    if id.is_empty() {
        None
    } else {
        Some(id.to_owned())
    }
}

/// Orders a list response by ID, ascending.
pub fn sort_by_id<D>(entries: &mut [Listed<D>]) {
    entries.sort_by(|a, b| a.id.cmp(&b.id));
}
