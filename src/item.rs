//! The steps of a recording session.
//!
//! Items are discriminated by a single flattened `itemType` tag. Older
//! schedules used a `{kind, itemType}` pair instead; those are only read
//! by [`crate::legacy`], never by this module.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SchemaError;

/// Every `itemType` this model understands.
pub const ITEM_TYPES: [&str; 10] = [
    "audio",
    "video",
    "yle-audio",
    "yle-video",
    "text-content",
    "image",
    "choice",
    "multi-choice",
    "super-choice",
    "text-input",
];

/// One step of a schedule: either media to present or a prompt to answer.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "itemType", rename_all = "kebab-case")]
pub enum Item {
    Audio(Media),
    Video(Media),
    YleAudio(YleMedia),
    YleVideo(YleMedia),
    TextContent(TextContent),
    Image(Media),
    Choice(Choice),
    MultiChoice(OpenChoice),
    SuperChoice(OpenChoice),
    TextInput(TextInput),
}

/// Directly addressable media with a known MIME type.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub item_id: String,
    pub url: String,
    pub type_id: String,
    pub description: String,
    pub is_recording: bool,
}

/// Media hosted by YLE. `url` holds the provider's program ID until the
/// schedule is pre-processed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YleMedia {
    pub item_id: String,
    pub url: String,
    pub description: String,
    pub is_recording: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    pub item_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    pub description: String,
    pub is_recording: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub item_id: String,
    pub description: String,
    pub options: Vec<String>,
    pub is_recording: bool,
}

/// A choice that may also offer a free-text "other" entry.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChoice {
    pub item_id: String,
    pub description: String,
    pub options: Vec<String>,
    pub is_recording: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_entry_label: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInput {
    pub item_id: String,
    pub description: String,
    pub is_recording: bool,
}

impl Item {
    /// Parses one raw record into a validated item.
    ///
    /// Fields that belong to other variants are dropped, so a lenient
    /// `text-input` record carrying `options` loses them here.
    pub fn from_value(value: Value) -> Result<Item, SchemaError> {
        let item_type = match value.as_object() {
            None => return Err(SchemaError::NotAnObject),
            Some(object) => match object.get("itemType") {
                None | Some(Value::Null) => return Err(SchemaError::MissingField("itemType")),
                Some(Value::String(s)) => s.clone(),
                Some(_) => {
                    return Err(SchemaError::InvalidField {
                        field: "itemType",
                        reason: "must be a string",
                    })
                }
            },
        };

        if !ITEM_TYPES.contains(&item_type.as_str()) {
            return Err(SchemaError::UnknownItemType(item_type));
        }

        let item: Item = serde_json::from_value(value)
            .map_err(|source| SchemaError::MalformedItem { item_type, source })?;

        item.validate()?;

        Ok(item)
    }

    /// Checks the rules serde cannot express.
    pub fn validate(&self) -> Result<(), SchemaError> {
        use Item::*;

        match self {
            Audio(m) | Video(m) | Image(m) => {
                non_empty("url", &m.url)?;
                non_empty("typeId", &m.type_id)
            }
            YleAudio(m) | YleVideo(m) => non_empty("url", &m.url),
            TextContent(t) => non_empty("url", &t.url),
            Choice(c) => check_options(&c.options),
            MultiChoice(c) | SuperChoice(c) => {
                check_options(&c.options)?;

                match &c.other_entry_label {
                    Some(label) => non_empty("otherEntryLabel", label),
                    None => Ok(()),
                }
            }
            TextInput(_) => Ok(()),
        }
    }

    pub fn item_type(&self) -> &'static str {
        use Item::*;

        match self {
            Audio(_) => "audio",
            Video(_) => "video",
            YleAudio(_) => "yle-audio",
            YleVideo(_) => "yle-video",
            TextContent(_) => "text-content",
            Image(_) => "image",
            Choice(_) => "choice",
            MultiChoice(_) => "multi-choice",
            SuperChoice(_) => "super-choice",
            TextInput(_) => "text-input",
        }
    }

    pub fn item_id(&self) -> &str {
        use Item::*;

        match self {
            Audio(m) | Video(m) | Image(m) => &m.item_id,
            YleAudio(m) | YleVideo(m) => &m.item_id,
            TextContent(t) => &t.item_id,
            Choice(c) => &c.item_id,
            MultiChoice(c) | SuperChoice(c) => &c.item_id,
            TextInput(t) => &t.item_id,
        }
    }

    pub fn description(&self) -> &str {
        use Item::*;

        match self {
            Audio(m) | Video(m) | Image(m) => &m.description,
            YleAudio(m) | YleVideo(m) => &m.description,
            TextContent(t) => &t.description,
            Choice(c) => &c.description,
            MultiChoice(c) | SuperChoice(c) => &c.description,
            TextInput(t) => &t.description,
        }
    }

    pub fn is_recording(&self) -> bool {
        use Item::*;

        match self {
            Audio(m) | Video(m) | Image(m) => m.is_recording,
            YleAudio(m) | YleVideo(m) => m.is_recording,
            TextContent(t) => t.is_recording,
            Choice(c) => c.is_recording,
            MultiChoice(c) | SuperChoice(c) => c.is_recording,
            TextInput(t) => t.is_recording,
        }
    }

    /// The YLE program ID slot, if this item is provider-hosted media.
    pub fn yle_program_mut(&mut self) -> Option<&mut String> {
        use Item::*;

        match self {
            YleAudio(m) | YleVideo(m) => Some(&mut m.url),
            Audio(_) | Video(_) | TextContent(_) | Image(_) | Choice(_) | MultiChoice(_)
            | SuperChoice(_) | TextInput(_) => None,
        }
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), SchemaError> {
    if value.is_empty() {
        Err(SchemaError::InvalidField {
            field,
            reason: "must not be empty",
        })
    } else {
        Ok(())
    }
}

fn check_options(options: &[String]) -> Result<(), SchemaError> {
    if options.is_empty() {
        return Err(SchemaError::InvalidField {
            field: "options",
            reason: "must list at least one option",
        });
    }

    if options.iter().any(String::is_empty) {
        return Err(SchemaError::InvalidField {
            field: "options",
            reason: "must not contain empty options",
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{json, Value};

    use super::{Item, ITEM_TYPES};
    use crate::errors::SchemaError;

    fn samples() -> Vec<Value> {
        vec![
            json!({"itemType": "audio", "itemId": "a1", "url": "https://x/a.m4a", "typeId": "audio/m4a", "description": "Listen", "isRecording": false}),
            json!({"itemType": "video", "itemId": "v1", "url": "https://x/v.mp4", "typeId": "video/mp4", "description": "Watch", "isRecording": true}),
            json!({"itemType": "yle-audio", "itemId": "ya1", "url": "1-50000093", "description": "Radio", "isRecording": false}),
            json!({"itemType": "yle-video", "itemId": "yv1", "url": "1-2345", "description": "TV", "isRecording": true}),
            json!({"itemType": "text-content", "itemId": "t1", "url": "https://x/t.html", "typeId": "text/html", "description": "Read", "isRecording": false}),
            json!({"itemType": "text-content", "itemId": "t2", "url": "https://x/t.txt", "description": "Read", "isRecording": false}),
            json!({"itemType": "image", "itemId": "i1", "url": "https://x/i.png", "typeId": "image/png", "description": "Look", "isRecording": true}),
            json!({"itemType": "choice", "itemId": "c1", "description": "Pick", "options": ["a", "b"], "isRecording": false}),
            json!({"itemType": "multi-choice", "itemId": "m1", "description": "Pick many", "options": ["TV", "Radio"], "isRecording": true, "otherEntryLabel": "Other"}),
            json!({"itemType": "super-choice", "itemId": "s1", "description": "Pick", "options": ["x"], "isRecording": false}),
            json!({"itemType": "text-input", "itemId": "ti1", "description": "Tell us", "isRecording": true}),
        ]
    }

    #[test]
    fn every_variant_round_trips() {
        for sample in samples() {
            let item = Item::from_value(sample.clone()).expect("parse sample item");
            let serialized = serde_json::to_value(&item).expect("serialize item");

            assert_eq!(serialized, sample);
            assert_eq!(item.item_type(), sample["itemType"]);
        }
    }

    #[test]
    fn text_input_drops_foreign_fields() {
        let item = Item::from_value(json!({
            "itemType": "text-input",
            "itemId": "ti",
            "description": "Tell us",
            "isRecording": false,
            "options": ["stray"],
            "url": null,
            "typeId": null,
            "kind": "prompt"
        }))
        .expect("parse lenient text-input");

        let serialized = serde_json::to_value(&item).expect("serialize");
        let object = serialized.as_object().expect("object");

        assert!(!object.contains_key("options"));
        assert!(!object.contains_key("url"));
        assert!(!object.contains_key("typeId"));
        assert!(!object.contains_key("kind"));
    }

    #[test]
    fn media_requires_type_id() {
        let error = Item::from_value(json!({
            "itemType": "image",
            "itemId": "i",
            "url": "https://x/i.png",
            "description": "Look",
            "isRecording": false
        }))
        .expect_err("image without typeId");

        assert!(error.to_string().contains("typeId"), "{}", error);
    }

    #[test]
    fn missing_item_type_is_named() {
        let error = Item::from_value(json!({"itemId": "x", "description": "d", "isRecording": false}))
            .expect_err("no itemType");

        assert!(matches!(error, SchemaError::MissingField("itemType")));
    }

    #[test]
    fn options_must_be_non_empty() {
        let empty_list = json!({"itemType": "choice", "itemId": "c", "description": "d", "options": [], "isRecording": false});
        let empty_option = json!({"itemType": "multi-choice", "itemId": "c", "description": "d", "options": ["a", ""], "isRecording": false});

        for value in vec![empty_list, empty_option] {
            assert!(matches!(
                Item::from_value(value),
                Err(SchemaError::InvalidField { field: "options", .. })
            ));
        }
    }

    #[test]
    fn other_entry_label_must_not_be_empty() {
        let value = json!({"itemType": "super-choice", "itemId": "s", "description": "d", "options": ["a"], "isRecording": false, "otherEntryLabel": ""});

        assert!(matches!(
            Item::from_value(value),
            Err(SchemaError::InvalidField { field: "otherEntryLabel", .. })
        ));
    }

    #[test]
    fn yle_url_must_not_be_empty() {
        let value = json!({"itemType": "yle-video", "itemId": "y", "url": "", "description": "d", "isRecording": false});

        assert!(matches!(
            Item::from_value(value),
            Err(SchemaError::InvalidField { field: "url", .. })
        ));
    }

    #[test]
    fn only_yle_items_expose_a_program() {
        for sample in samples() {
            let mut item = Item::from_value(sample).expect("parse");
            let is_yle = item.item_type().starts_with("yle-");

            assert_eq!(item.yle_program_mut().is_some(), is_yle);
        }
    }

    proptest! {
        #[test]
        fn unknown_item_types_are_rejected(item_type in "[a-z-]{1,16}") {
            prop_assume!(!ITEM_TYPES.contains(&item_type.as_str()));

            let value = json!({"itemType": item_type.clone(), "itemId": "x", "url": "u", "typeId": "t", "description": "d", "options": ["a"], "isRecording": false});

            match Item::from_value(value) {
                Err(SchemaError::UnknownItemType(named)) => prop_assert_eq!(named, item_type),
                other => prop_assert!(false, "expected UnknownItemType, got {:?}", other),
            }
        }

        #[test]
        fn choice_options_keep_their_order(options in prop::collection::vec("[a-zA-Z0-9äöå ]{1,20}", 1..8)) {
            let value = json!({"itemType": "choice", "itemId": "c", "description": "d", "options": options.clone(), "isRecording": true});
            let item = Item::from_value(value.clone()).expect("parse choice");

            prop_assert_eq!(serde_json::to_value(&item).expect("serialize"), value);
        }
    }
}
