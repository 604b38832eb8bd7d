//! Conversion of schedules written with the old `{kind, itemType}`
//! discriminator into the current flattened `itemType` shape.
//!
//! Input records are handled as loose JSON maps, not as [`crate::item::Item`]:
//! the old shape is not a variant of the current model.

use serde_json::{Map, Value};

use crate::errors::MigrationError;

type Record = Map<String, Value>;

/// Rewrites a legacy schedule. Top-level `scheduleId` and `description`
/// are copied when present; `items` is converted element by element.
pub fn migrate(old: &Value) -> Result<Value, MigrationError> {
    let old = old.as_object().ok_or(MigrationError::NotAnObject)?;
    let mut new = Record::new();

    for field in &["scheduleId", "description"] {
        if let Some(value) = old.get(*field) {
            new.insert((*field).to_owned(), value.clone());
        }
    }

    if let Some(items) = old.get("items") {
        let items = match items {
            Value::Array(items) => items,
            _ => return Err(MigrationError::ItemsNotAnArray),
        };

        let converted = items
            .iter()
            .enumerate()
            .map(|(index, item)| migrate_item(index, item).map(Value::Object))
            .collect::<Result<Vec<_>, _>>()?;

        new.insert("items".to_owned(), Value::Array(converted));
    }

    Ok(Value::Object(new))
}

/// Number of items in a (migrated or legacy) schedule.
pub fn item_count(schedule: &Value) -> usize {
    schedule
        .get("items")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

fn migrate_item(index: usize, item: &Value) -> Result<Record, MigrationError> {
    let old = item
        .as_object()
        .ok_or(MigrationError::ItemNotAnObject { index })?;

    let required = |field: &'static str| {
        old.get(field)
            .cloned()
            .ok_or(MigrationError::MissingField { index, field })
    };

    let mut new = Record::new();
    new.insert("itemId".to_owned(), required("itemId")?);
    new.insert("description".to_owned(), required("description")?);
    new.insert(
        "isRecording".to_owned(),
        old.get("isRecording").cloned().unwrap_or(Value::Bool(false)),
    );

    let kind = old.get("kind").and_then(Value::as_str).unwrap_or_default();
    let item_type = old
        .get("itemType")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let unknown_type = |kind| MigrationError::UnknownItemType {
        index,
        kind,
        item_type: item_type.to_owned(),
    };

    let new_type = match kind {
        "media" => {
            new.insert("url".to_owned(), required("url")?);

            match item_type {
                "text" => {
                    if let Some(type_id) = old.get("typeId").filter(|v| !v.is_null()) {
                        new.insert("typeId".to_owned(), type_id.clone());
                    }
                    "text-content"
                }
                "yle-audio" | "yle-video" => item_type,
                "audio" | "video" | "image" => {
                    new.insert("typeId".to_owned(), required("typeId")?);
                    item_type
                }
                _ => return Err(unknown_type("media")),
            }
        }
        "prompt" => match item_type {
            "text" => "text-input",
            "choice" => {
                new.insert("options".to_owned(), options(old));
                "choice"
            }
            "multi-choice" | "super-choice" => {
                new.insert("options".to_owned(), options(old));

                if let Some(label) = old.get("otherEntryLabel").filter(|v| is_truthy(v)) {
                    new.insert("otherEntryLabel".to_owned(), label.clone());
                }
                item_type
            }
            _ => return Err(unknown_type("prompt")),
        },
        _ => {
            return Err(MigrationError::UnknownKind {
                index,
                kind: kind.to_owned(),
            })
        }
    };

    new.insert("itemType".to_owned(), Value::String(new_type.to_owned()));

    Ok(new)
}

fn options(old: &Record) -> Value {
    old.get("options")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{item_count, migrate};
    use crate::document::{Document, Schedule};
    use crate::errors::MigrationError;

    fn migrate_one(item: Value) -> Result<Value, MigrationError> {
        migrate(&json!({"description": "d", "items": [item]}))
            .map(|schedule| schedule["items"][0].clone())
    }

    #[test]
    fn media_text_becomes_text_content() {
        let item = migrate_one(json!({
            "kind": "media", "itemType": "text", "itemId": "1", "description": "Read",
            "url": "https://x/t.txt", "options": ["stray"], "isRecording": true
        }))
        .unwrap();

        assert_eq!(
            item,
            json!({
                "itemType": "text-content", "itemId": "1", "description": "Read",
                "url": "https://x/t.txt", "isRecording": true
            })
        );

        let item = migrate_one(json!({
            "kind": "media", "itemType": "text", "itemId": "1", "description": "Read",
            "url": "https://x/t.txt", "typeId": "text/plain"
        }))
        .unwrap();
        assert_eq!(item["typeId"], "text/plain");
    }

    #[test]
    fn yle_media_drops_type_id() {
        for yle_type in &["yle-audio", "yle-video"] {
            let item = migrate_one(json!({
                "kind": "media", "itemType": yle_type, "itemId": "1", "description": "d",
                "url": "1-50000093", "typeId": "audio/mpeg"
            }))
            .unwrap();

            assert_eq!(
                item,
                json!({
                    "itemType": yle_type, "itemId": "1", "description": "d",
                    "url": "1-50000093", "isRecording": false
                })
            );
        }
    }

    #[test]
    fn plain_media_keeps_type_id() {
        for media_type in &["audio", "video", "image"] {
            let item = migrate_one(json!({
                "kind": "media", "itemType": media_type, "itemId": "1", "description": "d",
                "url": "https://x/m", "typeId": "application/octet-stream"
            }))
            .unwrap();

            assert_eq!(item["itemType"], *media_type);
            assert_eq!(item["typeId"], "application/octet-stream");
        }

        assert!(matches!(
            migrate_one(json!({
                "kind": "media", "itemType": "audio", "itemId": "1", "description": "d", "url": "u"
            })),
            Err(MigrationError::MissingField { index: 0, field: "typeId" })
        ));
    }

    #[test]
    fn prompt_text_becomes_bare_text_input() {
        let item = migrate_one(json!({
            "kind": "prompt", "itemType": "text", "itemId": "1", "description": "Say it",
            "url": "u", "typeId": "t", "options": ["a"], "isRecording": true
        }))
        .unwrap();

        assert_eq!(
            item,
            json!({"itemType": "text-input", "itemId": "1", "description": "Say it", "isRecording": true})
        );
    }

    #[test]
    fn choice_keeps_options_only() {
        let item = migrate_one(json!({
            "kind": "prompt", "itemType": "choice", "itemId": "1", "description": "Pick",
            "url": "u", "typeId": "t", "options": ["b", "a"], "otherEntryLabel": "Other"
        }))
        .unwrap();

        assert_eq!(
            item,
            json!({
                "itemType": "choice", "itemId": "1", "description": "Pick",
                "options": ["b", "a"], "isRecording": false
            })
        );

        let item = migrate_one(json!({
            "kind": "prompt", "itemType": "choice", "itemId": "1", "description": "Pick"
        }))
        .unwrap();
        assert_eq!(item["options"], json!([]));
    }

    #[test]
    fn open_choices_keep_non_empty_labels() {
        for choice_type in &["multi-choice", "super-choice"] {
            let item = migrate_one(json!({
                "kind": "prompt", "itemType": choice_type, "itemId": "1", "description": "d",
                "options": ["x"], "otherEntryLabel": "Something else", "url": "u"
            }))
            .unwrap();

            assert_eq!(item["itemType"], *choice_type);
            assert_eq!(item["otherEntryLabel"], "Something else");
            assert!(item.get("url").is_none());

            let item = migrate_one(json!({
                "kind": "prompt", "itemType": choice_type, "itemId": "1", "description": "d",
                "options": ["x"], "otherEntryLabel": ""
            }))
            .unwrap();
            assert!(item.get("otherEntryLabel").is_none());
        }
    }

    #[test]
    fn unknown_discriminators_are_named() {
        match migrate_one(json!({"kind": "banner", "itemType": "text", "itemId": "1", "description": "d"})) {
            Err(MigrationError::UnknownKind { index: 0, kind }) => assert_eq!(kind, "banner"),
            other => panic!("expected unknown kind, got {:?}", other),
        }

        match migrate_one(json!({"kind": "prompt", "itemType": "slider", "itemId": "1", "description": "d"})) {
            Err(MigrationError::UnknownItemType { kind: "prompt", item_type, .. }) => {
                assert_eq!(item_type, "slider")
            }
            other => panic!("expected unknown item type, got {:?}", other),
        }

        assert!(matches!(
            migrate_one(json!({"kind": "media", "itemType": "hologram", "itemId": "1", "description": "d", "url": "u"})),
            Err(MigrationError::UnknownItemType { kind: "media", .. })
        ));
    }

    #[test]
    fn top_level_fields_are_copied_and_order_kept() {
        let old = json!({
            "scheduleId": "s-1",
            "description": "Old",
            "unrelated": true,
            "items": [
                {"kind": "prompt", "itemType": "text", "itemId": "b", "description": "1"},
                {"kind": "prompt", "itemType": "choice", "itemId": "a", "description": "2", "options": ["y"]}
            ]
        });

        let new = migrate(&old).unwrap();

        assert_eq!(new["scheduleId"], "s-1");
        assert_eq!(new["description"], "Old");
        assert!(new.get("unrelated").is_none());
        assert_eq!(item_count(&new), 2);
        assert_eq!(new["items"][0]["itemId"], "b");
        assert_eq!(new["items"][1]["itemId"], "a");

        // the migrated document satisfies the current model
        let parsed = Schedule::parse(&serde_json::to_vec(&new).unwrap()).expect("parse migrated");
        assert_eq!(parsed.items.len(), 2);
    }

    #[test]
    fn non_object_input_fails() {
        assert!(matches!(migrate(&json!([])), Err(MigrationError::NotAnObject)));
        assert!(matches!(
            migrate(&json!({"items": {"kind": "media"}})),
            Err(MigrationError::ItemsNotAnArray)
        ));
        assert!(matches!(
            migrate(&json!({"items": [1]})),
            Err(MigrationError::ItemNotAnObject { index: 0 })
        ));
    }
}
