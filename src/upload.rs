//! Validation and key layout for direct-to-store uploads.
//!
//! Clients never send audio through this service. They post a filename and
//! metadata, the metadata is stored as a JSON sidecar, and the client gets
//! a short-lived signed URL to `PUT` the audio itself.

use std::collections::HashSet;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::ValidationError;

pub const UPLOADS_PREFIX: &str = "uploads/audio_and_metadata/";
pub const METADATA_PREFIX: &str = "uploads/audio_and_metadata/metadata/";

lazy_static! {
    static ref ALLOWED_EXTENSIONS: HashSet<&'static str> =
        ["m4a", "flac", "amr", "wav", "opus", "caf"].iter().copied().collect();
}

#[derive(Clone, Debug, Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    pub metadata: UploadMetadata,
}

/// Client-supplied description of a recording. Unknown fields are kept
/// and written to the sidecar unchanged.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where an accepted upload goes.
#[derive(Debug, PartialEq)]
pub struct UploadTarget {
    pub audio_key: String,
    pub metadata_key: String,
    pub content_type: Option<String>,
}

/// Validates a raw request body and works out its storage keys.
pub fn plan_upload(body: Value) -> Result<(UploadTarget, UploadMetadata), ValidationError> {
    let request: UploadRequest =
        serde_json::from_value(body).map_err(ValidationError::MalformedRequest)?;

    let (stem, _) = validate_filename(&request.filename)?;
    let metadata = request.metadata;

    let mut scope = validate_uuid_v4("clientId", &metadata.client_id)?.to_string();
    scope.push('/');

    // an empty session counts as no session; `recordingId` is carried but never keyed
    if let Some(session_id) = metadata.session_id.as_deref().filter(|id| !id.is_empty()) {
        scope.push_str(&validate_uuid_v4("sessionId", session_id)?.to_string());
        scope.push('/');
    }

    let target = UploadTarget {
        audio_key: format!("{}{}{}", UPLOADS_PREFIX, scope, request.filename),
        metadata_key: format!("{}{}{}.json", METADATA_PREFIX, scope, stem),
        content_type: metadata.content_type.clone(),
    };

    Ok((target, metadata))
}

/// Splits an acceptable filename into stem and extension.
///
/// The name must be a single path segment with an allowed extension;
/// the extension check ignores case.
pub fn validate_filename(filename: &str) -> Result<(&str, &str), ValidationError> {
    if filename.contains('/') || filename.contains('\\') {
        return Err(ValidationError::InvalidFilename(filename.to_owned()));
    }

    let (stem, extension) = filename
        .rsplit_once('.')
        .ok_or_else(|| ValidationError::InvalidFilename(filename.to_owned()))?;

    if stem.is_empty() {
        return Err(ValidationError::InvalidFilename(filename.to_owned()));
    }

    if !ALLOWED_EXTENSIONS.contains(extension.to_ascii_lowercase().as_str()) {
        return Err(ValidationError::DisallowedExtension(extension.to_owned()));
    }

    Ok((stem, extension))
}

/// Accepts only version 4 UUIDs.
pub fn validate_uuid_v4(field: &'static str, value: &str) -> Result<Uuid, ValidationError> {
    match Uuid::parse_str(value) {
        Ok(uuid) if uuid.get_version_num() == 4 => Ok(uuid),
        _ => Err(ValidationError::InvalidId {
            field,
            value: value.to_owned(),
        }),
    }
}

/// The recordings a `DELETE` applies to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeleteScope {
    Client(Uuid),
    Session(Uuid, Uuid),
    Recording(Uuid, Uuid, Uuid),
}

impl DeleteScope {
    pub fn parse(
        client_id: &str,
        session_id: Option<&str>,
        recording_id: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let client = validate_uuid_v4("clientId", client_id)?;

        let session = match session_id {
            None => return Ok(DeleteScope::Client(client)),
            Some(session_id) => validate_uuid_v4("sessionId", session_id)?,
        };

        match recording_id {
            None => Ok(DeleteScope::Session(client, session)),
            Some(recording_id) => Ok(DeleteScope::Recording(
                client,
                session,
                validate_uuid_v4("recordingId", recording_id)?,
            )),
        }
    }

    /// The audio prefix followed by the matching metadata prefix.
    ///
    /// Recording prefixes have no trailing slash: they match every file
    /// whose name starts with the recording ID.
    pub fn prefixes(&self) -> [String; 2] {
        let scope = match self {
            DeleteScope::Client(client) => format!("{}/", client),
            DeleteScope::Session(client, session) => format!("{}/{}/", client, session),
            DeleteScope::Recording(client, session, recording) => {
                format!("{}/{}/{}", client, session, recording)
            }
        };

        [
            format!("{}{}", UPLOADS_PREFIX, scope),
            format!("{}{}", METADATA_PREFIX, scope),
        ]
    }

    pub fn describe(&self, deleted: usize) -> String {
        match self {
            DeleteScope::Client(client) => {
                format!("Deleted {} objects for client {}", deleted, client)
            }
            DeleteScope::Session(_, session) => {
                format!("Deleted {} objects for session {}", deleted, session)
            }
            DeleteScope::Recording(_, _, recording) => {
                format!("Deleted {} objects for recording {}", deleted, recording)
            }
        }
    }
}
