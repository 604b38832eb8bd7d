use rusoto_core::RusotoError;
use rusoto_s3::{
    DeleteObjectError, GetObjectError, HeadObjectError, ListObjectsV2Error, PutObjectError,
};
use thiserror::Error;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A stored document or one of its items is malformed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// An external program could not be turned into a playable URL.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The blob store failed or did not have the object.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The request itself is unacceptable.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Upload metadata could not be re-serialized for storage.
    #[error("could not serialize upload metadata")]
    MetadataSerialization(#[source] serde_json::Error),
}

/// Errors raised while parsing schedules, themes and items.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("document is not valid JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    #[error("document must be a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unrecognized itemType `{0}`")]
    UnknownItemType(String),

    #[error("invalid `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    /// The record has the right discriminator but the wrong shape.
    #[error("{item_type} item is malformed: {source}")]
    MalformedItem {
        item_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("item #{index}: {source}")]
    Item {
        index: usize,
        #[source]
        source: Box<SchemaError>,
    },
}

/// The uniform failure of the YLE resolution protocol. The cause tells
/// which step failed.
#[derive(Debug, Error)]
#[error("content resolution failed for program {program_id}")]
pub struct ResolutionError {
    pub program_id: String,
    #[source]
    pub cause: ResolutionCause,
}

impl ResolutionError {
    pub fn new(program_id: impl Into<String>, cause: ResolutionCause) -> Self {
        ResolutionError {
            program_id: program_id.into(),
            cause,
        }
    }

    /// Whether the program simply has no publication event running now,
    /// as opposed to the provider misbehaving.
    pub fn is_no_current_publication(&self) -> bool {
        matches!(self.cause, ResolutionCause::NoCurrentPublication)
    }
}

#[derive(Debug, Error)]
pub enum ResolutionCause {
    #[error("program ID must have the form <integer>-<integer>")]
    MalformedProgramId,

    #[error("no current publication event")]
    NoCurrentPublication,

    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse {
        endpoint: &'static str,
        reason: String,
    },

    #[error("request to provider timed out")]
    Timeout,

    #[error("request to provider failed")]
    Http(#[source] reqwest::Error),

    #[error("provider answered with status {0}")]
    Status(u16),

    #[error("encrypted URL is not valid base64")]
    Base64(#[source] base64::DecodeError),

    #[error("encrypted URL could not be decrypted: {0}")]
    Decryption(&'static str),

    #[error("decrypted URL is not UTF-8")]
    NotUtf8(#[source] std::string::FromUtf8Error),
}

/// Enumerates errors returned by the store subsystem.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {key} not found")]
    NotFound { key: String },

    #[error("failed to retrieve object")]
    GetFailed {
        #[source]
        source: RusotoError<GetObjectError>,
    },

    #[error("failed to inspect object")]
    HeadFailed {
        #[source]
        source: RusotoError<HeadObjectError>,
    },

    #[error("failed to list objects")]
    ListFailed {
        #[source]
        source: RusotoError<ListObjectsV2Error>,
    },

    #[error("failed to save object")]
    UploadFailed {
        #[source]
        source: RusotoError<PutObjectError>,
    },

    #[error("failed to delete object")]
    DeleteFailed {
        #[source]
        source: RusotoError<DeleteObjectError>,
    },

    #[error("failed to read object body")]
    ReadFailed(#[source] std::io::Error),

    #[error("failed to generate upload URL: {0}")]
    SigningFailed(String),

    /// Used by stores that have no richer error to report.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Problems with the shape of a request. Always the client's fault.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is missing or not a valid UUID v4: {value:?}")]
    InvalidId { field: &'static str, value: String },

    #[error("invalid filename {0:?}")]
    InvalidFilename(String),

    #[error("file extension .{0} not allowed")]
    DisallowedExtension(String),

    #[error("malformed upload request: {0}")]
    MalformedRequest(#[source] serde_json::Error),
}

/// Errors raised while rewriting legacy schedules.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("schedule must be a JSON object")]
    NotAnObject,

    #[error("schedule items must be a JSON array")]
    ItemsNotAnArray,

    #[error("item #{index} must be a JSON object")]
    ItemNotAnObject { index: usize },

    #[error("item #{index}: unknown kind {kind:?}")]
    UnknownKind { index: usize, kind: String },

    #[error("item #{index}: unknown {kind} itemType {item_type:?}")]
    UnknownItemType {
        index: usize,
        kind: &'static str,
        item_type: String,
    },

    #[error("item #{index}: missing field `{field}`")]
    MissingField { index: usize, field: &'static str },
}
