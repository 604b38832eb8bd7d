//! Post-upload checks on files clients wrote straight to the store.
//!
//! Uploads bypass this service, so anything can land under the uploads
//! prefix. The guard deletes oversized metadata sidecars, audio outside the
//! allowed size window, and files whose header does not sniff as audio.
//! Deletion is best effort: failures are logged, never raised.

use std::sync::Arc;

use infer::{Infer, MatcherType};
use log::{debug, error, info, o, warn, Logger};
use serde::Deserialize;

use crate::config::GuardPolicy;
use crate::errors::StoreError;
use crate::store::Store;
use crate::upload::{METADATA_PREFIX, UPLOADS_PREFIX};

const METADATA_SUFFIX: &str = ".json";

/// Why a file was removed.
#[derive(Clone, Debug, PartialEq)]
pub enum Violation {
    OversizedMetadata { size: u64 },
    SizeOutOfRange { size: u64 },
    NotAudio { detected: Option<&'static str> },
}

/// Outcome of checking one key.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Audio { mime: &'static str },
    Metadata,
    Deleted(Violation),
}

/// Counts from a batch run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Summary {
    pub kept: usize,
    pub deleted: usize,
    /// Keys gone before their turn, such as sidecars removed with their audio.
    pub missing: usize,
    pub failed: usize,
}

pub struct AudioGuard {
    store: Arc<dyn Store>,
    policy: GuardPolicy,
    logger: Arc<Logger>,
    infer: Infer,
}

impl AudioGuard {
    pub fn new(store: Arc<dyn Store>, policy: GuardPolicy, logger: Arc<Logger>) -> Self {
        let mut infer = Infer::new();
        infer.add("audio/x-caf", "caf", is_caf);

        AudioGuard {
            store,
            policy,
            logger,
            infer,
        }
    }

    /// Checks one uploaded file, deleting it (and its sidecar) if invalid.
    pub async fn check(&self, key: &str) -> Result<Verdict, StoreError> {
        let logger = self.logger.new(o!("key" => key.to_owned()));

        if key.ends_with(METADATA_SUFFIX) {
            let size = self.store.size(key).await?;

            if size > self.policy.max_metadata_bytes {
                warn!(logger, "Deleting oversized metadata"; "size" => size);
                self.delete_quietly(&logger, key).await;

                return Ok(Verdict::Deleted(Violation::OversizedMetadata { size }));
            }

            return Ok(Verdict::Metadata);
        }

        let size = self.store.size(key).await?;

        if size < self.policy.min_audio_bytes || size > self.policy.max_audio_bytes {
            warn!(logger, "Deleting file with invalid size"; "size" => size);
            self.delete_with_metadata(&logger, key).await;

            return Ok(Verdict::Deleted(Violation::SizeOutOfRange { size }));
        }

        // ranged reads fail on empty objects, so only sniff inside the window
        let (head, _) = self
            .store
            .get_range(key, 0, self.policy.sniff_bytes)
            .await?;

        match self.infer.get(&head) {
            Some(kind) if is_audio(&kind) => {
                info!(logger, "Valid audio file"; "mime" => kind.mime_type());

                Ok(Verdict::Audio {
                    mime: kind.mime_type(),
                })
            }
            other => {
                let detected = other.map(|kind| kind.mime_type());
                warn!(logger, "Deleting file that is not audio"; "detected" => detected);
                self.delete_with_metadata(&logger, key).await;

                Ok(Verdict::Deleted(Violation::NotAudio { detected }))
            }
        }
    }

    /// Checks every key in turn. Unreadable keys are logged and counted;
    /// keys that no longer exist are not failures.
    pub async fn check_all<I>(&self, keys: I) -> Summary
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut summary = Summary::default();

        for key in keys {
            let key = key.as_ref();

            match self.check(key).await {
                Ok(Verdict::Deleted(_)) => summary.deleted += 1,
                Ok(_) => summary.kept += 1,
                Err(StoreError::NotFound { .. }) => {
                    debug!(self.logger, "File already removed"; "key" => key);
                    summary.missing += 1;
                }
                Err(e) => {
                    error!(self.logger, "Could not check file"; "key" => key, "error" => %e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    async fn delete_with_metadata(&self, logger: &Logger, key: &str) {
        self.delete_quietly(logger, key).await;

        match metadata_key_for(key) {
            Some(metadata_key) => self.delete_quietly(logger, &metadata_key).await,
            None => warn!(logger, "No metadata key for file"),
        }
    }

    async fn delete_quietly(&self, logger: &Logger, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            error!(logger, "Error deleting file"; "deleted_key" => key, "error" => %e);
        }
    }
}

/// Maps an audio key to its metadata sidecar: the audio prefix becomes the
/// metadata prefix and the extension becomes `json`.
pub fn metadata_key_for(audio_key: &str) -> Option<String> {
    let relative = audio_key.strip_prefix(UPLOADS_PREFIX)?;
    let (stem, _) = relative.rsplit_once('.')?;

    Some(format!("{}{}{}", METADATA_PREFIX, stem, METADATA_SUFFIX))
}

#[derive(Deserialize)]
struct Event {
    #[serde(rename = "Records", default)]
    records: Vec<EventRecord>,
}

#[derive(Deserialize)]
struct EventRecord {
    s3: EventEntity,
}

#[derive(Deserialize)]
struct EventEntity {
    object: EventObject,
}

#[derive(Deserialize)]
struct EventObject {
    key: String,
}

/// Extracts the object keys from an S3 event notification. Keys arrive
/// form-url-encoded.
pub fn keys_from_event(raw: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    let event: Event = serde_json::from_slice(raw)?;

    Ok(event
        .records
        .into_iter()
        .filter_map(|record| {
            url::form_urlencoded::parse(record.s3.object.key.as_bytes())
                .next()
                .map(|(key, _)| key.into_owned())
        })
        .collect())
}

fn is_audio(kind: &infer::Type) -> bool {
    kind.matcher_type() == MatcherType::Audio || kind.mime_type().starts_with("audio/")
}

/// Core Audio Format files start with `caff`.
fn is_caf(buf: &[u8]) -> bool {
    buf.starts_with(b"caff")
}
