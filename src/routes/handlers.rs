use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::future::try_join_all;
use log::{debug, info, o, Logger};
use serde_json::Value;
use warp::{
    reject,
    reply::{json, with_header, Reply},
};

use crate::document::{id_from_key, sort_by_id, Document, Listed, Schedule, Theme};
use crate::environment::Environment;
use crate::errors::{BackendError, ValidationError};
use crate::preprocess::resolve_schedule;
use crate::routes::{
    rejection::{Context, Rejection},
    response::SuccessResponse,
};
use crate::upload::{plan_upload, DeleteScope, UploadMetadata, UploadTarget};

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        // TODO when `try` blocks are stabilized, we can wrap the body
        // and return the headers even on errors
        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn schedule(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::schedule(id.clone()), e);
        let logger = environment.logger.new(o!("schedule" => id.clone()));

        debug!(logger, "Loading schedule...");
        let schedule = load_schedule(&environment, &Schedule::key_for(&id), &id)
            .await
            .map_err(error_handler)?;

        json(&schedule)
    }
}

pub async fn schedules(environment: Environment) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::schedules(), e);

        debug!(environment.logger, "Listing schedules...");
        let entries = list_entries::<Schedule>(&environment).await.map_err(error_handler)?;

        let environment = &environment;
        let mut schedules = try_join_all(entries.iter().map(|(key, id)| async move {
            load_schedule(environment, key, id)
                .await
                .map(|schedule| Listed::new(id.clone(), schedule))
        }))
        .await
        .map_err(error_handler)?;

        sort_by_id(&mut schedules);
        json(&schedules)
    }
}

pub async fn theme(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::theme(id.clone()), e);
        let logger = environment.logger.new(o!("theme" => id.clone()));

        debug!(logger, "Loading theme...");
        let theme = load_theme(&environment, &Theme::key_for(&id), &id)
            .await
            .map_err(error_handler)?;

        json(&theme)
    }
}

pub async fn themes(environment: Environment) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::themes(), e);

        debug!(environment.logger, "Listing themes...");
        let entries = list_entries::<Theme>(&environment).await.map_err(error_handler)?;

        let environment = &environment;
        let mut themes = try_join_all(entries.iter().map(|(key, id)| async move {
            load_theme(environment, key, id)
                .await
                .map(|theme| Listed::new(id.clone(), theme))
        }))
        .await
        .map_err(error_handler)?;

        sort_by_id(&mut themes);
        json(&themes)
    }
}

pub async fn upload(environment: Environment, body: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::upload(None), e);

        debug!(environment.logger, "Parsing upload request...");
        let (target, metadata) = parse_upload(&body).map_err(error_handler)?;

        let error_handler =
            |e: BackendError| Rejection::new(Context::upload(Some(target.audio_key.clone())), e);
        let logger = environment.logger.new(o!("key" => target.audio_key.clone()));

        let presigned_url = start_upload(&environment, &logger, &target, &metadata)
            .await
            .map_err(error_handler)?;

        info!(logger, "Issued upload URL");
        json(&SuccessResponse::Upload { presigned_url })
    }
}

pub async fn delete_client(environment: Environment, client_id: String) -> RouteResult {
    delete(environment, client_id, None, None).await
}

pub async fn delete_session(
    environment: Environment,
    client_id: String,
    session_id: String,
) -> RouteResult {
    delete(environment, client_id, Some(session_id), None).await
}

pub async fn delete_recording(
    environment: Environment,
    client_id: String,
    session_id: String,
    recording_id: String,
) -> RouteResult {
    delete(environment, client_id, Some(session_id), Some(recording_id)).await
}

async fn delete(
    environment: Environment,
    client_id: String,
    session_id: Option<String>,
    recording_id: Option<String>,
) -> RouteResult {
    timed! {
        let path: Vec<&str> = std::iter::once(client_id.as_str())
            .chain(session_id.as_deref())
            .chain(recording_id.as_deref())
            .collect();
        let error_handler = |e: BackendError| Rejection::new(Context::delete(path.join("/")), e);

        let scope = DeleteScope::parse(&client_id, session_id.as_deref(), recording_id.as_deref())
            .map_err(BackendError::from)
            .map_err(error_handler)?;
        let logger = environment.logger.new(o!("scope" => path.join("/")));

        debug!(logger, "Deleting recordings...");
        let deleted = delete_scope(&environment, &scope).await.map_err(error_handler)?;

        info!(logger, "Deleted recordings"; "count" => deleted);
        json(&SuccessResponse::Deleted { message: scope.describe(deleted) })
    }
}

/// Lists `(key, id)` pairs under a document prefix, skipping the
/// directory marker.
async fn list_entries<D: Document>(
    environment: &Environment,
) -> Result<Vec<(String, String)>, BackendError> {
    let keys = environment.store.list_keys(D::PREFIX).await?;

    Ok(keys
        .into_iter()
        .filter_map(|key| id_from_key(D::PREFIX, &key).map(|id| (key, id)))
        .collect())
}

async fn load_schedule(
    environment: &Environment,
    key: &str,
    id: &str,
) -> Result<Schedule, BackendError> {
    let raw = environment.store.get(key).await?;
    let schedule = Schedule::parse(&raw)?.assign_id(id);

    Ok(resolve_schedule(environment.resolver.as_ref(), schedule).await?)
}

async fn load_theme(environment: &Environment, key: &str, id: &str) -> Result<Theme, BackendError> {
    let raw = environment.store.get(key).await?;

    Ok(Theme::parse(&raw)?.assign_id(id))
}

fn parse_upload(body: &[u8]) -> Result<(UploadTarget, UploadMetadata), BackendError> {
    let body: Value = serde_json::from_slice(body).map_err(ValidationError::MalformedRequest)?;

    Ok(plan_upload(body)?)
}

async fn start_upload(
    environment: &Environment,
    logger: &Logger,
    target: &UploadTarget,
    metadata: &UploadMetadata,
) -> Result<String, BackendError> {
    let raw = serde_json::to_vec(metadata).map_err(BackendError::MetadataSerialization)?;

    debug!(logger, "Storing metadata..."; "metadata_key" => &target.metadata_key);
    environment
        .store
        .put(&target.metadata_key, raw, mime::APPLICATION_JSON.as_ref())
        .await?;

    debug!(logger, "Signing upload URL...");
    let url = environment.store.signed_upload_url(
        &target.audio_key,
        target.content_type.as_deref(),
        environment.upload_policy.url_ttl,
    )?;

    Ok(url.to_string())
}

async fn delete_scope(environment: &Environment, scope: &DeleteScope) -> Result<usize, BackendError> {
    let mut deleted = 0;

    for prefix in scope.prefixes().iter() {
        deleted += environment.store.delete_by_prefix(prefix).await?;
    }

    Ok(deleted)
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
