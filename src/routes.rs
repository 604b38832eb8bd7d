use std::sync::Arc;

use log::{debug, error, warn, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, Reply, WithStatus};
use warp::Filter;

use crate::environment::Environment;
use crate::errors::{BackendError, StoreError};

pub mod admin;
mod handlers;
mod rejection;
mod response;

pub use internal::*;

/// Upload requests carry a filename and a little metadata, never audio.
const MAX_CONTENT_LENGTH: u64 = 64 * 1024;

/// Composes every public route with error recovery and CORS.
pub fn make_api(
    environment: Environment,
) -> impl Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    let logger = environment.logger.clone();

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "DELETE"])
        .allow_header("content-type");

    make_schedule_route(environment.clone())
        .or(make_schedules_route(environment.clone()))
        .or(make_theme_route(environment.clone()))
        .or(make_themes_route(environment.clone()))
        .or(make_upload_route(environment.clone()))
        .or(make_delete_client_route(environment.clone()))
        .or(make_delete_session_route(environment.clone()))
        .or(make_delete_recording_route(environment))
        .recover(move |r| format_rejection(logger.clone(), r))
        .with(cors)
}

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        let status = status_code_for(e);

        if status.is_server_error() {
            error!(logger, "Backend error"; "context" => ?r.context, "error" => ?e, "status" => %status, "message" => %e);
        } else if let BackendError::Schema(_) = e {
            warn!(logger, "Malformed document"; "context" => ?r.context, "status" => %status, "message" => %e);
        } else {
            debug!(logger, "Request rejected"; "context" => ?r.context, "status" => %status, "message" => %e);
        }

        let flattened = r.flatten();

        return Ok(with_status(json(&flattened), status));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        Validation(_) => StatusCode::BAD_REQUEST,
        Schema(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        Store(_) | Resolution(_) | MetadataSerialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{body, delete, get as g, path as p, path::param as par, post};

    use super::{handlers, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name(environment: Environment) -> Route {
            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p("v1"));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .boxed()
        }
    );
}

    route!(make_schedule_route => schedule, rt; p("schedule"), par::<String>(), end(), g());
    route!(make_schedules_route => schedules, rt; p("schedule"), end(), g());
    route!(make_theme_route => theme, rt; p("theme"), par::<String>(), end(), g());
    route!(make_themes_route => themes, rt; p("theme"), end(), g());
    route!(make_upload_route => upload, rt; p("upload"), end(), post(), body::content_length_limit(MAX_CONTENT_LENGTH), body::bytes());
    route!(make_delete_client_route => delete_client, rt; p("recordings"), par::<String>(), end(), delete());
    route!(make_delete_session_route => delete_session, rt; p("recordings"), par::<String>(), par::<String>(), end(), delete());
    route!(make_delete_recording_route => delete_recording, rt; p("recordings"), par::<String>(), par::<String>(), par::<String>(), end(), delete());
}
