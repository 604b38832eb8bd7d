//! Health and shutdown endpoints. Served on the admin port only.

use std::convert::Infallible;
use std::sync::Arc;

use futures::future::BoxFuture;
use warp::http::StatusCode;
use warp::reply::{json, Reply};
use warp::{Filter, Rejection};

use super::response::SuccessResponse;

/// Starts a graceful shutdown of both servers.
pub type Terminate = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

fn health() -> SuccessResponse<'static> {
    SuccessResponse::Healthz {
        service: info::SERVICE,
        version: info::VERSION,
        revision: info::REVISION,
        timestamp: info::BUILD_TIMESTAMP,
    }
}

pub fn make_healthz_route() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("healthz")
        .and(warp::get())
        .map(|| json(&health()))
}

/// `POST /terminate` answers once shutdown has been requested; the
/// servers drain in-flight requests afterwards.
pub fn make_termination_route(
    terminate: Terminate,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("terminate")
        .and(warp::post())
        .and_then(move || {
            let terminate = terminate.clone();

            async move {
                terminate().await;
                Ok::<_, Infallible>(StatusCode::ACCEPTED)
            }
        })
}
