use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use log::{error, info, initialize_logger};
use tokio::sync::mpsc;
use warp::Filter;

use recorder_backend::config::{get_variable, UploadPolicy, YleConfig};
use recorder_backend::environment::Environment;
use recorder_backend::routes;
use recorder_backend::store::S3Store;
use recorder_backend::yle::YleResolver;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    #[cfg(feature = "env_logging")]
    let _scope_guard = log::initialize_env_logging()?;

    let logger = initialize_logger();

    let main_port: u16 = get_variable("BACKEND_PORT")
        .parse()
        .expect("parse BACKEND_PORT as u16");
    let admin_port: u16 = get_variable("BACKEND_ADMIN_PORT")
        .parse()
        .expect("parse BACKEND_ADMIN_PORT as u16");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    let store = Arc::new(S3Store::from_env().expect("initialize S3 store from environment"));

    let yle_config = YleConfig::from_env()?;
    info!(logger, "Configured YLE resolver"; "config" => ?yle_config);
    let resolver = Arc::new(YleResolver::with_http(yle_config, logger.clone())?);

    let environment = Environment::new(
        logger.clone(),
        store,
        resolver,
        UploadPolicy::from_env(),
    );

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate = {
        let logger = logger.clone();

        Arc::new(move || {
            let termination_sender = termination_sender.clone();
            let logger = logger.clone();

            async move {
                if termination_sender.send(()).await.is_err() {
                    error!(logger, "Termination already in progress");
                }
            }
            .boxed()
        })
    };

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::make_api(environment.clone());

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::admin::make_healthz_route()
            .or(routes::admin::make_termination_route(terminate));

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
