use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use dotenv::dotenv;
use log::{info, initialize_logger};
use structopt::StructOpt;

use recorder_backend::config::GuardPolicy;
use recorder_backend::guard::{keys_from_event, AudioGuard};
use recorder_backend::store::{S3Store, Store};
use recorder_backend::upload::UPLOADS_PREFIX;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "check-uploads",
    about = "Delete uploaded files that are not plausible audio recordings"
)]
struct Opt {
    /// An S3 event notification whose object keys should be checked
    #[structopt(long, parse(from_os_str))]
    event: Option<PathBuf>,

    /// Keys to check; every upload is checked if none are given
    keys: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();

    let logger = Arc::new(initialize_logger());

    let store = Arc::new(S3Store::from_env().expect("initialize S3 store from environment"));
    let policy = GuardPolicy::from_env();

    let mut keys = opt.keys;

    if let Some(event) = &opt.event {
        let raw = tokio::fs::read(event).await?;
        keys.extend(keys_from_event(&raw)?);
    }

    if keys.is_empty() {
        info!(logger, "Listing all uploads..."; "prefix" => UPLOADS_PREFIX);
        keys = store.list_keys(UPLOADS_PREFIX).await?;
    }

    info!(logger, "Checking uploads..."; "count" => keys.len(), "policy" => ?policy);

    let guard = AudioGuard::new(store, policy, logger.clone());
    let summary = guard.check_all(&keys).await;

    info!(
        logger,
        "Finished checking uploads";
        "kept" => summary.kept,
        "deleted" => summary.deleted,
        "missing" => summary.missing,
        "failed" => summary.failed
    );

    Ok(())
}
