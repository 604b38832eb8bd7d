use std::error::Error;
use std::path::PathBuf;

use log::{info, initialize_logger};
use structopt::StructOpt;

use recorder_backend::legacy::{item_count, migrate};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "convert-schedule",
    about = "Rewrite a schedule from the old kind/itemType layout into the current one"
)]
struct Opt {
    /// The legacy schedule to read
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Where to write the converted schedule
    #[structopt(parse(from_os_str))]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let opt = Opt::from_args();

    let logger = initialize_logger();

    let raw = tokio::fs::read(&opt.input).await?;
    let old: serde_json::Value = serde_json::from_slice(&raw)?;

    let new = migrate(&old)?;

    let mut formatted = serde_json::to_string_pretty(&new)?;
    formatted.push('\n');

    if let Some(parent) = opt.output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&opt.output, formatted).await?;

    info!(
        logger,
        "Converted schedule";
        "input" => %opt.input.display(),
        "output" => %opt.output.display(),
        "items" => item_count(&new)
    );

    Ok(())
}
