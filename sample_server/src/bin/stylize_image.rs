//! One-shot style transfer sample.
//!
use std::path::PathBuf;

use clap::Parser;
use env_logger::TimestampPrecision;
use sample_server::{models::FastStyleModel, utils::default_model_dir};

type Error = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Image to stylize
    image: PathBuf,

    /// Where to write the stylized frame
    #[clap(long, default_value = "stylized.png")]
    output: PathBuf,

    /// Directory for downloaded models
    #[clap(long)]
    model_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let model_dir = default_model_dir(args.model_dir)?;
    let model = FastStyleModel::new(&model_dir).await?;

    let image = image::open(&args.image)?.to_rgb8();
    let stylized = model.stylize(&image)?;
    stylized.save(&args.output)?;
    println!("Wrote stylized frame to {}", args.output.display());

    Ok(())
}
