//! One-shot semantic segmentation sample.
//!
use std::path::PathBuf;

use clap::Parser;
use env_logger::TimestampPrecision;
use sample_server::{models::DeepLabV3Model, utils::default_model_dir};

type Error = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Image to segment
    image: PathBuf,

    /// Where to write the color-coded class mask
    #[clap(long, default_value = "segmentation.png")]
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
    let model = DeepLabV3Model::new(&model_dir).await?;

    let image = image::open(&args.image)?.to_rgb8();
    let mask = model.segment(&image)?;
    mask.save(&args.output)?;
    println!("Wrote class mask to {}", args.output.display());

    Ok(())
}
