//! One-shot image classification sample.
//!
use std::path::PathBuf;

use clap::Parser;
use env_logger::TimestampPrecision;
use image::RgbImage;
use sample_server::{
    models::MobileNetV2Model,
    utils::{default_model_dir, fetch_bytes},
};

type Error = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Image to classify, as a file path or an http(s) URL
    image: String,

    /// Directory for downloaded models and labels
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
    let model = MobileNetV2Model::new(&model_dir).await?;

    let image = load_image(&args.image).await?;
    for (label, score) in model.classify(&image)? {
        println!("{score:6.2}%  {label}");
    }

    Ok(())
}

async fn load_image(source: &str) -> Result<RgbImage, Error> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let bytes = fetch_bytes(&reqwest::Client::new(), source).await?;
        Ok(image::load_from_memory(&bytes)?.to_rgb8())
    } else {
        Ok(image::open(source)?.to_rgb8())
    }
}
