use image::{Rgb, RgbImage};
use sample_server::models::MobileNetV2Model;
use sample_server::utils::default_model_dir;

type Error = Box<dyn std::error::Error + Send + Sync>;

/// Runs the classification sample end to end when the model files are
/// already cached; otherwise the test only reports that it skipped. The
/// suite stays runnable without network access or a primed cache.
#[tokio::test]
async fn classify_if_model_is_cached() -> Result<(), Error> {
    let model_dir = default_model_dir(None)?;
    if !model_dir.join("mobilenetv2-7.onnx").exists() || !model_dir.join("synset.txt").exists() {
        println!("Model files not cached under {}, skipping", model_dir.display());
        return Ok(());
    }

    let model = MobileNetV2Model::new(&model_dir).await?;
    let image = RgbImage::from_pixel(320, 240, Rgb([120, 80, 40]));

    let classes = model.classify(&image)?;
    assert_eq!(classes.len(), 3);
    // Scores are percentages sorted best first.
    assert!(classes[0].1 >= classes[1].1);
    assert!(classes[0].1 <= 100.0);

    Ok(())
}
