//! Inference worker: runs the selected sample on scheduled frames.
use std::{path::Path, time::Instant};

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use imageproc::drawing::draw_text;
use rusttype::{Font, Scale};

use crate::meter::METER;
use crate::models::{load_sample, InferModel, SampleKind, SampleOutput};
use crate::{as_jpeg_stream_item, StaticImageReceiver};

/// Overlay color for the classification labels.
const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

pub struct Inferer {
    infer_rx: StaticImageReceiver,
    model: Box<dyn InferModel + Send + Sync>,
    font: Font<'static>,
}

impl Inferer {
    pub async fn new(
        infer_rx: StaticImageReceiver,
        kind: SampleKind,
        model_dir: &Path,
        font_path: &Path,
    ) -> Self {
        let model = load_sample(kind, model_dir)
            .await
            .expect("failed to initialize model");
        let font_data = std::fs::read(font_path).expect("failed to read overlay font");
        let font = Font::try_from_vec(font_data).expect("failed to load overlay font");
        Self {
            infer_rx,
            model,
            font,
        }
    }

    pub async fn run(&self) {
        loop {
            if let Some(recv_ref) = self.infer_rx.recv_ref().await {
                let image: RgbImage = match turbojpeg::decompress_image(recv_ref.0.as_slice()) {
                    Ok(image) => image,
                    Err(err) => {
                        log::warn!("Dropping undecodable frame: {err}");
                        continue;
                    }
                };
                let Some(sender) = recv_ref.1.as_ref() else {
                    continue;
                };

                let started = Instant::now();
                match self.model.run(&image) {
                    Ok(output) => {
                        METER.record_latency(started.elapsed());
                        METER.tick_processed();

                        let frame = self.render(image, output);
                        match turbojpeg::compress_image(&frame, 95, turbojpeg::Subsamp::Sub2x2) {
                            Ok(buf) => {
                                sender.send(as_jpeg_stream_item(&buf)).ok();
                            }
                            Err(err) => log::error!("Failed to encode processed frame: {err}"),
                        }
                    }
                    Err(err) => log::error!("Inference failed: {err}"),
                }
            }
        }
    }

    fn render(&self, frame: RgbImage, output: SampleOutput) -> RgbImage {
        match output {
            SampleOutput::Classes(classes) => draw_classes_on_image(frame, &classes, &self.font),
            SampleOutput::Mask(mask) => blend_mask_on_image(frame, &mask),
            SampleOutput::Image(stylized) => stylized,
        }
    }
}

/// Draw the top class labels with their scores on the frame.
fn draw_classes_on_image(
    mut frame: RgbImage,
    classes: &[(String, f32)],
    font: &Font,
) -> RgbImage {
    for (row, (label, score)) in classes.iter().enumerate() {
        frame = draw_text(
            &frame,
            OVERLAY_COLOR,
            8,
            8 + row as i32 * 20,
            Scale { x: 16.0, y: 16.0 },
            font,
            &format!("{label}: {score:.2}%"),
        );
    }
    frame
}

/// Blend the segmentation mask over the frame at half opacity.
///
/// The background class stays black in the palette, so unlabeled regions
/// simply darken instead of changing hue.
fn blend_mask_on_image(frame: RgbImage, mask: &RgbImage) -> RgbImage {
    let resized = imageops::resize(mask, frame.width(), frame.height(), FilterType::Nearest);

    let mut blended = frame;
    for (pixel, overlay) in blended.pixels_mut().zip(resized.pixels()) {
        for channel in 0..3 {
            pixel[channel] = ((pixel[channel] as u16 + overlay[channel] as u16) / 2) as u8;
        }
    }
    blended
}
