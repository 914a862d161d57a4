//! Fast style transfer sample.
use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Ix4;
use tract_onnx::prelude::*;

use common::preprocess::{input_to_tensor, InputOptions, Layout};
use common::tensor::TensorData;

use crate::utils::require_cached;

use super::{Error, InferModel, NnModel, NnOut, SampleOutput};

const MODEL_FILE: &str = "fast_style_transfer_starry_night.onnx";

/// Input and output edge of the network.
const RESOLUTION: usize = 540;

pub struct FastStyleModel {
    model: NnModel,
    options: InputOptions,
}

impl FastStyleModel {
    /// Load the style transfer model from the model directory.
    pub async fn new(model_dir: &Path) -> Result<Self, Error> {
        let model_path = require_cached(model_dir, MODEL_FILE)?;

        let input_fact = InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, RESOLUTION, RESOLUTION, 3),
        );
        let model = tract_onnx::onnx()
            .model_for_path(&model_path)?
            .with_input_fact(0, input_fact)?
            .into_optimized()?
            .into_runnable()?;

        // The network consumes raw 0..255 values; no normalization.
        let options = InputOptions::new([1, RESOLUTION, RESOLUTION, 3], Layout::Nhwc);

        log::info!("Initialized style transfer model");
        Ok(Self { model, options })
    }

    /// Stylized rendition of a frame at the network resolution.
    pub fn stylize(&self, input: &RgbImage) -> Result<RgbImage, Error> {
        let valid_input = tvec!(self.preproc(input)?);
        let raw_nn_out = self.model.run(valid_input)?;
        self.postproc(raw_nn_out)
    }

    fn preproc(&self, input: &RgbImage) -> Result<Tensor, Error> {
        let frame = DynamicImage::ImageRgb8(input.clone());
        let marshalled = input_to_tensor(&frame, &self.options)?;
        let TensorData::F32(values) = marshalled.into_data() else {
            return Err("style transfer input must be f32".into());
        };
        let tensor =
            tract_ndarray::Array4::from_shape_vec((1, RESOLUTION, RESOLUTION, 3), values)?.into();
        Ok(tensor)
    }

    /// Clamp the output planes back into displayable RGB.
    fn postproc(&self, raw_nn_out: NnOut) -> Result<RgbImage, Error> {
        let view = raw_nn_out[0].to_array_view::<f32>()?;
        let stylized = view.into_dimensionality::<Ix4>()?;

        let mut image = RgbImage::new(RESOLUTION as u32, RESOLUTION as u32);
        for y in 0..RESOLUTION {
            for x in 0..RESOLUTION {
                let pixel = Rgb([
                    clamp_to_byte(stylized[[0, y, x, 0]]),
                    clamp_to_byte(stylized[[0, y, x, 1]]),
                    clamp_to_byte(stylized[[0, y, x, 2]]),
                ]);
                image.put_pixel(x as u32, y as u32, pixel);
            }
        }
        Ok(image)
    }
}

impl InferModel for FastStyleModel {
    fn run(&self, input: &RgbImage) -> Result<SampleOutput, Error> {
        Ok(SampleOutput::Image(self.stylize(input)?))
    }
}

fn clamp_to_byte(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_clamp_to_byte() {
        assert_eq!(clamp_to_byte(-12.0), 0);
        assert_eq!(clamp_to_byte(0.4), 0);
        assert_eq!(clamp_to_byte(127.5), 128);
        assert_eq!(clamp_to_byte(254.6), 255);
        assert_eq!(clamp_to_byte(300.0), 255);
    }
}
