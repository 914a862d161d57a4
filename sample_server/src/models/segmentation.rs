//! Semantic segmentation sample (DeepLabV3 with a MobileNetV2 backbone).
use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};
use lazy_static::lazy_static;
use ndarray::Ix4;
use tract_onnx::prelude::*;

use common::preprocess::{input_to_tensor, InputOptions, Layout};
use common::tensor::TensorData;

use crate::utils::require_cached;

use super::{Error, InferModel, NnModel, NnOut, SampleOutput};

const MODEL_FILE: &str = "deeplab_mobilenetv2_321_no_argmax.onnx";

/// Input and output edge of the network.
const RESOLUTION: usize = 321;
/// Pascal VOC classes in the output planes.
const NUM_CLASSES: usize = 21;

lazy_static! {
    /// Pascal VOC class colors, index-aligned with the output planes.
    static ref PALETTE: [Rgb<u8>; NUM_CLASSES] = [
        Rgb([0, 0, 0]),       // background
        Rgb([128, 0, 0]),     // aeroplane
        Rgb([0, 128, 0]),     // bicycle
        Rgb([128, 128, 0]),   // bird
        Rgb([0, 0, 128]),     // boat
        Rgb([128, 0, 128]),   // bottle
        Rgb([0, 128, 128]),   // bus
        Rgb([128, 128, 128]), // car
        Rgb([64, 0, 0]),      // cat
        Rgb([192, 0, 0]),     // chair
        Rgb([64, 128, 0]),    // cow
        Rgb([192, 128, 0]),   // dining table
        Rgb([64, 0, 128]),    // dog
        Rgb([192, 0, 128]),   // horse
        Rgb([64, 128, 128]),  // motorbike
        Rgb([192, 128, 128]), // person
        Rgb([0, 64, 0]),      // potted plant
        Rgb([128, 64, 0]),    // sheep
        Rgb([0, 192, 0]),     // sofa
        Rgb([128, 192, 0]),   // train
        Rgb([0, 64, 128]),    // tv monitor
    ];
}

pub struct DeepLabV3Model {
    model: NnModel,
    options: InputOptions,
}

impl DeepLabV3Model {
    /// Load the segmentation model from the model directory.
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

        let mut options = InputOptions::new([1, RESOLUTION, RESOLUTION, 3], Layout::Nhwc);
        options.mean = [127.5, 127.5, 127.5, 0.0];
        options.std = [127.5, 127.5, 127.5, 1.0];

        log::info!("Initialized segmentation model");
        Ok(Self { model, options })
    }

    /// Color-coded class mask for a frame.
    pub fn segment(&self, input: &RgbImage) -> Result<RgbImage, Error> {
        let valid_input = tvec!(self.preproc(input)?);
        let raw_nn_out = self.model.run(valid_input)?;
        self.postproc(raw_nn_out)
    }

    fn preproc(&self, input: &RgbImage) -> Result<Tensor, Error> {
        let frame = DynamicImage::ImageRgb8(input.clone());
        let marshalled = input_to_tensor(&frame, &self.options)?;
        let TensorData::F32(values) = marshalled.into_data() else {
            return Err("segmentation input must be f32".into());
        };
        let tensor =
            tract_ndarray::Array4::from_shape_vec((1, RESOLUTION, RESOLUTION, 3), values)?.into();
        Ok(tensor)
    }

    /// Per-pixel argmax over the class planes, painted with the palette.
    fn postproc(&self, raw_nn_out: NnOut) -> Result<RgbImage, Error> {
        let view = raw_nn_out[0].to_array_view::<f32>()?;
        let logits = view.into_dimensionality::<Ix4>()?;

        let mut mask = RgbImage::new(RESOLUTION as u32, RESOLUTION as u32);
        for y in 0..RESOLUTION {
            for x in 0..RESOLUTION {
                let mut best = 0;
                let mut best_score = f32::NEG_INFINITY;
                for class in 0..NUM_CLASSES {
                    let score = logits[[0, y, x, class]];
                    if score > best_score {
                        best_score = score;
                        best = class;
                    }
                }
                mask.put_pixel(x as u32, y as u32, PALETTE[best]);
            }
        }
        Ok(mask)
    }
}

impl InferModel for DeepLabV3Model {
    fn run(&self, input: &RgbImage) -> Result<SampleOutput, Error> {
        Ok(SampleOutput::Mask(self.segment(input)?))
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_palette_covers_all_classes() {
        assert_eq!(PALETTE.len(), NUM_CLASSES);
        // Background stays black so unlabeled regions blend away.
        assert_eq!(PALETTE[0], Rgb([0, 0, 0]));
    }
}
