//! Image classification sample (MobileNetV2, 1000 ImageNet classes).
use std::path::Path;

use image::{DynamicImage, RgbImage};
use ndarray::s;
use tract_onnx::prelude::*;

use common::preprocess::{input_to_tensor, InputOptions, Layout};
use common::tensor::TensorData;

use crate::utils::{ensure_cached, load_labels};

use super::{Error, InferModel, NnModel, NnOut, SampleOutput};

const MODEL_FILE: &str = "mobilenetv2-7.onnx";
const MODEL_URL: &str = "https://github.com/onnx/models/raw/main/validated/vision/classification/mobilenet/model/mobilenetv2-7.onnx";
const LABELS_FILE: &str = "synset.txt";
const LABELS_URL: &str =
    "https://github.com/onnx/models/raw/main/validated/vision/classification/synset.txt";

/// Input edge of the network.
const RESOLUTION: usize = 224;
/// Classes reported per frame.
const TOP_K: usize = 3;

pub struct MobileNetV2Model {
    model: NnModel,
    labels: Vec<String>,
    options: InputOptions,
}

impl MobileNetV2Model {
    /// Load the classification model, downloading it on first use.
    pub async fn new(model_dir: &Path) -> Result<Self, Error> {
        let model_path = ensure_cached(model_dir, MODEL_FILE, MODEL_URL).await?;
        let labels_path = ensure_cached(model_dir, LABELS_FILE, LABELS_URL).await?;
        // Synset lines carry a WordNet id before the human-readable label.
        let labels: Vec<String> = load_labels(&labels_path)?
            .into_iter()
            .map(|line| match line.split_once(' ') {
                Some((_synset_id, label)) => label.to_owned(),
                None => line,
            })
            .collect();

        let input_fact = InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, 3, RESOLUTION, RESOLUTION),
        );
        let model = tract_onnx::onnx()
            .model_for_path(&model_path)?
            .with_input_fact(0, input_fact)?
            .into_optimized()?
            .into_runnable()?;

        let mut options = InputOptions::new([1, 3, RESOLUTION, RESOLUTION], Layout::Nchw);
        options.mean = [0.485, 0.456, 0.406, 0.0];
        options.std = [0.229, 0.224, 0.225, 1.0];
        options.norm = true;

        log::info!("Initialized classification model with {} labels", labels.len());
        Ok(Self {
            model,
            labels,
            options,
        })
    }

    /// Top classes for a frame, best first, with percent scores.
    pub fn classify(&self, input: &RgbImage) -> Result<Vec<(String, f32)>, Error> {
        let valid_input = tvec!(self.preproc(input)?);
        let raw_nn_out = self.model.run(valid_input)?;
        self.postproc(raw_nn_out)
    }

    fn preproc(&self, input: &RgbImage) -> Result<Tensor, Error> {
        let frame = DynamicImage::ImageRgb8(input.clone());
        let marshalled = input_to_tensor(&frame, &self.options)?;
        let TensorData::F32(values) = marshalled.into_data() else {
            return Err("classification input must be f32".into());
        };
        let tensor =
            tract_ndarray::Array4::from_shape_vec((1, 3, RESOLUTION, RESOLUTION), values)?.into();
        Ok(tensor)
    }

    fn postproc(&self, raw_nn_out: NnOut) -> Result<Vec<(String, f32)>, Error> {
        let logits = raw_nn_out[0]
            .to_array_view::<f32>()?
            .slice(s![0, ..])
            .to_vec();
        let probs = softmax(&logits);

        let mut indexed: Vec<(usize, f32)> = probs.into_iter().enumerate().collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        let classes = indexed
            .iter()
            .take(TOP_K)
            .map(|&(index, prob)| {
                let label = self
                    .labels
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| format!("class {index}"));
                (label, prob * 100.0)
            })
            .collect();
        Ok(classes)
    }
}

impl InferModel for MobileNetV2Model {
    fn run(&self, input: &RgbImage) -> Result<SampleOutput, Error> {
        Ok(SampleOutput::Classes(self.classify(input)?))
    }
}

/// Softmax over the raw class scores.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&logit| (logit - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|&exp| exp / sum).collect()
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_is_shift_invariant() {
        let a = softmax(&[0.0, 1.0]);
        let b = softmax(&[100.0, 101.0]);
        assert!((a[0] - b[0]).abs() < 1e-6);
    }
}
