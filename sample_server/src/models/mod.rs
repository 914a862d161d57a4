//! The sample model zoo.
//!
//! Every sample follows the same seam: marshal the frame into a tensor with
//! `common::preprocess`, hand it to the tract plan, and postprocess the
//! output tensors into something drawable.
use std::path::Path;

use clap::ValueEnum;
use image::RgbImage;
use smallvec::SmallVec;
use tract_onnx::prelude::*;

use common::half::from_half;
use common::npy::NpyArray;
use common::tensor::TensorData;

pub mod classification;
pub mod segmentation;
pub mod style_transfer;

pub use classification::MobileNetV2Model;
pub use segmentation::DeepLabV3Model;
pub use style_transfer::FastStyleModel;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

pub type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;
pub type NnOut = SmallVec<[Arc<Tensor>; 4]>;

/// Result of running one sample on a frame.
pub enum SampleOutput {
    /// Top classes with percent scores, best first.
    Classes(Vec<(String, f32)>),
    /// Color-coded segmentation mask at the model's output resolution.
    Mask(RgbImage),
    /// Fully rendered output frame.
    Image(RgbImage),
}

/// A runnable sample model.
pub trait InferModel {
    fn run(&self, input: &RgbImage) -> Result<SampleOutput, Error>;
}

/// The sample pipelines the server can run.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SampleKind {
    Classification,
    Segmentation,
    StyleTransfer,
}

/// Instantiate the model behind a sample kind, downloading it on first use.
pub async fn load_sample(
    kind: SampleKind,
    model_dir: &Path,
) -> Result<Box<dyn InferModel + Send + Sync>, Error> {
    Ok(match kind {
        SampleKind::Classification => Box::new(MobileNetV2Model::new(model_dir).await?),
        SampleKind::Segmentation => Box::new(DeepLabV3Model::new(model_dir).await?),
        SampleKind::StyleTransfer => Box::new(FastStyleModel::new(model_dir).await?),
    })
}

/// Load an NPY file as a typed constant for the inference graph.
///
/// This is the seam to the graph builder: the parsed array becomes a tract
/// tensor of the same shape and dtype. Half-precision payloads are widened
/// to f32 through the shared codec, since the optimized graphs here compute
/// in f32.
pub fn constant_from_npy(path: impl AsRef<Path>) -> Result<Tensor, Error> {
    let bytes = std::fs::read(path)?;
    let array = NpyArray::parse(&bytes)?;
    let shape = array.tensor().shape().to_vec();
    let kind = array.tensor().element_type();

    let tensor = match array.into_tensor().into_data() {
        TensorData::F16(values) => {
            let widened: Vec<f32> = values.iter().map(|&bits| from_half(bits)).collect();
            array_to_tensor(shape, widened)?
        }
        TensorData::F32(values) => array_to_tensor(shape, values)?,
        TensorData::F64(values) => array_to_tensor(shape, values)?,
        TensorData::I8(values) => array_to_tensor(shape, values)?,
        TensorData::I16(values) => array_to_tensor(shape, values)?,
        TensorData::I32(values) => array_to_tensor(shape, values)?,
        TensorData::I64(values) => array_to_tensor(shape, values)?,
        TensorData::U8(values) => array_to_tensor(shape, values)?,
        TensorData::U16(values) => array_to_tensor(shape, values)?,
        TensorData::U32(_) | TensorData::U64(_) => {
            return Err(
                format!("npy element type {kind} has no backend constant representation").into(),
            );
        }
    };
    Ok(tensor)
}

fn array_to_tensor<T: Datum>(shape: Vec<usize>, values: Vec<T>) -> Result<Tensor, Error> {
    let array = tract_ndarray::ArrayD::from_shape_vec(tract_ndarray::IxDyn(&shape), values)?;
    Ok(array.into())
}

#[cfg(test)]
mod test {

    use std::io::Write;

    use common::half::to_half;

    use super::*;

    fn npy_file(descr: &str, shape: &str, payload: &[u8]) -> tempfile::NamedTempFile {
        let mut header =
            format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}")
                .into_bytes();
        header.push(b'\n');

        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        file.write_all(b"\x93NUMPY\x01\x00").expect("write magic");
        file.write_all(&(header.len() as u16).to_le_bytes())
            .expect("write header length");
        file.write_all(&header).expect("write header");
        file.write_all(payload).expect("write payload");
        file
    }

    #[test]
    fn test_f32_constant() -> Result<(), Error> {
        let mut payload = Vec::new();
        for value in [1.0f32, 2.0, 3.0, 4.0] {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        let file = npy_file("<f4", "(2, 2)", &payload);

        let tensor = constant_from_npy(file.path())?;
        assert_eq!(tensor.datum_type(), f32::datum_type());
        assert_eq!(tensor.shape(), &[2, 2]);
        assert_eq!(tensor.as_slice::<f32>()?, &[1.0, 2.0, 3.0, 4.0]);
        Ok(())
    }

    #[test]
    fn test_f16_constant_widens_to_f32() -> Result<(), Error> {
        let file = npy_file("<f2", "(1,)", &to_half(1.5).to_le_bytes());

        let tensor = constant_from_npy(file.path())?;
        assert_eq!(tensor.datum_type(), f32::datum_type());
        assert_eq!(tensor.as_slice::<f32>()?, &[1.5]);
        Ok(())
    }

    #[test]
    fn test_unrepresentable_constant_names_the_kind() {
        let file = npy_file("<u4", "(1,)", &7u32.to_le_bytes());

        let err = constant_from_npy(file.path()).unwrap_err();
        assert!(err.to_string().contains("u32"));
    }
}
