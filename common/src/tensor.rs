//! Flat tensor buffers with validated shapes.
//!
use std::fmt;

use thiserror::Error;

/// Errors from constructing tensor buffers.
#[derive(Debug, Error)]
pub enum TensorError {
    #[error("shape {shape:?} describes {expected} elements but the buffer holds {actual}")]
    LengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("data type tag `{0}` is not supported")]
    UnsupportedTag(String),
}

/// Element kinds a tensor buffer can hold.
///
/// One variant per dtype tag of the NPY format, matched exhaustively at
/// decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F16,
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl ElementType {
    /// Size of a single element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ElementType::I8 | ElementType::U8 => 1,
            ElementType::F16 | ElementType::I16 | ElementType::U16 => 2,
            ElementType::F32 | ElementType::I32 | ElementType::U32 => 4,
            ElementType::F64 | ElementType::I64 | ElementType::U64 => 8,
        }
    }

    /// Map an NPY dtype tag (without the byte-order flag) to an element type.
    pub fn from_npy_tag(tag: &str) -> Result<ElementType, TensorError> {
        match tag {
            "f2" => Ok(ElementType::F16),
            "f4" => Ok(ElementType::F32),
            "f8" => Ok(ElementType::F64),
            "i1" => Ok(ElementType::I8),
            "i2" => Ok(ElementType::I16),
            "i4" => Ok(ElementType::I32),
            "i8" => Ok(ElementType::I64),
            "u1" => Ok(ElementType::U8),
            "u2" => Ok(ElementType::U16),
            "u4" => Ok(ElementType::U32),
            "u8" => Ok(ElementType::U64),
            other => Err(TensorError::UnsupportedTag(other.to_owned())),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::F16 => "f16",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::I8 => "i8",
            ElementType::I16 => "i16",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::U8 => "u8",
            ElementType::U16 => "u16",
            ElementType::U32 => "u32",
            ElementType::U64 => "u64",
        };
        write!(f, "{name}")
    }
}

/// Typed flat storage for one tensor.
///
/// Half-precision data is carried as raw bit patterns, the same way the
/// inference backends accept compressed float16 input buffers.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F16(Vec<u16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl TensorData {
    pub fn element_type(&self) -> ElementType {
        match self {
            TensorData::F16(_) => ElementType::F16,
            TensorData::F32(_) => ElementType::F32,
            TensorData::F64(_) => ElementType::F64,
            TensorData::I8(_) => ElementType::I8,
            TensorData::I16(_) => ElementType::I16,
            TensorData::I32(_) => ElementType::I32,
            TensorData::I64(_) => ElementType::I64,
            TensorData::U8(_) => ElementType::U8,
            TensorData::U16(_) => ElementType::U16,
            TensorData::U32(_) => ElementType::U32,
            TensorData::U64(_) => ElementType::U64,
        }
    }

    /// Number of elements in the buffer.
    pub fn len(&self) -> usize {
        match self {
            TensorData::F16(values) => values.len(),
            TensorData::F32(values) => values.len(),
            TensorData::F64(values) => values.len(),
            TensorData::I8(values) => values.len(),
            TensorData::I16(values) => values.len(),
            TensorData::I32(values) => values.len(),
            TensorData::I64(values) => values.len(),
            TensorData::U8(values) => values.len(),
            TensorData::U16(values) => values.len(),
            TensorData::U32(values) => values.len(),
            TensorData::U64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A flat buffer in row-major order plus its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: TensorData,
    shape: Vec<usize>,
}

impl Tensor {
    /// Create a tensor, validating that the shape matches the buffer length.
    pub fn new(data: TensorData, shape: Vec<usize>) -> Result<Tensor, TensorError> {
        let expected = size_of_shape(&shape);
        if expected != data.len() {
            return Err(TensorError::LengthMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Tensor { data, shape })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }
}

/// Number of elements described by a shape.
///
/// The empty shape describes a scalar, i.e. one element.
pub fn size_of_shape(shape: &[usize]) -> usize {
    shape.iter().product()
}
