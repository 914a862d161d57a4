//! Loader for the NPY serialized-array format.
//!
//! The samples ship fixed inputs and weights as `.npy` files: a short ASCII
//! header describing dtype, byte order, and shape, followed by the raw
//! element bytes. Every element is decoded individually at its byte offset,
//! honoring the byte-order flag of the header.
use std::str;

use thiserror::Error;

use crate::tensor::{size_of_shape, ElementType, Tensor, TensorData, TensorError};

/// Magic bytes opening every NPY file.
const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Errors from parsing an NPY byte buffer.
#[derive(Debug, Error)]
pub enum NpyError {
    #[error("not an npy file (magic bytes missing)")]
    BadMagic,
    #[error("unsupported npy format version {0}.{1}")]
    UnsupportedVersion(u8, u8),
    #[error("buffer ends inside the npy {0}")]
    Truncated(&'static str),
    #[error("malformed npy header: {0}")]
    BadHeader(&'static str),
    #[error("missing npy header field `{0}`")]
    MissingField(&'static str),
    #[error("fortran-order (column-major) arrays are not supported")]
    FortranOrder,
    #[error("shape {shape:?} needs {expected} payload bytes but found {actual}")]
    PayloadLength {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// A parsed NPY array: the typed tensor plus the dtype descriptor it was
/// declared with.
#[derive(Debug, Clone)]
pub struct NpyArray {
    descr: String,
    tensor: Tensor,
}

impl NpyArray {
    /// Parse a complete NPY byte buffer.
    pub fn parse(bytes: &[u8]) -> Result<NpyArray, NpyError> {
        if bytes.len() < 8 || &bytes[..6] != MAGIC {
            return Err(NpyError::BadMagic);
        }
        let (major, minor) = (bytes[6], bytes[7]);
        let (header_len, header_start) = match major {
            1 => {
                if bytes.len() < 10 {
                    return Err(NpyError::Truncated("header length"));
                }
                (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10)
            }
            2 => {
                if bytes.len() < 12 {
                    return Err(NpyError::Truncated("header length"));
                }
                let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
                (len as usize, 12)
            }
            _ => return Err(NpyError::UnsupportedVersion(major, minor)),
        };

        let data_start = header_start + header_len;
        if bytes.len() < data_start {
            return Err(NpyError::Truncated("header"));
        }
        let header = str::from_utf8(&bytes[header_start..data_start])
            .map_err(|_| NpyError::BadHeader("header is not valid ASCII"))?;

        let descr = str_field(header, "descr")?;
        if bool_field(header, "fortran_order")? {
            return Err(NpyError::FortranOrder);
        }
        let shape = shape_field(header)?;

        let (little_endian, tag) = split_descr(&descr)?;
        let element_type = ElementType::from_npy_tag(tag)?;

        let count = size_of_shape(&shape);
        let expected = count * element_type.size_in_bytes();
        let payload = &bytes[data_start..];
        if payload.len() != expected {
            return Err(NpyError::PayloadLength {
                shape,
                expected,
                actual: payload.len(),
            });
        }

        let data = decode_payload(element_type, payload, count, little_endian);
        let tensor = Tensor::new(data, shape)?;

        Ok(NpyArray { descr, tensor })
    }

    /// The dtype descriptor from the header, e.g. `<f4`.
    pub fn descr(&self) -> &str {
        &self.descr
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn into_tensor(self) -> Tensor {
        self.tensor
    }
}

/// Split a descr like `<f4` into its byte-order flag and dtype tag.
fn split_descr(descr: &str) -> Result<(bool, &str), NpyError> {
    let mut chars = descr.chars();
    let little_endian = match chars.next() {
        Some('<') | Some('|') | Some('=') => true,
        Some('>') => false,
        _ => return Err(NpyError::BadHeader("unknown byte-order flag in descr")),
    };
    Ok((little_endian, chars.as_str()))
}

/// Extract a single-quoted header dict value, e.g. `'descr': '<f4'`.
fn str_field(header: &str, key: &'static str) -> Result<String, NpyError> {
    let rest = field_value(header, key)?;
    let open = rest
        .find('\'')
        .ok_or(NpyError::BadHeader("expected quoted field value"))?;
    let close = rest[open + 1..]
        .find('\'')
        .ok_or(NpyError::BadHeader("unterminated quoted field value"))?;
    Ok(rest[open + 1..open + 1 + close].to_owned())
}

/// Extract a `True`/`False` header dict value.
fn bool_field(header: &str, key: &'static str) -> Result<bool, NpyError> {
    let rest = field_value(header, key)?.trim_start();
    if rest.starts_with("True") {
        Ok(true)
    } else if rest.starts_with("False") {
        Ok(false)
    } else {
        Err(NpyError::BadHeader("expected True or False"))
    }
}

/// Extract the shape tuple, e.g. `'shape': (2, 2)`.
fn shape_field(header: &str) -> Result<Vec<usize>, NpyError> {
    let rest = field_value(header, "shape")?;
    let open = rest
        .find('(')
        .ok_or(NpyError::BadHeader("expected shape tuple"))?;
    let close = rest[open..]
        .find(')')
        .ok_or(NpyError::BadHeader("unterminated shape tuple"))?;
    rest[open + 1..open + close]
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .map_err(|_| NpyError::BadHeader("shape entry is not an integer"))
        })
        .collect()
}

fn field_value<'a>(header: &'a str, key: &'static str) -> Result<&'a str, NpyError> {
    let pattern = format!("'{key}':");
    let at = header
        .find(&pattern)
        .ok_or(NpyError::MissingField(key))?;
    Ok(&header[at + pattern.len()..])
}

macro_rules! decode_elements {
    ($ty:ty, $payload:expr, $count:expr, $little_endian:expr) => {{
        const WIDTH: usize = std::mem::size_of::<$ty>();
        let mut values = Vec::with_capacity($count);
        for i in 0..$count {
            let mut raw = [0u8; WIDTH];
            raw.copy_from_slice(&$payload[i * WIDTH..(i + 1) * WIDTH]);
            values.push(if $little_endian {
                <$ty>::from_le_bytes(raw)
            } else {
                <$ty>::from_be_bytes(raw)
            });
        }
        values
    }};
}

fn decode_payload(
    element_type: ElementType,
    payload: &[u8],
    count: usize,
    little_endian: bool,
) -> TensorData {
    match element_type {
        // Half floats stay raw bit patterns, like the backend consumes them.
        ElementType::F16 => TensorData::F16(decode_elements!(u16, payload, count, little_endian)),
        ElementType::F32 => TensorData::F32(decode_elements!(f32, payload, count, little_endian)),
        ElementType::F64 => TensorData::F64(decode_elements!(f64, payload, count, little_endian)),
        ElementType::I8 => TensorData::I8(decode_elements!(i8, payload, count, little_endian)),
        ElementType::I16 => TensorData::I16(decode_elements!(i16, payload, count, little_endian)),
        ElementType::I32 => TensorData::I32(decode_elements!(i32, payload, count, little_endian)),
        ElementType::I64 => TensorData::I64(decode_elements!(i64, payload, count, little_endian)),
        ElementType::U8 => TensorData::U8(payload.to_vec()),
        ElementType::U16 => TensorData::U16(decode_elements!(u16, payload, count, little_endian)),
        ElementType::U32 => TensorData::U32(decode_elements!(u32, payload, count, little_endian)),
        ElementType::U64 => TensorData::U64(decode_elements!(u64, payload, count, little_endian)),
    }
}

#[cfg(test)]
mod test {

    use crate::half::to_half;

    use super::*;

    /// Assemble a version 1.0 NPY buffer for tests.
    fn npy_bytes(descr: &str, shape: &str, payload: &[u8]) -> Vec<u8> {
        let mut header =
            format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}")
                .into_bytes();
        header.push(b'\n');

        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_f4_little_endian() -> Result<(), NpyError> {
        let mut payload = Vec::new();
        for value in [1.0f32, 2.0, 3.0, 4.0] {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        let array = NpyArray::parse(&npy_bytes("<f4", "(2, 2)", &payload))?;

        assert_eq!(array.descr(), "<f4");
        assert_eq!(array.tensor().shape(), &[2, 2]);
        assert_eq!(
            array.tensor().data(),
            &TensorData::F32(vec![1.0, 2.0, 3.0, 4.0])
        );
        Ok(())
    }

    #[test]
    fn test_f4_big_endian() -> Result<(), NpyError> {
        let mut payload = Vec::new();
        for value in [1.0f32, 2.0, 3.0, 4.0] {
            payload.extend_from_slice(&value.to_be_bytes());
        }
        let array = NpyArray::parse(&npy_bytes(">f4", "(4,)", &payload))?;

        assert_eq!(
            array.tensor().data(),
            &TensorData::F32(vec![1.0, 2.0, 3.0, 4.0])
        );
        Ok(())
    }

    #[test]
    fn test_f2_keeps_bit_patterns() -> Result<(), NpyError> {
        let bits = to_half(1.5);
        let array = NpyArray::parse(&npy_bytes("<f2", "(1,)", &bits.to_le_bytes()))?;

        assert_eq!(array.tensor().data(), &TensorData::F16(vec![bits]));
        Ok(())
    }

    #[test]
    fn test_u1_and_i8() -> Result<(), NpyError> {
        let array = NpyArray::parse(&npy_bytes("|u1", "(3,)", &[7, 8, 9]))?;
        assert_eq!(array.tensor().data(), &TensorData::U8(vec![7, 8, 9]));

        let mut payload = Vec::new();
        for value in [-1i64, 1 << 40] {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        let array = NpyArray::parse(&npy_bytes("<i8", "(2,)", &payload))?;
        assert_eq!(array.tensor().data(), &TensorData::I64(vec![-1, 1 << 40]));
        Ok(())
    }

    #[test]
    fn test_scalar_shape() -> Result<(), NpyError> {
        let array = NpyArray::parse(&npy_bytes("<f4", "()", &42.0f32.to_le_bytes()))?;
        assert_eq!(array.tensor().shape(), &[] as &[usize]);
        assert_eq!(array.tensor().len(), 1);
        Ok(())
    }

    #[test]
    fn test_unsupported_dtype_names_the_tag() {
        let err = NpyArray::parse(&npy_bytes("<c8", "(1,)", &[0; 8])).unwrap_err();
        assert!(err.to_string().contains("c8"));
    }

    #[test]
    fn test_fortran_order_is_rejected() {
        let mut header =
            b"{'descr': '<f4', 'fortran_order': True, 'shape': (1,), }\n".to_vec();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.append(&mut header);
        bytes.extend_from_slice(&1.0f32.to_le_bytes());

        assert!(matches!(
            NpyArray::parse(&bytes),
            Err(NpyError::FortranOrder)
        ));
    }

    #[test]
    fn test_payload_length_mismatch() {
        let err = NpyArray::parse(&npy_bytes("<f4", "(2, 2)", &[0; 12])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("16"));
        assert!(message.contains("12"));
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            NpyArray::parse(b"NOTNUMPY"),
            Err(NpyError::BadMagic)
        ));
    }

    #[test]
    fn test_truncated_header() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&100u16.to_le_bytes());
        assert!(matches!(
            NpyArray::parse(&bytes),
            Err(NpyError::Truncated(_))
        ));
    }
}
