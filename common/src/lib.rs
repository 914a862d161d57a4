//! Common code shared between `sample_server` and `cam_sender`.
//!
//! The tensor-marshalling core of the samples lives here: converting decoded
//! frames into model input tensors, the half-precision codec used for
//! compressed inputs, and the NPY loader for serialized constants.
pub mod half;
pub mod npy;
pub mod preprocess;
pub mod protocol;
pub mod tensor;
