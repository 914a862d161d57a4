//! Pixel-to-tensor conversion for the sample models.
//!
//! Every sample marshals its camera frame or still image through the same
//! routine: resample into the model's raster, read back interleaved RGBA,
//! normalize per channel, and write the values out in the layout the model
//! declares. The conversion is all-or-nothing; options are validated before
//! the first element is written.
use image::{imageops, imageops::FilterType, DynamicImage, RgbaImage};
use thiserror::Error;

use crate::half::to_half;
use crate::tensor::{size_of_shape, ElementType, Tensor, TensorData, TensorError};

/// Interleaved channels of the RGBA source raster.
const IMAGE_CHANNELS: usize = 4;

/// Tensor axis ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Nchw,
    Nhwc,
}

/// Channel ordering of the produced tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelScheme {
    Rgb,
    Bgr,
}

/// Sub-rectangle of the source to convert instead of the full frame.
#[derive(Debug, Clone, Copy)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Options describing how a frame becomes a model input tensor.
#[derive(Debug, Clone)]
pub struct InputOptions {
    /// Target dimensions including the batch axis, e.g. `[1, 3, 224, 224]`.
    pub dimensions: [usize; 4],
    pub layout: Layout,
    /// Per-channel mean, applied as `(value - mean[c]) / std[c]`.
    pub mean: [f32; 4],
    pub std: [f32; 4],
    /// Divide pixel values by 255 before applying mean and std.
    pub norm: bool,
    pub channel_scheme: ChannelScheme,
    /// Downscale preserving aspect ratio before placing the frame on the
    /// target raster; the uncovered border reads as zero.
    pub scaled: bool,
    pub crop: Option<CropRegion>,
    /// Output precision: `F32`, or `F16` as raw bit patterns.
    pub element_type: ElementType,
}

impl InputOptions {
    /// Identity options for the given dimensions and layout.
    pub fn new(dimensions: [usize; 4], layout: Layout) -> InputOptions {
        InputOptions {
            dimensions,
            layout,
            mean: [0.0; 4],
            std: [1.0; 4],
            norm: false,
            channel_scheme: ChannelScheme::Rgb,
            scaled: false,
            crop: None,
            element_type: ElementType::F32,
        }
    }
}

/// Errors from validating conversion options.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("batch dimension must be 1, got {0}")]
    BadBatch(usize),
    #[error("dimensions {0:?} contain a zero axis")]
    ZeroDimension([usize; 4]),
    #[error("{0} channels exceed the {IMAGE_CHANNELS} channels of the RGBA source")]
    TooManyChannels(usize),
    #[error("std contains a zero entry for channel {0}")]
    ZeroStd(usize),
    #[error("element type {0} is not a supported input precision")]
    BadElementType(ElementType),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Convert a decoded frame into a tensor matching `options`.
///
/// The produced buffer's traversal order matches the requested layout
/// exactly; its element count equals the product of the non-batch
/// dimensions.
pub fn input_to_tensor(
    image: &DynamicImage,
    options: &InputOptions,
) -> Result<Tensor, PreprocessError> {
    let (channels, height, width) = validate(options)?;

    let raster = rasterize(image, width as u32, height as u32, options);
    let pixels = raster.as_raw();
    let plane = width * height;

    let mut values = vec![0.0f32; size_of_shape(&options.dimensions[1..])];
    for c in 0..channels {
        for y in 0..height {
            for x in 0..width {
                let source_channel = match options.channel_scheme {
                    ChannelScheme::Rgb => c,
                    ChannelScheme::Bgr => channels - c - 1,
                };
                let mut value =
                    pixels[y * width * IMAGE_CHANNELS + x * IMAGE_CHANNELS + source_channel] as f32;
                if options.norm {
                    value /= 255.0;
                }
                let index = match options.layout {
                    Layout::Nchw => c * plane + y * width + x,
                    Layout::Nhwc => y * width * channels + x * channels + c,
                };
                values[index] = (value - options.mean[c]) / options.std[c];
            }
        }
    }

    let data = match options.element_type {
        ElementType::F16 => TensorData::F16(values.iter().map(|&value| to_half(value)).collect()),
        _ => TensorData::F32(values),
    };
    Ok(Tensor::new(data, options.dimensions.to_vec())?)
}

/// Check the options and return (channels, height, width) per the layout.
fn validate(options: &InputOptions) -> Result<(usize, usize, usize), PreprocessError> {
    let dimensions = options.dimensions;
    if dimensions[0] != 1 {
        return Err(PreprocessError::BadBatch(dimensions[0]));
    }
    if dimensions.contains(&0) {
        return Err(PreprocessError::ZeroDimension(dimensions));
    }
    let (channels, height, width) = match options.layout {
        Layout::Nchw => (dimensions[1], dimensions[2], dimensions[3]),
        Layout::Nhwc => (dimensions[3], dimensions[1], dimensions[2]),
    };
    if channels > IMAGE_CHANNELS {
        return Err(PreprocessError::TooManyChannels(channels));
    }
    for channel in 0..channels {
        if options.std[channel] == 0.0 {
            return Err(PreprocessError::ZeroStd(channel));
        }
    }
    match options.element_type {
        ElementType::F32 | ElementType::F16 => Ok((channels, height, width)),
        other => Err(PreprocessError::BadElementType(other)),
    }
}

/// Resample the source into an RGBA raster of the target size.
fn rasterize(image: &DynamicImage, width: u32, height: u32, options: &InputOptions) -> RgbaImage {
    let source = match options.crop {
        Some(region) => image
            .crop_imm(region.x, region.y, region.width, region.height)
            .to_rgba8(),
        None => image.to_rgba8(),
    };

    if options.scaled {
        // Never upscale: ratio is clamped to at least 1.
        let ratio = f32::max(
            f32::max(
                source.width() as f32 / width as f32,
                source.height() as f32 / height as f32,
            ),
            1.0,
        );
        let scaled_width = (source.width() as f32 / ratio).floor() as u32;
        let scaled_height = (source.height() as f32 / ratio).floor() as u32;
        let scaled = imageops::resize(&source, scaled_width, scaled_height, FilterType::Triangle);

        let mut canvas = RgbaImage::new(width, height);
        imageops::overlay(&mut canvas, &scaled, 0, 0);
        canvas
    } else {
        imageops::resize(&source, width, height, FilterType::Triangle)
    }
}

#[cfg(test)]
mod test {

    use image::Rgba;

    use super::*;

    fn solid_image(width: u32, height: u32, rgba: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    fn f32_data(tensor: Tensor) -> Vec<f32> {
        match tensor.into_data() {
            TensorData::F32(values) => values,
            other => panic!("expected f32 data, got {}", other.element_type()),
        }
    }

    #[test]
    fn test_solid_red_nchw_planes() -> Result<(), PreprocessError> {
        let image = solid_image(2, 2, [255, 0, 0, 255]);
        let options = InputOptions::new([1, 3, 2, 2], Layout::Nchw);

        let tensor = input_to_tensor(&image, &options)?;
        assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
        assert_eq!(
            f32_data(tensor),
            vec![255.0, 255.0, 255.0, 255.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
        Ok(())
    }

    #[test]
    fn test_solid_red_nhwc_interleaved() -> Result<(), PreprocessError> {
        let image = solid_image(2, 2, [255, 0, 0, 255]);
        let options = InputOptions::new([1, 2, 2, 3], Layout::Nhwc);

        let tensor = input_to_tensor(&image, &options)?;
        assert_eq!(
            f32_data(tensor),
            vec![255.0, 0.0, 0.0, 255.0, 0.0, 0.0, 255.0, 0.0, 0.0, 255.0, 0.0, 0.0]
        );
        Ok(())
    }

    #[test]
    fn test_bgr_reverses_channels() -> Result<(), PreprocessError> {
        let image = solid_image(2, 2, [255, 10, 0, 255]);
        let mut options = InputOptions::new([1, 3, 2, 2], Layout::Nchw);
        options.channel_scheme = ChannelScheme::Bgr;

        let values = f32_data(input_to_tensor(&image, &options)?);
        // First plane reads blue, last plane reads red.
        assert_eq!(values[0], 0.0);
        assert_eq!(values[4], 10.0);
        assert_eq!(values[8], 255.0);
        Ok(())
    }

    #[test]
    fn test_norm_and_mean_std() -> Result<(), PreprocessError> {
        let image = solid_image(4, 4, [255, 255, 255, 255]);
        let mut options = InputOptions::new([1, 3, 4, 4], Layout::Nchw);
        options.norm = true;
        options.mean = [0.5, 0.5, 0.5, 0.0];
        options.std = [0.25, 0.25, 0.25, 1.0];

        let values = f32_data(input_to_tensor(&image, &options)?);
        // (255/255 - 0.5) / 0.25
        assert!(values.iter().all(|&value| value == 2.0));
        Ok(())
    }

    #[test]
    fn test_f16_output_routes_through_the_codec() -> Result<(), PreprocessError> {
        let image = solid_image(2, 2, [255, 0, 0, 255]);
        let mut options = InputOptions::new([1, 2, 2, 3], Layout::Nhwc);
        options.element_type = ElementType::F16;

        let tensor = input_to_tensor(&image, &options)?;
        match tensor.data() {
            TensorData::F16(values) => {
                assert_eq!(values[0], to_half(255.0));
                assert_eq!(values[1], to_half(0.0));
            }
            other => panic!("expected f16 data, got {}", other.element_type()),
        }
        Ok(())
    }

    #[test]
    fn test_resampling_to_target_dimensions() -> Result<(), PreprocessError> {
        // Solid color survives any resampling filter untouched.
        let image = solid_image(64, 48, [0, 128, 0, 255]);
        let options = InputOptions::new([1, 3, 8, 8], Layout::Nchw);

        let values = f32_data(input_to_tensor(&image, &options)?);
        assert_eq!(values.len(), 3 * 8 * 8);
        assert!(values[64..128].iter().all(|&value| value == 128.0));
        Ok(())
    }

    #[test]
    fn test_scaled_flag_letterboxes_with_zeros() -> Result<(), PreprocessError> {
        // A wide source downscaled with preserved aspect ratio leaves the
        // bottom rows of the square raster empty.
        let image = solid_image(16, 8, [255, 255, 255, 255]);
        let mut options = InputOptions::new([1, 3, 8, 8], Layout::Nchw);
        options.scaled = true;

        let values = f32_data(input_to_tensor(&image, &options)?);
        // Top-left pixel is covered by the scaled frame, bottom-left is not.
        assert_eq!(values[0], 255.0);
        assert_eq!(values[7 * 8], 0.0);
        Ok(())
    }

    #[test]
    fn test_crop_region() -> Result<(), PreprocessError> {
        let mut source = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        for y in 0..2 {
            for x in 0..2 {
                source.put_pixel(x, y, Rgba([200, 0, 0, 255]));
            }
        }
        let image = DynamicImage::ImageRgba8(source);
        let mut options = InputOptions::new([1, 3, 2, 2], Layout::Nchw);
        options.crop = Some(CropRegion {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
        });

        let values = f32_data(input_to_tensor(&image, &options)?);
        assert!(values[0..4].iter().all(|&value| value == 200.0));
        Ok(())
    }

    #[test]
    fn test_invalid_options_fail_fast() {
        let image = solid_image(2, 2, [255, 0, 0, 255]);

        let options = InputOptions::new([2, 3, 2, 2], Layout::Nchw);
        assert!(matches!(
            input_to_tensor(&image, &options),
            Err(PreprocessError::BadBatch(2))
        ));

        let options = InputOptions::new([1, 3, 0, 2], Layout::Nchw);
        assert!(matches!(
            input_to_tensor(&image, &options),
            Err(PreprocessError::ZeroDimension(_))
        ));

        let options = InputOptions::new([1, 5, 2, 2], Layout::Nchw);
        assert!(matches!(
            input_to_tensor(&image, &options),
            Err(PreprocessError::TooManyChannels(5))
        ));

        let mut options = InputOptions::new([1, 3, 2, 2], Layout::Nchw);
        options.std = [1.0, 0.0, 1.0, 1.0];
        assert!(matches!(
            input_to_tensor(&image, &options),
            Err(PreprocessError::ZeroStd(1))
        ));

        let mut options = InputOptions::new([1, 3, 2, 2], Layout::Nchw);
        options.element_type = ElementType::I32;
        assert!(matches!(
            input_to_tensor(&image, &options),
            Err(PreprocessError::BadElementType(ElementType::I32))
        ));
    }
}
