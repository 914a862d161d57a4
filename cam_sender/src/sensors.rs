//! Sensors module.
//!
//! The samples accept either a live camera or a still image as input; both
//! are expressed as sources of JPEG-encoded frames.
use std::{io::Cursor, path::Path, pin::Pin, time::Duration};

use bytes::Bytes;
use futures_core::{
    task::{Context, Poll},
    Stream,
};
use rscam::{Camera, Config};
use simple_error::simple_error;

use crate::Error;

/// A source of JPEG-encoded frames.
pub trait FrameSource {
    /// Next frame, or `None` when the source is exhausted.
    fn frame(&mut self) -> Option<Vec<u8>>;
}

/// Live V4L2 camera on a Linux machine.
pub struct CameraSource {
    cam: Camera,
}

impl CameraSource {
    /// Open a camera device, picking the highest supported resolution and
    /// frame rate unless given explicitly.
    pub fn open(
        device: &str,
        format: &str,
        resolution: Option<(u32, u32)>,
        frame_rate: Option<(u32, u32)>,
    ) -> Result<CameraSource, Error> {
        let mut cam = Camera::new(device)?;
        let format = format.as_bytes();
        log_supported_formats(&cam, format);

        log::info!("Using camera {}", device);

        let resolution = resolution
            .map(Ok)
            .unwrap_or_else(|| max_resolution(&cam, format))?;

        let frame_rate = frame_rate
            .map(Ok)
            .unwrap_or_else(|| max_frame_rate(&cam, format, resolution))?;

        cam.start(&Config {
            interval: frame_rate,
            resolution,
            format,
            ..Default::default()
        })?;

        Ok(CameraSource { cam })
    }
}

impl FrameSource for CameraSource {
    fn frame(&mut self) -> Option<Vec<u8>> {
        self.cam.capture().ok().map(|frame| frame[..].to_vec())
    }
}

/// Replays a still image as a frame stream: the image-input mode of the
/// samples.
pub struct StillImageSource {
    jpeg: Vec<u8>,
    interval: Duration,
}

impl StillImageSource {
    /// Load an image file and re-encode it as JPEG once; every emitted
    /// frame replays that buffer.
    pub fn open(path: &Path, interval: Duration) -> Result<StillImageSource, Error> {
        let image = image::open(path)?.to_rgb8();
        let mut jpeg = Cursor::new(Vec::new());
        image.write_to(&mut jpeg, image::ImageOutputFormat::Jpeg(95))?;

        log::info!("Replaying {} every {:?}", path.display(), interval);
        Ok(StillImageSource {
            jpeg: jpeg.into_inner(),
            interval,
        })
    }
}

impl FrameSource for StillImageSource {
    fn frame(&mut self) -> Option<Vec<u8>> {
        // Throttle to the configured frame interval.
        std::thread::sleep(self.interval);
        Some(self.jpeg.clone())
    }
}

/// Initialized, streamable frame source.
pub struct StreamableSource {
    source: Box<dyn FrameSource + Send>,
}

impl StreamableSource {
    /// Create a new instance.
    pub fn new(source: Box<dyn FrameSource + Send>) -> StreamableSource {
        StreamableSource { source }
    }

    /// Capture a frame.
    pub fn capture(&mut self) -> Option<Vec<u8>> {
        self.source.frame()
    }
}

impl Stream for StreamableSource {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().source.frame() {
            Some(frame) => {
                // Append `\n\n` to mark the end of a frame
                let body = Bytes::copy_from_slice(&[&frame[..], "\n\n".as_bytes()].concat());

                log::debug!("Streaming... ({} bytes)", body.len());

                Poll::Ready(Some(Ok(body)))
            }
            None => {
                log::error!("Error capturing frame");
                Poll::Ready(None)
            }
        }
    }
}

/// Get the maximum supported resolution for the given format.
fn max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32), Error> {
    let resolution_info = cam.resolutions(format)?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    match resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions
            .iter()
            // Highest resolution in terms of number of pixels
            .max_by_key(|resolution| resolution.0 * resolution.1)
            .copied(),
        rscam::ResolutionInfo::Stepwise { max, .. } => Some(max),
    }
    .ok_or_else(|| simple_error!("No resolution found").into())
}

/// Get the maximum supported frame rate for the given format and resolution.
fn max_frame_rate(
    cam: &Camera,
    format: &[u8],
    resolution: (u32, u32),
) -> Result<(u32, u32), Error> {
    let interval_info = cam.intervals(format, resolution)?;
    log::debug!("Found frame rates: {:?}", &interval_info);
    match interval_info {
        // Intervals are (denominator, numerator) pairs.
        rscam::IntervalInfo::Discretes(frame_rates) => frame_rates
            .iter()
            .max_by_key(|(denominator, numerator)| numerator / denominator)
            .copied(),
        rscam::IntervalInfo::Stepwise { max, .. } => Some(max),
    }
    .ok_or_else(|| simple_error!("No frame rate found").into())
}

fn log_supported_formats(cam: &Camera, format: &[u8]) {
    let formats: Vec<_> = cam.formats().filter_map(|format| format.ok()).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        format
    );
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_still_image_source_yields_jpeg_frames() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("frame.png");
        image::RgbImage::from_pixel(8, 8, image::Rgb([10, 200, 30])).save(&path)?;

        let mut source = StillImageSource::open(&path, Duration::from_millis(1))?;

        let first = source.frame().expect("first frame");
        // JPEG start-of-image marker
        assert_eq!(&first[..2], &[0xff, 0xd8]);

        let second = source.frame().expect("second frame");
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_streamable_source_appends_frame_marker() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("frame.png");
        image::RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 255])).save(&path)?;

        let source = StillImageSource::open(&path, Duration::from_millis(1))?;
        let mut streamable = StreamableSource::new(Box::new(source));

        let frame = streamable.capture().expect("captured frame");
        assert!(!frame.ends_with(b"\n\n"));
        Ok(())
    }

    #[test]
    fn get_cam_info_if_available() -> Result<(), Error> {
        let cam_name = "/dev/video0";
        let cam = Camera::new(cam_name);

        match cam {
            Err(err) => println!("Could not initialize camera (maybe none available): {err}"),
            Ok(cam) => {
                let formats: Vec<_> = cam.formats().collect();
                println!("Supported formats: {formats:?}");

                let format = b"MJPG";

                let selected_resolution = max_resolution(&cam, format)?;
                println!("Selected resolution: {selected_resolution:?}");

                let frame_rate = max_frame_rate(&cam, format, selected_resolution)?;
                println!("Selected frame rate: {frame_rate:?}");
            }
        }

        Ok(())
    }
}
