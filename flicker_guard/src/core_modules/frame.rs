// THEORY:
// A `Frame` is one immutable, downsampled snapshot of the screen, tagged with the moment
// it was captured. Frame sources produce them, the metric engine reads them, and the
// monitor loop keeps at most one previous frame alive at a time.
//
// The conversion from a raw capture (any size, any pixel format) to a `Frame` happens
// here so that every source shares the same crop-then-resize behaviour: the capture is
// cropped to the configured region, clamped to whatever the backend actually returned,
// and resized with a Lanczos3 filter to the configured resolution.

use crate::config::{CaptureRegion, Resolution};
use crate::core_modules::pixel::pixel::Pixel;
use crate::error::{CaptureError, FrameError};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbImage};
use std::time::Instant;

const CHANNELS: usize = 3;

/// An immutable RGB sample of the screen.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
    /// When the frame was captured.
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: Instant) -> Self {
        Self { image, captured_at }
    }

    /// Builds a frame from a tightly packed RGB buffer.
    pub fn from_rgb_bytes(
        width: u32,
        height: u32,
        bytes: Vec<u8>,
        captured_at: Instant,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * CHANNELS;
        let actual = bytes.len();
        let image = RgbImage::from_raw(width, height, bytes)
            .ok_or(FrameError::BufferLength { expected, actual })?;
        Ok(Self::new(image, captured_at))
    }

    /// A frame where every pixel has the same color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], captured_at: Instant) -> Self {
        Self::new(RgbImage::from_pixel(width, height, image::Rgb(rgb)), captured_at)
    }

    /// Crops a raw capture to `region` and downsamples it to `resolution`.
    pub fn from_capture(
        capture: &DynamicImage,
        region: &CaptureRegion,
        resolution: Resolution,
        captured_at: Instant,
    ) -> Result<Self, CaptureError> {
        let (capture_width, capture_height) = capture.dimensions();
        if capture_width == 0
            || capture_height == 0
            || region.x >= capture_width
            || region.y >= capture_height
        {
            return Err(CaptureError::EmptyFrame);
        }

        let crop_width = region.width.min(capture_width - region.x);
        let crop_height = region.height.min(capture_height - region.y);
        if crop_width == 0 || crop_height == 0 {
            return Err(CaptureError::EmptyFrame);
        }

        let rgb = capture
            .crop_imm(region.x, region.y, crop_width, crop_height)
            .to_rgb8();
        let resized = if rgb.dimensions() == (resolution.width, resolution.height) {
            rgb
        } else {
            imageops::resize(&rgb, resolution.width, resolution.height, FilterType::Lanczos3)
        };
        Ok(Self::new(resized, captured_at))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Iterates pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.image.as_raw().chunks_exact(CHANNELS).map(Pixel::from)
    }

    /// Fails unless the frame has exactly the configured dimensions.
    pub fn ensure_resolution(&self, resolution: Resolution) -> Result<(), FrameError> {
        let expected = (resolution.width, resolution.height);
        let actual = self.dimensions();
        if actual != expected {
            return Err(FrameError::Geometry { expected, actual });
        }
        Ok(())
    }
}
