//! Reprojection of a distorted camera image into a rectilinear one.
//!
//! Each destination pixel is turned into a ray slope, pushed through the
//! device camera model to find where that ray lands in the raw image, and
//! sampled nearest-neighbour from there.

use crate::backend::{Perspective, Projection};
use crate::types::{Image, StereoImageEvent, Vector3};
use crate::{LeapError, Result};

/// Borrowed single-channel 8-bit image.
#[derive(Debug, Clone, Copy)]
pub struct ImageRef<'a> {
    width: usize,
    height: usize,
    data: &'a [u8],
}

impl<'a> ImageRef<'a> {
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Result<Self> {
        let expected = width.checked_mul(height);
        if expected.map_or(true, |n| data.len() < n) {
            return Err(LeapError::InvalidImageSize {
                width,
                height,
                expected: expected.unwrap_or(usize::MAX),
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// View of a raw camera image. Only 1 byte per pixel is supported.
    pub fn from_image(image: &'a Image) -> Result<Self> {
        if image.properties.bpp != 1 {
            return Err(LeapError::UnsupportedPixelFormat(image.properties.bpp));
        }
        Self::new(
            image.properties.width as usize,
            image.properties.height as usize,
            &image.data,
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

/// Output geometry of the rectified image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectifyParams {
    pub width: usize,
    pub height: usize,
    /// Span of ray slopes covered by the output, centred on the optical axis.
    pub fov: f32,
    /// Value written where the ray falls outside the source image.
    pub fill: u8,
}

impl Default for RectifyParams {
    fn default() -> Self {
        Self {
            width: 384,
            height: 384,
            fov: 8.0,
            fill: 128,
        }
    }
}

/// Single-channel rectified image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RectifiedImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RectifiedImage {
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Binary PGM (P5) encoding.
    pub fn to_pgm(&self) -> Vec<u8> {
        let mut out = format!("P5\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.data);
        out
    }
}

/// Ray slope for destination pixel `index` along an axis of `size` pixels.
fn ray_slope(index: usize, size: usize, fov: f32) -> f32 {
    let normalized = index as f32 / size as f32;
    ((normalized as f64 - 0.5) * fov as f64) as f32
}

/// Rectify `src` as seen from `perspective` through `projection`.
///
/// The projection is queried exactly once per destination pixel and the
/// source is only read in bounds.
pub fn rectify<P>(
    src: &ImageRef<'_>,
    projection: &P,
    perspective: Perspective,
    params: &RectifyParams,
) -> RectifiedImage
where
    P: Projection + ?Sized,
{
    let mut data = vec![params.fill; params.width * params.height];
    if src.width == 0 || src.height == 0 {
        return RectifiedImage {
            width: params.width,
            height: params.height,
            data,
        };
    }
    let src_w = src.width as f32;
    let src_h = src.height as f32;

    for (row, dst_row) in data.chunks_exact_mut(params.width.max(1)).enumerate() {
        let ray_y = ray_slope(row, params.height, params.fov);
        for (col, dst) in dst_row.iter_mut().enumerate() {
            let ray = Vector3::new(ray_slope(col, params.width, params.fov), ray_y, 0.0);
            let pixel = projection.rectilinear_to_pixel(perspective, ray);

            if pixel.x >= 0.0 && pixel.x < src_w && pixel.y >= 0.0 && pixel.y < src_h {
                // rounding can land on the far edge
                let x = (pixel.x.round() as usize).min(src.width - 1);
                let y = (pixel.y.round() as usize).min(src.height - 1);
                *dst = src.get(x, y);
            }
        }
    }

    RectifiedImage {
        width: params.width,
        height: params.height,
        data,
    }
}

/// Rectify both cameras of a stereo event.
pub fn rectify_stereo<P>(
    event: &StereoImageEvent,
    projection: &P,
    params: &RectifyParams,
) -> Result<(RectifiedImage, RectifiedImage)>
where
    P: Projection + ?Sized,
{
    let left = ImageRef::from_image(&event.left)?;
    let right = ImageRef::from_image(&event.right)?;
    Ok((
        rectify(&left, projection, Perspective::StereoLeft, params),
        rectify(&right, projection, Perspective::StereoRight, params),
    ))
}
