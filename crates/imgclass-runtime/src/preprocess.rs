//! Image to input-tensor conversion.
//!
//! Order matters: the image is center-cropped to a square first and only
//! then resampled to the model's input size, so content stays centered and
//! the aspect ratio is never distorted.

use std::borrow::Cow;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use imgclass_core::ClassifyError;
use ndarray::Array3;

/// Bicubic resampling.
pub const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputSize {
    pub height: u32,
    pub width: u32,
}

impl InputSize {
    /// Reads height and width from a `[batch, height, width, channels]` shape.
    ///
    /// The batch dimension is ignored. The channel dimension, when fixed,
    /// must be 3.
    pub fn from_shape(shape: &[Option<usize>]) -> Result<Self, ClassifyError> {
        let invalid = |reason| ClassifyError::InvalidInputShape {
            shape: shape.to_vec(),
            reason,
        };

        let [_, height, width, channels] = shape else {
            return Err(invalid("expected [batch, height, width, channels]"));
        };
        if !matches!(channels, None | Some(3)) {
            return Err(invalid("only 3-channel color input is supported"));
        }

        let side = |dim: &Option<usize>| match dim {
            Some(n) if *n > 0 => u32::try_from(*n).ok(),
            _ => None,
        };
        let (Some(height), Some(width)) = (side(height), side(width)) else {
            return Err(invalid("height and width must be fixed and non-zero"));
        };

        Ok(Self { height, width })
    }
}

/// Largest centered square inside a `width` x `height` image, as `(x, y, side)`.
pub fn center_square(width: u32, height: u32) -> (u32, u32, u32) {
    // Offsets are floored. Cropping a fractional box and rounding its edges
    // half-to-even lands one pixel further right/down on some odd margins.
    let side = width.min(height);
    ((width - side) / 2, (height - side) / 2, side)
}

/// Produces a `(height, width, 3)` array with values in `[0, 1]`.
pub fn preprocess(image: &DynamicImage, size: InputSize) -> Array3<f32> {
    let rgb: Cow<'_, RgbImage> = match image.as_rgb8() {
        Some(rgb) => Cow::Borrowed(rgb),
        None => Cow::Owned(image.to_rgb8()),
    };

    let (width, height) = rgb.dimensions();
    let square = if width != height {
        let (x, y, side) = center_square(width, height);
        Cow::Owned(imageops::crop_imm(&*rgb, x, y, side, side).to_image())
    } else {
        rgb
    };

    let resized = if square.dimensions() != (size.width, size.height) {
        Cow::Owned(imageops::resize(
            &*square,
            size.width,
            size.height,
            RESIZE_FILTER,
        ))
    } else {
        square
    };

    to_unit_range(&resized)
}

fn to_unit_range(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn(
        (height as usize, width as usize, 3),
        |(y, x, c)| {
            let value = image.get_pixel(x as u32, y as u32)[c];
            (f64::from(value) / 255.0) as f32
        },
    )
}
