// SPDX-License-Identifier: MPL-2.0

//! Post-decode pipeline turning a decoded raster into a display-ready one.

use crate::raster::{RasterImage, STANDARD_DPI};
use backdrop_config::{Setting, Stretch};
use image::RgbaImage;

/// Runs the full pipeline for a decoded image file.
///
/// DPI normalization and size caps only apply to [`Stretch::None`]; edge
/// softening applies to every stretch mode.
pub fn prepare(image: RasterImage, setting: &Setting) -> RasterImage {
    let mut image = image;

    if setting.stretch == Stretch::None {
        if image.needs_dpi_normalization() {
            image = normalize_dpi(image);
        }
        image = clamp_size(image, setting.max_width, setting.max_height);
    }

    soften_edges(image, setting.soft_edge_x, setting.soft_edge_y)
}

/// Pipeline for rendered text. The text raster is always produced at
/// [`STANDARD_DPI`] and is never size capped.
pub fn prepare_text(image: RasterImage, setting: &Setting) -> RasterImage {
    soften_edges(image, setting.soft_edge_x, setting.soft_edge_y)
}

/// Re-tags the pixel grid as 96 DPI so that it is drawn one pixel per
/// device-independent pixel. The pixels themselves are unchanged.
pub fn normalize_dpi(image: RasterImage) -> RasterImage {
    RasterImage::with_dpi(image.into_pixels(), STANDARD_DPI, STANDARD_DPI)
}

/// Scales the image down, keeping its aspect ratio, so that it fits within
/// `max_width` x `max_height`. A zero bound means unbounded.
pub fn clamp_size(image: RasterImage, max_width: u32, max_height: u32) -> RasterImage {
    let (width, height) = image.pixel_size();
    let Some((new_width, new_height)) = clamped_dimensions(width, height, max_width, max_height)
    else {
        return image;
    };

    tracing::debug!(width, height, new_width, new_height, "clamping image size");
    let (dpi_x, dpi_y) = image.dpi();
    RasterImage::with_dpi(
        resize(image.into_pixels(), new_width, new_height),
        dpi_x,
        dpi_y,
    )
}

/// Target size for [`clamp_size`], or `None` when the image already fits.
pub fn clamped_dimensions(
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }

    let mut scale = 1.0_f64;
    if max_width > 0 && width > max_width {
        scale = scale.min(f64::from(max_width) / f64::from(width));
    }
    if max_height > 0 && height > max_height {
        scale = scale.min(f64::from(max_height) / f64::from(height));
    }
    if scale >= 1.0 {
        return None;
    }

    let scaled = |value: u32| ((f64::from(value) * scale).round() as u32).max(1);
    Some((scaled(width), scaled(height)))
}

fn resize(pixels: RgbaImage, new_width: u32, new_height: u32) -> RgbaImage {
    use fast_image_resize::{FilterType, ResizeAlg, ResizeOptions, Resizer};

    let source = image::DynamicImage::ImageRgba8(pixels);
    let mut resizer = Resizer::new();
    let options = ResizeOptions {
        algorithm: ResizeAlg::Convolution(FilterType::Lanczos3),
        ..Default::default()
    };

    let mut resized = image::DynamicImage::new(new_width, new_height, source.color());

    if resizer.resize(&source, &mut resized, &options).is_err() {
        // Fallback to standard resize
        return image::imageops::resize(
            &source,
            new_width,
            new_height,
            image::imageops::FilterType::Lanczos3,
        );
    }

    resized.to_rgba8()
}

/// Fades alpha towards the borders over `radius_x` columns on the left and
/// right and `radius_y` rows at the top and bottom. Zero radii leave the image
/// untouched.
pub fn soften_edges(image: RasterImage, radius_x: u32, radius_y: u32) -> RasterImage {
    if radius_x == 0 && radius_y == 0 {
        return image;
    }

    let (dpi_x, dpi_y) = image.dpi();
    let mut pixels = image.into_pixels();
    let (width, height) = pixels.dimensions();

    let ramp = |position: u32, extent: u32, radius: u32| -> f32 {
        if radius == 0 {
            return 1.0;
        }
        let distance = position.min(extent - 1 - position);
        (distance as f32 / radius as f32).min(1.0)
    };

    for (x, y, pixel) in pixels.enumerate_pixels_mut() {
        let factor = ramp(x, width, radius_x) * ramp(y, height, radius_y);
        if factor < 1.0 {
            pixel.0[3] = (f32::from(pixel.0[3]) * factor).round() as u8;
        }
    }

    RasterImage::with_dpi(pixels, dpi_x, dpi_y)
}
