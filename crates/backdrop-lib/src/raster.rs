// SPDX-License-Identifier: MPL-2.0

//! Decoded raster images and the DPI they were authored at.

use eyre::{Context, eyre};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// Display DPI at which one image pixel covers one device-independent pixel.
pub const STANDARD_DPI: f64 = 96.0;

const METERS_PER_INCH: f64 = 0.0254;

/// A decoded RGBA pixel buffer plus the resolution its source declared.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: RgbaImage,
    dpi_x: f64,
    dpi_y: f64,
}

impl RasterImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self::with_dpi(pixels, STANDARD_DPI, STANDARD_DPI)
    }

    /// Non-positive or non-finite DPI values are treated as [`STANDARD_DPI`].
    pub fn with_dpi(pixels: RgbaImage, dpi_x: f64, dpi_y: f64) -> Self {
        let sane = |dpi: f64| {
            if dpi.is_finite() && dpi > 0.0 {
                dpi
            } else {
                STANDARD_DPI
            }
        };
        Self {
            pixels,
            dpi_x: sane(dpi_x),
            dpi_y: sane(dpi_y),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn dpi(&self) -> (f64, f64) {
        (self.dpi_x, self.dpi_y)
    }

    /// Size the host would draw the image at, in device-independent pixels.
    pub fn display_size(&self) -> (f64, f64) {
        let (width, height) = self.pixel_size();
        (
            f64::from(width) * STANDARD_DPI / self.dpi_x,
            f64::from(height) * STANDARD_DPI / self.dpi_y,
        )
    }

    /// Whether the display size differs from the pixel grid.
    pub fn needs_dpi_normalization(&self) -> bool {
        let (width, height) = self.pixel_size();
        let (display_width, display_height) = self.display_size();
        (display_width - f64::from(width)).abs() >= 0.5
            || (display_height - f64::from(height)).abs() >= 0.5
    }
}

/// Reads and decodes an image file.
pub fn decode_file(path: &Path) -> eyre::Result<RasterImage> {
    let bytes = std::fs::read(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("jxl")) {
        return decode_jpegxl(&bytes);
    }

    let format = image::guess_format(&bytes)
        .ok()
        .or_else(|| ImageFormat::from_path(path).ok());
    decode_bytes(&bytes, format)
}

pub fn decode_bytes(bytes: &[u8], format: Option<ImageFormat>) -> eyre::Result<RasterImage> {
    let image = match format {
        Some(format) => image::load_from_memory_with_format(bytes, format),
        None => image::load_from_memory(bytes),
    }
    .wrap_err("failed to decode image")?;

    let (dpi_x, dpi_y) = format
        .and_then(|format| source_dpi(bytes, format))
        .unwrap_or((STANDARD_DPI, STANDARD_DPI));

    Ok(RasterImage::with_dpi(image.to_rgba8(), dpi_x, dpi_y))
}

fn decode_jpegxl(bytes: &[u8]) -> eyre::Result<RasterImage> {
    use jxl_oxide::integration::JxlDecoder;

    let decoder = JxlDecoder::new(Cursor::new(bytes))?;
    let image = image::DynamicImage::from_decoder(decoder)?;
    Ok(RasterImage::new(image.to_rgba8()))
}

fn source_dpi(bytes: &[u8], format: ImageFormat) -> Option<(f64, f64)> {
    match format {
        ImageFormat::Png => png_dpi(bytes),
        ImageFormat::Jpeg => jfif_dpi(bytes),
        _ => None,
    }
}

/// Resolution from the PNG `pHYs` chunk, if it is given in meters.
fn png_dpi(bytes: &[u8]) -> Option<(f64, f64)> {
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    let dims = reader.info().pixel_dims?;
    if dims.unit != png::Unit::Meter || dims.xppu == 0 || dims.yppu == 0 {
        return None;
    }
    Some((
        f64::from(dims.xppu) * METERS_PER_INCH,
        f64::from(dims.yppu) * METERS_PER_INCH,
    ))
}

/// Resolution from a JFIF APP0 segment right after the SOI marker.
fn jfif_dpi(bytes: &[u8]) -> Option<(f64, f64)> {
    // SOI, APP0 marker, length (2), "JFIF\0", version (2), units, x, y
    if bytes.len() < 18 || bytes[..4] != [0xFF, 0xD8, 0xFF, 0xE0] || &bytes[6..11] != b"JFIF\0" {
        return None;
    }
    let x = f64::from(u16::from_be_bytes([bytes[14], bytes[15]]));
    let y = f64::from(u16::from_be_bytes([bytes[16], bytes[17]]));
    if x == 0.0 || y == 0.0 {
        return None;
    }
    match bytes[13] {
        1 => Some((x, y)),
        2 => Some((x * 2.54, y * 2.54)),
        _ => None,
    }
}

/// Error for a decode that produced no pixels.
pub(crate) fn empty_image(path: &Path) -> eyre::Report {
    eyre!("{} decoded to an empty image", path.display())
}
