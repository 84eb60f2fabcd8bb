// SPDX-License-Identifier: MPL-2.0

//! Renders the configured text into an image.

use super::LoadJob;
use backdrop_config::{Scope, Setting, resolve_path};
use eyre::{Context, eyre};
use fontdue::{Font, FontSettings};
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// Colour of rendered glyphs. The background stays transparent.
pub const TEXT_COLOR: [u8; 3] = [211, 211, 211];

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\segoeui.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct TextImage;

impl TextImage {
    /// Font discovery and rasterization both happen on the loader.
    pub fn plan(&self, setting: &Setting, scope: &Scope, base_dir: &Path) -> LoadJob {
        LoadJob::Text {
            font: configured_font(&setting.font_path, scope, base_dir),
            setting: setting.clone(),
        }
    }
}

/// The font named by the record, if any.
pub fn configured_font(configured: &str, scope: &Scope, base_dir: &Path) -> Option<PathBuf> {
    if configured.trim().is_empty() {
        return None;
    }
    Some(resolve_path(configured, scope.directory(), base_dir))
}

/// The first usable system font. Looked up once per process.
pub fn system_font() -> Option<&'static Path> {
    static FONT: OnceLock<Option<PathBuf>> = OnceLock::new();
    FONT.get_or_init(discover_system_font).as_deref()
}

fn discover_system_font() -> Option<PathBuf> {
    if let Some(path) = FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
    {
        return Some(path);
    }

    let mut roots = Vec::new();
    roots.extend(dirs::font_dir());
    roots.push(PathBuf::from("/usr/share/fonts"));

    let found = roots.iter().find_map(|root| {
        let mut fonts: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("ttf"))
            })
            .collect();
        fonts.sort();
        fonts.into_iter().next()
    });

    match &found {
        Some(path) => tracing::debug!(path = %path.display(), "using system font"),
        None => tracing::warn!("no font available for text backgrounds"),
    }
    found
}

/// Rasterizes `text` at `size` pixels per em. Each line of `text` becomes a
/// line of the image, so whitespace yields a transparent box of its extent.
/// Returns `None` when there is nothing to draw.
pub fn render(text: &str, size: f32, font: &Path) -> eyre::Result<Option<RgbaImage>> {
    if text.is_empty() || !size.is_finite() || size <= 0.0 {
        return Ok(None);
    }

    let data =
        std::fs::read(font).wrap_err_with(|| format!("failed to read font {}", font.display()))?;
    let font = Font::from_bytes(data, FontSettings::default())
        .map_err(|why| eyre!("failed to parse font: {why}"))?;

    let (ascent, line_height) = match font.horizontal_line_metrics(size) {
        Some(metrics) => (metrics.ascent, metrics.new_line_size),
        None => (size, size),
    };

    struct Glyph {
        x: i32,
        y: i32,
        width: usize,
        height: usize,
        coverage: Vec<u8>,
    }

    let mut glyphs = Vec::new();
    let mut width = 0.0f32;
    let mut lines = 0usize;

    for (index, line) in text.lines().enumerate() {
        lines = index + 1;
        let baseline = index as f32 * line_height + ascent;
        let mut pen = 0.0f32;
        for ch in line.chars() {
            let (metrics, coverage) = font.rasterize(ch, size);
            glyphs.push(Glyph {
                x: pen.round() as i32 + metrics.xmin,
                y: baseline.round() as i32 - (metrics.height as i32 + metrics.ymin),
                width: metrics.width,
                height: metrics.height,
                coverage,
            });
            pen += metrics.advance_width;
        }
        width = width.max(pen);
    }

    let width = width.ceil() as u32;
    let height = (lines as f32 * line_height).ceil() as u32;
    if width == 0 || height == 0 {
        return Ok(None);
    }

    let [r, g, b] = TEXT_COLOR;
    let mut pixels = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 0]));

    for glyph in &glyphs {
        for row in 0..glyph.height {
            for col in 0..glyph.width {
                let x = glyph.x + col as i32;
                let y = glyph.y + row as i32;
                if x < 0 || y < 0 || x as u32 >= width || y as u32 >= height {
                    continue;
                }
                let alpha = glyph.coverage[row * glyph.width + col];
                let pixel = pixels.get_pixel_mut(x as u32, y as u32);
                pixel.0[3] = pixel.0[3].max(alpha);
            }
        }
    }

    tracing::debug!(width, height, lines, "rendered text image");
    Ok(Some(pixels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::tests::{inline_env, store_in};
    use crate::provider::{ImageProvider, Provider, ProviderId};
    use backdrop_config::BackgroundKind;

    #[test]
    fn empty_text_renders_nothing() {
        let missing = Path::new("/nonexistent/font.ttf");
        assert!(render("", 32.0, missing).unwrap().is_none());
        assert!(render("hello", 0.0, missing).unwrap().is_none());
    }

    fn line_height(font: &Path, size: f32) -> u32 {
        let data = std::fs::read(font).unwrap();
        let font = Font::from_bytes(data, FontSettings::default()).unwrap();
        let metrics = font.horizontal_line_metrics(size).unwrap();
        metrics.new_line_size.ceil() as u32
    }

    #[test]
    fn text_renders_to_one_line_per_row() {
        let Some(font) = system_font() else {
            return;
        };

        let one = render("Hi", 32.0, font).unwrap().unwrap();
        assert!(one.width() > 0);
        assert_eq!(one.height(), line_height(font, 32.0));
        assert!(one.pixels().any(|pixel| pixel.0[3] > 0));
        assert!(one.pixels().all(|pixel| pixel.0[..3] == TEXT_COLOR));

        let two = render("Hi\nthere", 32.0, font).unwrap().unwrap();
        assert!(two.height() > one.height());
    }

    #[test]
    fn whitespace_renders_transparent_box() {
        let Some(font) = system_font() else {
            return;
        };

        let image = render("   ", 32.0, font).unwrap().unwrap();
        assert!(image.width() > 0);
        assert_eq!(image.height(), line_height(font, 32.0));
        assert!(image.pixels().all(|pixel| pixel.0[3] == 0));
    }

    #[test]
    fn plan_defers_font_lookup_to_the_loader() {
        let setting = Setting::default();
        let job = TextImage.plan(&setting, &Scope::Global, Path::new("/opt"));
        assert!(matches!(job, LoadJob::Text { font: None, .. }));
    }

    #[test]
    fn unreadable_font_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("broken.ttf");
        std::fs::write(&font, b"not a font").unwrap();

        assert!(render("hello", 24.0, &font).is_err());
        assert!(render("hello", 24.0, &dir.path().join("missing.ttf")).is_err());
    }

    #[test]
    fn configured_font_resolves_against_workspace() {
        let scope = Scope::workspace("/ws/.backdrop.ron");
        let font = configured_font("$profileFolder/fonts/a.ttf", &scope, Path::new("/opt"));
        assert_eq!(font, Some(PathBuf::from("/ws/fonts/a.ttf")));
        assert_eq!(configured_font("  ", &scope, Path::new("/opt")), None);
    }

    #[test]
    fn provider_with_bad_font_has_no_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let entry = store.global();
        entry.update(|setting| {
            setting.kind = BackgroundKind::TextImage;
            setting.text = "hello".into();
            setting.font_path = "missing.ttf".into();
        });

        let provider = Provider::new(
            ProviderId(0),
            BackgroundKind::TextImage,
            Scope::Global,
            entry,
            inline_env(dir.path()),
        );

        assert!(provider.current_image().is_none());
        assert_eq!(provider.kind(), BackgroundKind::TextImage);
    }
}
