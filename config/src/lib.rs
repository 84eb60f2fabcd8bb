// SPDX-License-Identifier: MPL-2.0

//! Configuration records for the backdrop engine.
//!
//! One [`Setting`] exists per [`Scope`]: the global record, plus one record per
//! workspace document that has been opened. Records live in a [`SettingsStore`]
//! which owns the durable documents and the change notification channel.

pub mod error;
pub mod host;
pub mod notifier;
pub mod path;
pub mod scope;
pub mod store;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use error::Error;
pub use host::{MapProperties, PropertySource, PropertyValue};
pub use notifier::{Notifier, Subscription};
pub use path::{PROFILE_FOLDER_TOKEN, resolve_path};
pub use scope::{Scope, locate_workspace_document};
pub use store::{SettingEntry, SettingsStore, StoreConfig, read_document, write_document};

pub const NAME: &str = "backdrop";

/// File name of the global document inside the configuration directory.
pub const GLOBAL_DOCUMENT: &str = "config.ron";

/// File name of a workspace document.
pub const WORKSPACE_DOCUMENT: &str = ".backdrop.ron";

pub const DEFAULT_IMAGE: &str = "Images/background.png";
pub const DEFAULT_IMAGE_DIRECTORY: &str = "Images";

/// Which provider variant draws the background.
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackgroundKind {
    #[default]
    Single,
    Slideshow,
    SingleEach,
    TextImage,
}

impl BackgroundKind {
    /// Every variant, in registry construction order.
    pub const ALL: [BackgroundKind; 4] = [
        BackgroundKind::Single,
        BackgroundKind::SingleEach,
        BackgroundKind::Slideshow,
        BackgroundKind::TextImage,
    ];
}

impl TryFrom<i64> for BackgroundKind {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Single),
            1 => Ok(Self::Slideshow),
            2 => Ok(Self::SingleEach),
            3 => Ok(Self::TextImage),
            other => Err(other),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HorizontalAnchor {
    Left,
    #[default]
    Right,
    Center,
}

impl TryFrom<i64> for HorizontalAnchor {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Left),
            1 => Ok(Self::Right),
            2 => Ok(Self::Center),
            other => Err(other),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerticalAnchor {
    Top,
    #[default]
    Bottom,
    Center,
}

impl TryFrom<i64> for VerticalAnchor {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Top),
            1 => Ok(Self::Bottom),
            2 => Ok(Self::Center),
            other => Err(other),
        }
    }
}

/// How the host scales the image onto its surface.
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stretch {
    /// Draw at the image's natural size. Only this mode normalizes DPI and
    /// honours the size caps.
    #[default]
    None,
    Uniform,
    UniformToFill,
    Fill,
}

impl TryFrom<i64> for Stretch {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Uniform),
            2 => Ok(Self::UniformToFill),
            3 => Ok(Self::Fill),
            other => Err(other),
        }
    }
}

/// A background configuration record.
///
/// Path fields hold the raw text the user typed: they may be relative or
/// contain [`PROFILE_FOLDER_TOKEN`], and are only resolved when an image is
/// actually loaded.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Setters)]
#[serde(default)]
#[setters(into)]
#[must_use]
pub struct Setting {
    pub kind: BackgroundKind,
    /// Image drawn by the single image variants.
    pub image_path: String,
    /// Directory the slideshow rotates through.
    pub image_directory: String,
    pub text: String,
    pub text_size: u32,
    /// TrueType font for the text variant. Empty selects a system font.
    pub font_path: String,
    pub opacity: f64,
    pub horizontal: HorizontalAnchor,
    pub vertical: VerticalAnchor,
    pub stretch: Stretch,
    /// Upper bound on the image width in pixels, 0 for none.
    pub max_width: u32,
    /// Upper bound on the image height in pixels, 0 for none.
    pub max_height: u32,
    pub soft_edge_x: u32,
    pub soft_edge_y: u32,
    /// Time between slideshow advances.
    pub reload_interval: Duration,
    pub fade_interval: Duration,
    /// Comma separated list of file suffixes the slideshow accepts.
    pub extensions: String,
    pub loop_slideshow: bool,
    pub shuffle_slideshow: bool,
    pub expand_to_host: bool,
    pub view_box_x: f64,
    pub view_box_y: f64,
    pub limit_to_editor: bool,
}

impl Default for Setting {
    fn default() -> Self {
        Self {
            kind: BackgroundKind::Single,
            image_path: DEFAULT_IMAGE.to_owned(),
            image_directory: DEFAULT_IMAGE_DIRECTORY.to_owned(),
            text: String::new(),
            text_size: 108,
            font_path: String::new(),
            opacity: 0.35,
            horizontal: HorizontalAnchor::Right,
            vertical: VerticalAnchor::Bottom,
            stretch: Stretch::None,
            max_width: 0,
            max_height: 0,
            soft_edge_x: 0,
            soft_edge_y: 0,
            reload_interval: Duration::from_secs(30 * 60),
            fade_interval: Duration::ZERO,
            extensions: ".png, .jpg".to_owned(),
            loop_slideshow: true,
            shuffle_slideshow: false,
            expand_to_host: false,
            view_box_x: 0.0,
            view_box_y: 0.0,
            limit_to_editor: false,
        }
    }
}

impl Setting {
    /// Parses a RON document. Absent fields take their default values.
    pub fn from_ron(document: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(document)
    }

    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Lowercased suffixes from [`Setting::extensions`].
    pub fn extension_list(&self) -> Vec<String> {
        self.extensions
            .split(',')
            .map(|ext| ext.trim().to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Whether `path` ends in one of the configured suffixes, ignoring case.
    pub fn matches_extension(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        let name = name.to_lowercase();
        self.extension_list()
            .iter()
            .any(|ext| name.ends_with(ext.as_str()))
    }

    pub fn resolved_image_path(&self, scope: &Scope, base_dir: &Path) -> PathBuf {
        let raw = if self.image_path.trim().is_empty() {
            DEFAULT_IMAGE
        } else {
            &self.image_path
        };
        resolve_path(raw, scope.directory(), base_dir)
    }

    pub fn resolved_image_directory(&self, scope: &Scope, base_dir: &Path) -> PathBuf {
        let raw = if self.image_directory.trim().is_empty() {
            DEFAULT_IMAGE_DIRECTORY
        } else {
            &self.image_directory
        };
        resolve_path(raw, scope.directory(), base_dir)
    }

    /// Slideshow interval, never shorter than one second.
    pub fn tick_interval(&self) -> Duration {
        self.reload_interval.max(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let setting = Setting::default();
        assert_eq!(setting.kind, BackgroundKind::Single);
        assert_eq!(setting.opacity, 0.35);
        assert_eq!(setting.horizontal, HorizontalAnchor::Right);
        assert_eq!(setting.vertical, VerticalAnchor::Bottom);
        assert_eq!(setting.stretch, Stretch::None);
        assert_eq!(setting.reload_interval, Duration::from_secs(1800));
        assert_eq!(setting.extension_list(), vec![".png", ".jpg"]);
        assert!(setting.loop_slideshow);
        assert!(!setting.shuffle_slideshow);
    }

    #[test]
    fn ron_round_trip_preserves_every_field() {
        let setting = Setting::default()
            .kind(BackgroundKind::Slideshow)
            .image_path("$profileFolder/bg.png")
            .image_directory("/srv/wallpapers")
            .text("hello")
            .text_size(42u32)
            .font_path("/fonts/a.ttf")
            .opacity(0.125)
            .horizontal(HorizontalAnchor::Center)
            .vertical(VerticalAnchor::Top)
            .stretch(Stretch::UniformToFill)
            .max_width(640u32)
            .max_height(480u32)
            .soft_edge_x(12u32)
            .soft_edge_y(3u32)
            .reload_interval(Duration::from_millis(1500))
            .fade_interval(Duration::from_secs(2))
            .extensions(".PNG,.webp")
            .loop_slideshow(false)
            .shuffle_slideshow(true)
            .expand_to_host(true)
            .view_box_x(0.1)
            .view_box_y(-3.75)
            .limit_to_editor(true);

        let document = setting.to_ron().unwrap();
        let parsed = Setting::from_ron(&document).unwrap();

        assert_eq!(parsed, setting);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed = Setting::from_ron("(kind: TextImage, text: \"hi\")").unwrap();

        assert_eq!(parsed.kind, BackgroundKind::TextImage);
        assert_eq!(parsed.text, "hi");
        assert_eq!(parsed.opacity, Setting::default().opacity);
        assert_eq!(parsed.extensions, Setting::default().extensions);
    }

    #[test]
    fn corrupt_document_is_an_error() {
        assert!(Setting::from_ron("(kind: Sideways").is_err());
    }

    #[test]
    fn extension_matching_ignores_case() {
        let setting = Setting::default().extensions(" .PNG , .Jpg,");
        assert!(setting.matches_extension(Path::new("/a/B.png")));
        assert!(setting.matches_extension(Path::new("c.JPG")));
        assert!(!setting.matches_extension(Path::new("d.gif")));
    }

    #[test]
    fn empty_image_path_uses_default_relative_to_base() {
        let setting = Setting::default().image_path("  ");
        let resolved = setting.resolved_image_path(&Scope::Global, Path::new("/opt/backdrop"));
        assert_eq!(resolved, Path::new("/opt/backdrop").join(DEFAULT_IMAGE));
    }

    #[test]
    fn integer_codes_map_to_enums() {
        assert_eq!(BackgroundKind::try_from(2), Ok(BackgroundKind::SingleEach));
        assert_eq!(Stretch::try_from(3), Ok(Stretch::Fill));
        assert_eq!(VerticalAnchor::try_from(2), Ok(VerticalAnchor::Center));
        assert_eq!(HorizontalAnchor::try_from(0), Ok(HorizontalAnchor::Left));
        assert!(BackgroundKind::try_from(9).is_err());
    }
}
