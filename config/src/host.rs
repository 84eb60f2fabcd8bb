// SPDX-License-Identifier: MPL-2.0

//! Read-only property surface offered by the host editor.
//!
//! When the host keeps the global options itself, the global record is read
//! from it instead of from the global document.

use crate::{BackgroundKind, Error, HorizontalAnchor, Setting, Stretch, VerticalAnchor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Property category the host stores our options under.
pub const CATEGORY: &str = "Backdrop";

/// Property page inside [`CATEGORY`].
pub const PAGE: &str = "General";

pub const BACKGROUND_TYPE: &str = "ImageBackgroundType";
pub const IMAGE_PATH: &str = "BackgroundImageAbsolutePath";
pub const IMAGE_DIRECTORY: &str = "BackgroundImageDirectoryAbsolutePath";
pub const TEXT: &str = "BackgroundText";
pub const TEXT_SIZE: &str = "TextSize";
pub const FONT_PATH: &str = "FontPath";
pub const OPACITY: &str = "Opacity";
pub const POSITION_HORIZONTAL: &str = "PositionHorizon";
pub const POSITION_VERTICAL: &str = "PositionVertical";
pub const STRETCH: &str = "ImageStretch";
pub const UPDATE_INTERVAL: &str = "UpdateImageInterval";
pub const FADE_INTERVAL: &str = "ImageFadeAnimationInterval";
pub const EXTENSIONS: &str = "Extensions";
pub const LOOP_SLIDESHOW: &str = "LoopSlideshow";
pub const SHUFFLE_SLIDESHOW: &str = "ShuffleSlideshow";
pub const MAX_WIDTH: &str = "MaxWidth";
pub const MAX_HEIGHT: &str = "MaxHeight";
pub const SOFT_EDGE_X: &str = "SoftEdgeX";
pub const SOFT_EDGE_Y: &str = "SoftEdgeY";
pub const EXPAND_TO_HOST: &str = "ExpandToIDE";
pub const VIEW_BOX_X: &str = "ViewBoxPointX";
pub const VIEW_BOX_Y: &str = "ViewBoxPointY";
pub const LIMIT_TO_EDITOR: &str = "IsLimitToMainlyEditorWindow";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Flag(bool),
    Interval(Duration),
}

pub trait PropertySource {
    fn property(&self, category: &str, name: &str) -> Option<PropertyValue>;
}

/// In-memory property surface keyed by `category/page` and property name.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct MapProperties {
    pages: HashMap<String, HashMap<String, PropertyValue>>,
}

impl MapProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: &str, name: &str, value: PropertyValue) {
        self.pages
            .entry(category.to_owned())
            .or_default()
            .insert(name.to_owned(), value);
    }

    /// Properties describing `setting`, as the host's options page stores them.
    pub fn from_setting(setting: &Setting) -> Self {
        let category = page_key();
        let mut props = Self::new();
        let mut put = |name: &str, value: PropertyValue| props.insert(&category, name, value);

        put(BACKGROUND_TYPE, PropertyValue::Integer(kind_code(setting.kind)));
        put(IMAGE_PATH, PropertyValue::Text(setting.image_path.clone()));
        put(IMAGE_DIRECTORY, PropertyValue::Text(setting.image_directory.clone()));
        put(TEXT, PropertyValue::Text(setting.text.clone()));
        put(TEXT_SIZE, PropertyValue::Integer(setting.text_size.into()));
        put(FONT_PATH, PropertyValue::Text(setting.font_path.clone()));
        put(OPACITY, PropertyValue::Real(setting.opacity));
        put(POSITION_HORIZONTAL, PropertyValue::Integer(setting.horizontal as i64));
        put(POSITION_VERTICAL, PropertyValue::Integer(setting.vertical as i64));
        put(STRETCH, PropertyValue::Integer(setting.stretch as i64));
        put(UPDATE_INTERVAL, PropertyValue::Interval(setting.reload_interval));
        put(FADE_INTERVAL, PropertyValue::Interval(setting.fade_interval));
        put(EXTENSIONS, PropertyValue::Text(setting.extensions.clone()));
        put(LOOP_SLIDESHOW, PropertyValue::Flag(setting.loop_slideshow));
        put(SHUFFLE_SLIDESHOW, PropertyValue::Flag(setting.shuffle_slideshow));
        put(MAX_WIDTH, PropertyValue::Integer(setting.max_width.into()));
        put(MAX_HEIGHT, PropertyValue::Integer(setting.max_height.into()));
        put(SOFT_EDGE_X, PropertyValue::Integer(setting.soft_edge_x.into()));
        put(SOFT_EDGE_Y, PropertyValue::Integer(setting.soft_edge_y.into()));
        put(EXPAND_TO_HOST, PropertyValue::Flag(setting.expand_to_host));
        put(VIEW_BOX_X, PropertyValue::Real(setting.view_box_x));
        put(VIEW_BOX_Y, PropertyValue::Real(setting.view_box_y));
        put(LIMIT_TO_EDITOR, PropertyValue::Flag(setting.limit_to_editor));

        props
    }

    /// Reads a RON map of properties, as exported by a host.
    pub fn from_ron_file(path: &Path) -> Result<Self, Error> {
        let document = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&document).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl PropertySource for MapProperties {
    fn property(&self, category: &str, name: &str) -> Option<PropertyValue> {
        self.pages.get(category)?.get(name).cloned()
    }
}

/// Key under which the options page is stored.
pub fn page_key() -> String {
    format!("{CATEGORY}/{PAGE}")
}

fn kind_code(kind: BackgroundKind) -> i64 {
    match kind {
        BackgroundKind::Single => 0,
        BackgroundKind::Slideshow => 1,
        BackgroundKind::SingleEach => 2,
        BackgroundKind::TextImage => 3,
    }
}

struct Reader<'a> {
    source: &'a dyn PropertySource,
    category: String,
}

impl Reader<'_> {
    fn get(&self, name: &'static str) -> Result<PropertyValue, Error> {
        self.source
            .property(&self.category, name)
            .ok_or(Error::MissingProperty(name))
    }

    fn text(&self, name: &'static str) -> Result<String, Error> {
        match self.get(name)? {
            PropertyValue::Text(text) => Ok(text),
            _ => Err(Error::PropertyType(name)),
        }
    }

    fn integer(&self, name: &'static str) -> Result<i64, Error> {
        match self.get(name)? {
            PropertyValue::Integer(value) => Ok(value),
            _ => Err(Error::PropertyType(name)),
        }
    }

    fn unsigned(&self, name: &'static str) -> Result<u32, Error> {
        u32::try_from(self.integer(name)?).map_err(|_| Error::PropertyType(name))
    }

    fn real(&self, name: &'static str) -> Result<f64, Error> {
        match self.get(name)? {
            PropertyValue::Real(value) => Ok(value),
            PropertyValue::Integer(value) => Ok(value as f64),
            _ => Err(Error::PropertyType(name)),
        }
    }

    fn flag(&self, name: &'static str) -> Result<bool, Error> {
        match self.get(name)? {
            PropertyValue::Flag(value) => Ok(value),
            _ => Err(Error::PropertyType(name)),
        }
    }

    fn interval(&self, name: &'static str) -> Result<Duration, Error> {
        match self.get(name)? {
            PropertyValue::Interval(value) => Ok(value),
            _ => Err(Error::PropertyType(name)),
        }
    }

    fn coded<T: TryFrom<i64>>(&self, name: &'static str) -> Result<T, Error> {
        T::try_from(self.integer(name)?).map_err(|_| Error::PropertyType(name))
    }
}

/// Reads every option from the host.
///
/// `FontPath` is optional since older hosts never stored it; every other
/// property must be present.
pub fn read_setting(source: &dyn PropertySource) -> Result<Setting, Error> {
    let props = Reader {
        source,
        category: page_key(),
    };

    Ok(Setting {
        kind: props.coded::<BackgroundKind>(BACKGROUND_TYPE)?,
        image_path: props.text(IMAGE_PATH)?,
        image_directory: props.text(IMAGE_DIRECTORY)?,
        text: props.text(TEXT)?,
        text_size: props.unsigned(TEXT_SIZE)?,
        font_path: match props.text(FONT_PATH) {
            Err(Error::MissingProperty(_)) => String::new(),
            other => other?,
        },
        opacity: props.real(OPACITY)?,
        horizontal: props.coded::<HorizontalAnchor>(POSITION_HORIZONTAL)?,
        vertical: props.coded::<VerticalAnchor>(POSITION_VERTICAL)?,
        stretch: props.coded::<Stretch>(STRETCH)?,
        max_width: props.unsigned(MAX_WIDTH)?,
        max_height: props.unsigned(MAX_HEIGHT)?,
        soft_edge_x: props.unsigned(SOFT_EDGE_X)?,
        soft_edge_y: props.unsigned(SOFT_EDGE_Y)?,
        reload_interval: props.interval(UPDATE_INTERVAL)?,
        fade_interval: props.interval(FADE_INTERVAL)?,
        extensions: props.text(EXTENSIONS)?,
        loop_slideshow: props.flag(LOOP_SLIDESHOW)?,
        shuffle_slideshow: props.flag(SHUFFLE_SLIDESHOW)?,
        expand_to_host: props.flag(EXPAND_TO_HOST)?,
        view_box_x: props.real(VIEW_BOX_X)?,
        view_box_y: props.real(VIEW_BOX_Y)?,
        limit_to_editor: props.flag(LIMIT_TO_EDITOR)?,
    })
}
