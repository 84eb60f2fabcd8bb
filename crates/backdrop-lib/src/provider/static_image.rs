// SPDX-License-Identifier: MPL-2.0

use super::LoadJob;
use backdrop_config::{Scope, Setting};
use std::path::Path;

/// One image file, reloaded whenever the configuration changes.
///
/// Shared by the global and the per-workspace single image variants; they
/// differ only in the scope they are registered for.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticImage;

impl StaticImage {
    pub fn plan(&self, setting: &Setting, scope: &Scope, base_dir: &Path) -> LoadJob {
        LoadJob::File {
            path: setting.resolved_image_path(scope, base_dir),
            setting: setting.clone(),
        }
    }
}
