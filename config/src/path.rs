// SPDX-License-Identifier: MPL-2.0

use std::path::{Path, PathBuf};

/// Marker standing for the directory that holds the scope's document.
pub const PROFILE_FOLDER_TOKEN: &str = "$profileFolder";

/// Turns a raw path field into an absolute path.
///
/// If `raw` contains [`PROFILE_FOLDER_TOKEN`] and `scope_dir` is known, the
/// token and everything before it are dropped and the remainder is joined onto
/// `scope_dir`. Without a scope directory the token is left in place. Any
/// path that is still relative afterwards is joined onto `base_dir`.
pub fn resolve_path(raw: &str, scope_dir: Option<&Path>, base_dir: &Path) -> PathBuf {
    if let (Some(pos), Some(dir)) = (raw.find(PROFILE_FOLDER_TOKEN), scope_dir) {
        let suffix = raw[pos + PROFILE_FOLDER_TOKEN.len()..].trim_start_matches(['/', '\\']);
        return dir.join(suffix);
    }

    if raw.contains(PROFILE_FOLDER_TOKEN) {
        tracing::debug!(raw, "profile folder token without a workspace document");
    }

    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
