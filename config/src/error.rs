// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration document {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("failed to serialize configuration")]
    Serialize(#[from] ron::Error),
    #[error("host property `{0}` is missing")]
    MissingProperty(&'static str),
    #[error("host property `{0}` has an unexpected value")]
    PropertyType(&'static str),
}
