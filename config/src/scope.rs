// SPDX-License-Identifier: MPL-2.0

use std::path::{Path, PathBuf};

/// Configuration namespace a [`crate::Setting`] belongs to.
///
/// A workspace scope is keyed by the full path of its document, so two
/// workspaces sharing a directory name never collide.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    #[default]
    Global,
    Workspace(PathBuf),
}

impl Scope {
    pub fn workspace(document: impl Into<PathBuf>) -> Self {
        Scope::Workspace(document.into())
    }

    /// Builds a scope from an optional workspace document path.
    pub fn from_document(document: Option<PathBuf>) -> Self {
        document.map_or(Scope::Global, Scope::Workspace)
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Scope::Global)
    }

    /// Path of the workspace document, if any.
    pub fn document(&self) -> Option<&Path> {
        match self {
            Scope::Global => None,
            Scope::Workspace(path) => Some(path),
        }
    }

    /// Directory that holds the workspace document.
    pub fn directory(&self) -> Option<&Path> {
        self.document().and_then(Path::parent)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Workspace(path) => write!(f, "workspace {}", path.display()),
        }
    }
}

/// Finds the workspace document governing `dir`, looking in `dir` and then in
/// each of its ancestors.
pub fn locate_workspace_document(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .map(|ancestor| ancestor.join(crate::WORKSPACE_DOCUMENT))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_parent_of_document() {
        let scope = Scope::workspace("/ws/cfg/.backdrop.ron");
        assert_eq!(scope.directory(), Some(Path::new("/ws/cfg")));
        assert_eq!(Scope::Global.directory(), None);
    }

    #[test]
    fn locate_walks_up_to_ancestor() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        let document = root.path().join(crate::WORKSPACE_DOCUMENT);
        std::fs::write(&document, "()").unwrap();

        assert_eq!(locate_workspace_document(&nested), Some(document));
    }
}
