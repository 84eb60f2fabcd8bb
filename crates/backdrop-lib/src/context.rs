// SPDX-License-Identifier: MPL-2.0

//! The state shared by everything that draws a background.

use crate::provider::{Completed, Loader, Provider, ProviderEnv};
use crate::registry::ProviderRegistry;
use backdrop_config::{PropertySource, SettingsStore, StoreConfig};
use std::path::PathBuf;

/// Owns the configuration store and the provider registry.
#[derive(Debug)]
pub struct Context {
    store: SettingsStore,
    registry: ProviderRegistry,
    env: ProviderEnv,
}

impl Context {
    pub fn new(config: StoreConfig, loader: Loader) -> Self {
        let env = ProviderEnv {
            loader,
            base_dir: config.base_dir.clone(),
        };
        Self {
            store: SettingsStore::new(config),
            registry: ProviderRegistry::new(),
            env,
        }
    }

    /// Reads the global record from `host` instead of the global document.
    pub fn with_host(mut self, host: Box<dyn PropertySource>) -> Self {
        self.store = self.store.with_host(host);
        self
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SettingsStore {
        &mut self.store
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn env(&self) -> &ProviderEnv {
        &self.env
    }

    /// Prepares the providers for a surface showing `workspace_document`, or
    /// no workspace at all, and returns the ones it should draw.
    pub fn attach(&mut self, workspace_document: Option<PathBuf>) -> Vec<&Provider> {
        let entry = self.store.initialize(workspace_document);
        let global = self.store.global();
        self.registry.ensure_initialized(&global, &self.env);

        let active = self.store.active().clone();
        if !active.is_global() {
            self.registry
                .ensure_workspace_provider(&active, &entry, &self.env);
        }

        let global_kind = global.borrow().kind;
        self.registry.select(&active, global_kind)
    }

    /// The providers to draw for the active scope as things stand now.
    pub fn selection(&self) -> Vec<&Provider> {
        let global_kind = self
            .registry
            .providers()
            .first()
            .map(|provider| provider.entry().borrow().kind)
            .unwrap_or_default();
        self.registry.select(self.store.active(), global_kind)
    }

    pub fn complete(&self, completed: Completed) {
        self.registry.complete(completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ImageProvider;
    use crate::provider::tests::write_png;
    use backdrop_config::{BackgroundKind, MapProperties, Scope, Setting, write_document};
    use std::path::Path;

    fn context_in(dir: &Path) -> Context {
        Context::new(
            StoreConfig {
                global_document: dir.join("global/config.ron"),
                base_dir: dir.to_path_buf(),
            },
            Loader::Inline,
        )
    }

    #[test]
    fn global_attach_selects_global_kind() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("bg.png"), 5, 5);
        write_document(
            &dir.path().join("global/config.ron"),
            &Setting::default().image_path("bg.png"),
        )
        .unwrap();
        let mut context = context_in(dir.path());

        let selected = context.attach(None);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].kind(), BackgroundKind::Single);
        assert_eq!(selected[0].current_image().unwrap().pixel_size(), (5, 5));
        assert_eq!(context.registry().len(), 4);
    }

    #[test]
    fn workspace_attach_uses_workspace_record() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("project");
        std::fs::create_dir(&workspace).unwrap();
        write_png(&workspace.join("local.png"), 3, 2);
        let document = workspace.join(".backdrop.ron");
        write_document(
            &document,
            &Setting::default()
                .kind(BackgroundKind::SingleEach)
                .image_path("$profileFolder/local.png"),
        )
        .unwrap();
        let mut context = context_in(dir.path());

        let selected = context.attach(Some(document.clone()));

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].kind(), BackgroundKind::SingleEach);
        assert_eq!(selected[0].scope(), &Scope::workspace(&document));
        assert_eq!(selected[0].current_image().unwrap().pixel_size(), (3, 2));

        // attaching again reuses the same providers
        assert_eq!(context.attach(Some(document)).len(), 1);
        assert_eq!(context.registry().len(), 5);
    }

    #[test]
    fn global_edit_made_under_a_workspace_shows_on_return() {
        let dir = tempfile::tempdir().unwrap();
        let global_document = dir.path().join("global/config.ron");
        write_png(&dir.path().join("a.png"), 2, 2);
        write_png(&dir.path().join("b.png"), 7, 7);
        write_document(&global_document, &Setting::default().image_path("a.png")).unwrap();
        let workspace_document = dir.path().join("project/.backdrop.ron");
        write_document(&workspace_document, &Setting::default()).unwrap();
        let mut context = context_in(dir.path());

        let selected = context.attach(None);
        assert_eq!(selected[0].current_image().unwrap().pixel_size(), (2, 2));

        context.attach(Some(workspace_document));
        write_document(&global_document, &Setting::default().image_path("b.png")).unwrap();
        context.store_mut().refresh(&Scope::Global);

        let selected = context.attach(None);
        assert_eq!(selected[0].kind(), BackgroundKind::Single);
        assert_eq!(selected[0].current_image().unwrap().pixel_size(), (7, 7));
    }

    #[test]
    fn host_properties_drive_global_record() {
        let dir = tempfile::tempdir().unwrap();
        let setting = Setting::default()
            .kind(BackgroundKind::TextImage)
            .text("");
        let mut context = context_in(dir.path())
            .with_host(Box::new(MapProperties::from_setting(&setting)));

        let selected = context.attach(None);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].kind(), BackgroundKind::TextImage);
        assert!(selected[0].current_image().is_none());
        assert_eq!(context.selection().len(), 1);
    }
}
