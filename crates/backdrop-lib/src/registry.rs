// SPDX-License-Identifier: MPL-2.0

use crate::provider::{Completed, ImageProvider, Provider, ProviderEnv, ProviderId};
use backdrop_config::{BackgroundKind, Scope, Setting, SettingEntry};
use std::rc::Rc;

/// Every provider the process has created.
///
/// Providers are only ever added. The four global providers are created once,
/// and each workspace scope gets exactly one provider the first time it is
/// seen.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
    seed: Option<Setting>,
    next_id: usize,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates one global provider of every kind if the registry is empty.
    /// Returns whether anything was created.
    pub fn ensure_initialized(&mut self, global: &Rc<SettingEntry>, env: &ProviderEnv) -> bool {
        if !self.providers.is_empty() {
            return false;
        }

        self.seed = Some(global.get());
        for kind in BackgroundKind::ALL {
            self.push(kind, Scope::Global, Rc::clone(global), env);
        }
        tracing::info!(count = self.providers.len(), "global providers created");
        true
    }

    /// Creates the provider for `scope` unless one already exists. Its kind is
    /// taken from `entry` at the time of the call.
    pub fn ensure_workspace_provider(
        &mut self,
        scope: &Scope,
        entry: &Rc<SettingEntry>,
        env: &ProviderEnv,
    ) -> Option<ProviderId> {
        if self.providers.iter().any(|provider| provider.scope() == scope) {
            return None;
        }

        let kind = entry.borrow().kind;
        let id = self.push(kind, scope.clone(), Rc::clone(entry), env);
        tracing::info!(%id, ?kind, %scope, "workspace provider created");
        Some(id)
    }

    fn push(
        &mut self,
        kind: BackgroundKind,
        scope: Scope,
        entry: Rc<SettingEntry>,
        env: &ProviderEnv,
    ) -> ProviderId {
        let id = ProviderId(self.next_id);
        self.next_id += 1;
        self.providers
            .push(Provider::new(id, kind, scope, entry, env.clone()));
        id
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn get(&self, id: ProviderId) -> Option<&Provider> {
        self.providers.iter().find(|provider| provider.id() == id)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// The global record as it was when the registry was first populated.
    pub fn seed(&self) -> Option<&Setting> {
        self.seed.as_ref()
    }

    /// Hands a background load result to the provider that requested it.
    pub fn complete(&self, completed: Completed) {
        match self.get(completed.provider) {
            Some(provider) => provider.complete(completed.generation, completed.loaded),
            None => tracing::warn!(id = %completed.provider, "load finished for unknown provider"),
        }
    }

    /// Providers that should be drawn: those of `active` when it is a
    /// workspace with a provider, otherwise the global ones of `global_kind`.
    pub fn select(&self, active: &Scope, global_kind: BackgroundKind) -> Vec<&Provider> {
        if !active.is_global() {
            let workspace: Vec<&Provider> = self
                .providers
                .iter()
                .filter(|provider| provider.scope() == active)
                .collect();
            if !workspace.is_empty() {
                return workspace;
            }
        }

        self.providers
            .iter()
            .filter(|provider| provider.scope().is_global() && provider.kind() == global_kind)
            .collect()
    }

    pub fn slideshows(&self) -> impl Iterator<Item = &Provider> {
        self.providers
            .iter()
            .filter(|provider| provider.kind() == BackgroundKind::Slideshow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::tests::{inline_env, store_in};

    #[test]
    fn initialization_creates_each_kind_once_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let global = store.global();
        let env = inline_env(dir.path());
        let mut registry = ProviderRegistry::new();

        assert!(registry.ensure_initialized(&global, &env));
        assert!(!registry.ensure_initialized(&global, &env));

        let kinds: Vec<BackgroundKind> = registry.providers().iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, BackgroundKind::ALL.to_vec());
        assert!(registry.providers().iter().all(|p| p.scope().is_global()));
        assert_eq!(registry.seed(), Some(&global.get()));
    }

    #[test]
    fn workspace_provider_is_added_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let global = store.global();
        let scope = Scope::workspace(dir.path().join(".backdrop.ron"));
        let entry = store.resolve(&scope);
        entry.update(|setting| setting.kind = BackgroundKind::Slideshow);
        let env = inline_env(dir.path());
        let mut registry = ProviderRegistry::new();
        registry.ensure_initialized(&global, &env);

        let first = registry.ensure_workspace_provider(&scope, &entry, &env);
        for _ in 0..3 {
            assert_eq!(registry.ensure_workspace_provider(&scope, &entry, &env), None);
        }

        let workspace: Vec<&Provider> = registry
            .providers()
            .iter()
            .filter(|p| p.scope() == &scope)
            .collect();
        assert_eq!(workspace.len(), 1);
        assert_eq!(Some(workspace[0].id()), first);
        assert_eq!(workspace[0].kind(), BackgroundKind::Slideshow);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn selection_prefers_active_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let global = store.global();
        let scope = Scope::workspace(dir.path().join(".backdrop.ron"));
        let entry = store.resolve(&scope);
        let env = inline_env(dir.path());
        let mut registry = ProviderRegistry::new();
        registry.ensure_initialized(&global, &env);
        registry.ensure_workspace_provider(&scope, &entry, &env);

        let selected = registry.select(&scope, BackgroundKind::TextImage);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].scope(), &scope);

        let selected = registry.select(&Scope::Global, BackgroundKind::TextImage);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].kind(), BackgroundKind::TextImage);
        assert!(selected[0].scope().is_global());

        // a workspace without a provider falls back to the global selection
        let other = Scope::workspace(dir.path().join("other/.backdrop.ron"));
        let selected = registry.select(&other, BackgroundKind::Single);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].kind(), BackgroundKind::Single);
    }

    #[test]
    fn completion_for_unknown_provider_is_ignored() {
        let registry = ProviderRegistry::new();
        registry.complete(Completed {
            provider: ProviderId(42),
            generation: 1,
            loaded: Default::default(),
        });
        assert!(registry.is_empty());
    }
}
