// SPDX-License-Identifier: MPL-2.0

//! Scope table and the load/apply lifecycle of configuration records.

use crate::host::{self, PropertySource};
use crate::{Error, GLOBAL_DOCUMENT, NAME, Notifier, Scope, Setting, Subscription};
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Where the store keeps its durable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Location of the global document.
    pub global_document: PathBuf,
    /// Directory relative image paths resolve against.
    pub base_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let global_document = dirs::config_dir()
            .unwrap_or_default()
            .join(NAME)
            .join(GLOBAL_DOCUMENT);
        let base_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_default();

        Self {
            global_document,
            base_dir,
        }
    }
}

/// The configuration record of one scope.
pub struct SettingEntry {
    scope: Scope,
    setting: RefCell<Setting>,
    changed: Notifier<Setting>,
}

impl fmt::Debug for SettingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingEntry")
            .field("scope", &self.scope)
            .field("setting", &self.setting.borrow())
            .field("listeners", &self.changed.len())
            .finish()
    }
}

impl SettingEntry {
    fn new(scope: Scope) -> Self {
        Self {
            scope,
            setting: RefCell::new(Setting::default()),
            changed: Notifier::new(),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// A copy of the current record.
    pub fn get(&self) -> Setting {
        self.setting.borrow().clone()
    }

    pub fn borrow(&self) -> Ref<'_, Setting> {
        self.setting.borrow()
    }

    /// Mutates the record in place without notifying anyone. Call
    /// [`SettingsStore::apply`] afterwards to persist and publish.
    pub fn update(&self, edit: impl FnOnce(&mut Setting)) {
        edit(&mut self.setting.borrow_mut());
    }

    /// Listens for changes of this record. The listener receives the new record.
    pub fn subscribe(&self, listener: impl FnMut(&Setting) + 'static) -> Subscription {
        self.changed.subscribe(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.changed.len()
    }

    fn replace(&self, setting: Setting) {
        *self.setting.borrow_mut() = setting;
    }

    fn notify(&self) {
        let snapshot = self.get();
        self.changed.emit(&snapshot);
    }
}

/// Owns one [`SettingEntry`] per scope that has been seen.
pub struct SettingsStore {
    config: StoreConfig,
    entries: Vec<Rc<SettingEntry>>,
    active: Scope,
    host: Option<Box<dyn PropertySource>>,
    /// A global notification was withheld while a workspace was active.
    global_pending: Cell<bool>,
}

impl fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsStore")
            .field("config", &self.config)
            .field("entries", &self.entries)
            .field("active", &self.active)
            .field("host", &self.host.is_some())
            .field("global_pending", &self.global_pending.get())
            .finish()
    }
}

impl SettingsStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            active: Scope::Global,
            host: None,
            global_pending: Cell::new(false),
        }
    }

    /// Reads the global record from `host` rather than the global document.
    pub fn with_host(mut self, host: Box<dyn PropertySource>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    /// The scope whose record is currently in effect.
    pub fn active(&self) -> &Scope {
        &self.active
    }

    /// Switching back to the global scope delivers any global change that
    /// was withheld while a workspace was active.
    pub fn set_active(&mut self, scope: Scope) {
        if self.active == scope {
            return;
        }
        tracing::debug!(from = %self.active, to = %scope, "active scope changed");
        self.active = scope;

        if self.active.is_global() && self.global_pending.replace(false) {
            if let Some(global) = self.find(&Scope::Global) {
                tracing::debug!("delivering withheld global change");
                global.notify();
            }
        }
    }

    fn find(&self, scope: &Scope) -> Option<Rc<SettingEntry>> {
        self.entries
            .iter()
            .find(|entry| &entry.scope == scope)
            .cloned()
    }

    /// Returns the record for `scope`, creating and loading it on first use.
    ///
    /// Repeated calls with an equal scope return the same entry.
    pub fn resolve(&mut self, scope: &Scope) -> Rc<SettingEntry> {
        let (entry, created) = self.find_or_create(scope);
        if created {
            self.load_entry(&entry);
        }
        entry
    }

    fn find_or_create(&mut self, scope: &Scope) -> (Rc<SettingEntry>, bool) {
        if let Some(entry) = self.find(scope) {
            return (entry, false);
        }

        let entry = Rc::new(SettingEntry::new(scope.clone()));
        self.entries.push(Rc::clone(&entry));
        tracing::debug!(%scope, "created configuration record");
        (entry, true)
    }

    pub fn global(&mut self) -> Rc<SettingEntry> {
        self.resolve(&Scope::Global)
    }

    /// Number of scopes that have a record.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Marks `workspace_document` (or the global scope) active and reads its
    /// record once.
    ///
    /// An unreadable workspace document yields the global record. Listeners of
    /// an existing record are notified when the read changed it.
    pub fn initialize(&mut self, workspace_document: Option<PathBuf>) -> Rc<SettingEntry> {
        let scope = Scope::from_document(workspace_document);
        self.set_active(scope.clone());
        let (entry, created) = self.find_or_create(&scope);
        let before = (!created).then(|| entry.get());

        match self.read(&scope) {
            Ok(Some(setting)) => entry.replace(setting),
            Ok(None) => tracing::debug!(%scope, "no configuration source, keeping defaults"),
            Err(why) if !scope.is_global() => {
                tracing::warn!(?why, %scope, "workspace configuration unreadable, using global record");
                let global = self.global_fallback();
                entry.replace(global);
            }
            Err(why) => {
                tracing::warn!(?why, %scope, "configuration load failed, keeping last record");
            }
        }

        if before.is_some_and(|before| before != *entry.borrow()) {
            self.publish(&entry);
        }
        entry
    }

    /// The global record as its source currently has it, or the in-memory
    /// global record when the source cannot be read.
    fn global_fallback(&mut self) -> Setting {
        match self.read(&Scope::Global) {
            Ok(Some(setting)) => setting,
            _ => self.global().get(),
        }
    }

    /// Re-reads the record of `scope` from its durable source.
    ///
    /// Failures keep the in-memory record and are only logged.
    pub fn load(&mut self, scope: &Scope) {
        let entry = self.resolve(scope);
        self.load_entry(&entry);
    }

    /// Persists the record of `scope` and notifies its listeners.
    ///
    /// Listeners of the global record are not notified while a workspace
    /// scope is active; only that workspace's listeners should react then.
    pub fn apply(&mut self, scope: &Scope) {
        let entry = self.resolve(scope);
        if let Err(why) = self.persist(&entry) {
            tracing::warn!(?why, %scope, "failed to persist configuration");
        }
        self.publish(&entry);
    }

    /// Reloads the record of `scope` and notifies under the same rule as
    /// [`SettingsStore::apply`]. Used when the host reports that its options
    /// were committed or a document changed on disk.
    pub fn refresh(&mut self, scope: &Scope) {
        let entry = self.resolve(scope);
        self.load_entry(&entry);
        self.publish(&entry);
    }

    /// Writes the global document if it does not exist yet.
    pub fn save_default_document(&mut self) -> Result<bool, Error> {
        if self.config.global_document.exists() {
            return Ok(false);
        }
        let entry = self.global();
        self.persist(&entry)?;
        Ok(true)
    }

    /// Resolves a raw path field of `scope`'s record to an absolute path.
    pub fn resolve_path(&self, raw: &str, scope: &Scope) -> PathBuf {
        crate::resolve_path(raw, scope.directory(), &self.config.base_dir)
    }

    fn publish(&self, entry: &SettingEntry) {
        if entry.scope.is_global() && !self.active.is_global() {
            tracing::debug!(active = %self.active, "global change suppressed by workspace scope");
            self.global_pending.set(true);
            return;
        }
        entry.notify();
    }

    fn load_entry(&self, entry: &SettingEntry) {
        match self.read(&entry.scope) {
            Ok(Some(setting)) => entry.replace(setting),
            Ok(None) => tracing::debug!(scope = %entry.scope, "no configuration source, keeping defaults"),
            Err(why) => {
                tracing::warn!(?why, scope = %entry.scope, "configuration load failed, keeping last record");
            }
        }
    }

    fn read(&self, scope: &Scope) -> Result<Option<Setting>, Error> {
        match scope {
            Scope::Workspace(document) => read_document(document),
            Scope::Global => match &self.host {
                Some(host) => match host::read_setting(host.as_ref()) {
                    Ok(setting) => Ok(Some(setting)),
                    Err(why) => {
                        tracing::warn!(?why, "host options unreadable, using global document");
                        read_document(&self.config.global_document)
                    }
                },
                None => read_document(&self.config.global_document),
            },
        }
    }

    fn persist(&self, entry: &SettingEntry) -> Result<(), Error> {
        let path = match &entry.scope {
            Scope::Global => self.config.global_document.as_path(),
            Scope::Workspace(document) => document.as_path(),
        };
        write_document(path, &entry.borrow())
    }
}

/// Reads a document. An absent file is not an error.
pub fn read_document(path: &Path) -> Result<Option<Setting>, Error> {
    if !path.exists() {
        return Ok(None);
    }
    let document = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Setting::from_ron(&document)
        .map(Some)
        .map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub fn write_document(path: &Path, setting: &Setting) -> Result<(), Error> {
    let document = setting.to_ron()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| Error::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, document).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
