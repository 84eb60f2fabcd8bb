// SPDX-License-Identifier: MPL-2.0

use crate::{
    context::Context,
    provider::{Completed, ImageProvider, Loader, ProviderId},
    watch::{self, Watch, WatchTarget},
};
use backdrop_config::{MapProperties, Scope, StoreConfig, Subscription};
use calloop::{
    LoopHandle, RegistrationToken,
    timer::{TimeoutAction, Timer},
};
use eyre::{Context as _, eyre};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;

#[derive(Debug)]
pub struct EngineConfig {
    pub store: StoreConfig,
    /// Workspace document to attach to. `None` runs with the global record.
    pub workspace: Option<PathBuf>,
    /// Host options that replace the global document.
    pub host_properties: Option<MapProperties>,
    /// Follow configuration documents and slideshow directories on disk.
    pub watch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            workspace: None,
            host_properties: None,
            watch: true,
        }
    }
}

#[derive(Debug)]
pub struct BackdropEngine;

impl BackdropEngine {
    pub fn run(config: EngineConfig) -> eyre::Result<()> {
        Self::run_with_stop(config, None)
    }

    fn run_with_stop(
        config: EngineConfig,
        stop_rx: Option<calloop::channel::Channel<()>>,
    ) -> eyre::Result<()> {
        let mut event_loop: calloop::EventLoop<'static, BackdropState> =
            calloop::EventLoop::try_new().wrap_err("failed to create event loop")?;

        if let Some(stop_rx) = stop_rx {
            event_loop
                .handle()
                .insert_source(stop_rx, |event, _, state| match event {
                    calloop::channel::Event::Msg(()) | calloop::channel::Event::Closed => {
                        state.exit = true;
                    }
                })
                .map_err(|err| eyre!("failed to insert stop channel into event loop: {err}"))?;
        }

        let (load_tx, load_rx) = calloop::channel::channel::<Completed>();
        event_loop
            .handle()
            .insert_source(load_rx, |event, _, state| {
                if let calloop::channel::Event::Msg(completed) = event {
                    state.context.complete(completed);
                }
            })
            .map_err(|err| eyre!("failed to insert load channel into event loop: {err}"))?;

        let watch_tx = watch::fs_source(&event_loop.handle(), |state, target, event| {
            state.on_fs_event(target, event);
        })?;

        let mut context = Context::new(config.store, Loader::Background(load_tx));
        if let Some(host) = config.host_properties {
            context = context.with_host(Box::new(host));
        }

        let selected = context.attach(config.workspace).len();
        tracing::info!(
            scope = %context.store().active(),
            selected,
            "backdrop engine started"
        );

        let mut state = BackdropState {
            context,
            loop_handle: event_loop.handle(),
            watch_tx,
            watching: config.watch,
            watches: Vec::new(),
            unwatchable: Vec::new(),
            timers: Vec::new(),
            changed: Rc::new(Cell::new(false)),
            views: Vec::new(),
            exit: false,
        };
        state.sync();

        loop {
            event_loop.dispatch(None, &mut state)?;

            if state.exit {
                break;
            }

            state.sync();
        }

        tracing::info!("backdrop engine stopped");
        Ok(())
    }
}

pub struct BackgroundHandle {
    stop_tx: calloop::channel::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl BackgroundHandle {
    /// Runs the engine on its own thread until [`BackgroundHandle::stop`].
    pub fn spawn(config: EngineConfig) -> eyre::Result<Self> {
        let (stop_tx, stop_rx) = calloop::channel::channel();
        let join = thread::Builder::new()
            .name("backdrop-engine".into())
            .spawn(move || {
                if let Err(err) = BackdropEngine::run_with_stop(config, Some(stop_rx)) {
                    tracing::error!(?err, "backdrop engine exited with error");
                }
            })
            .wrap_err("failed to spawn engine thread")?;

        Ok(Self {
            stop_tx,
            join: Some(join),
        })
    }

    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for BackgroundHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Event loop state: the context plus the sources feeding it.
pub struct BackdropState {
    context: Context,
    loop_handle: LoopHandle<'static, BackdropState>,
    watch_tx: calloop::channel::SyncSender<(WatchTarget, notify::Event)>,
    watching: bool,
    watches: Vec<Watch>,
    /// Paths that could not be watched; not retried while still wanted.
    unwatchable: Vec<(WatchTarget, PathBuf)>,
    timers: Vec<(ProviderId, RegistrationToken)>,
    changed: Rc<Cell<bool>>,
    views: Vec<Subscription>,
    exit: bool,
}

impl std::fmt::Debug for BackdropState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackdropState")
            .field("context", &self.context)
            .field("watches", &self.watches)
            .field("timers", &self.timers.len())
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}

impl BackdropState {
    pub fn context(&self) -> &Context {
        &self.context
    }

    fn sync(&mut self) {
        self.follow_providers();
        self.sync_timers();
        if self.watching {
            self.sync_watches();
        }
        self.report_changes();
    }

    /// Marks the selection dirty whenever any provider's image changes.
    fn follow_providers(&mut self) {
        let providers = self.context.registry().providers();
        for provider in &providers[self.views.len().min(providers.len())..] {
            let changed = Rc::clone(&self.changed);
            self.views
                .push(provider.subscribe(Box::new(move || changed.set(true))));
            self.changed.set(true);
        }
    }

    fn sync_timers(&mut self) {
        let pending: Vec<(ProviderId, std::time::Duration)> = self
            .context
            .registry()
            .slideshows()
            .filter(|provider| !self.timers.iter().any(|(id, _)| *id == provider.id()))
            .map(|provider| (provider.id(), provider.tick_interval()))
            .collect();

        for (id, interval) in pending {
            let inserted = self.loop_handle.insert_source(
                Timer::from_duration(interval),
                move |_, _, state: &mut BackdropState| {
                    let Some(provider) = state.context.registry().get(id) else {
                        return TimeoutAction::Drop;
                    };
                    if state.is_selected(id) {
                        provider.tick();
                    }
                    TimeoutAction::ToDuration(provider.tick_interval())
                },
            );
            match inserted {
                Ok(token) => {
                    tracing::debug!(%id, ?interval, "slideshow timer scheduled");
                    self.timers.push((id, token));
                }
                Err(err) => tracing::error!(%id, %err, "failed to schedule slideshow timer"),
            }
        }
    }

    fn is_selected(&self, id: ProviderId) -> bool {
        self.context
            .selection()
            .iter()
            .any(|provider| provider.id() == id)
    }

    /// Watches the active documents and every slideshow directory, dropping
    /// watches that are no longer wanted.
    fn sync_watches(&mut self) {
        let mut wanted: Vec<(WatchTarget, PathBuf)> = Vec::new();

        let store = self.context.store();
        let mut scopes = vec![Scope::Global];
        if !store.active().is_global() {
            scopes.push(store.active().clone());
        }
        for scope in scopes {
            if let Some(parent) = self.document_path(&scope).parent() {
                wanted.push((WatchTarget::Document(scope), parent.to_path_buf()));
            }
        }
        for provider in self.context.registry().slideshows() {
            if let Some(directory) = provider.slideshow_directory() {
                wanted.push((WatchTarget::Directory(provider.id()), directory));
            }
        }

        self.watches
            .retain(|watch| wanted.iter().any(|(target, path)| watch.is(target, path)));
        self.unwatchable.retain(|failed| wanted.contains(failed));

        for (target, path) in wanted {
            let known = self.watches.iter().any(|watch| watch.is(&target, &path))
                || self.unwatchable.iter().any(|(t, p)| *t == target && *p == path);
            if known || !path.is_dir() {
                continue;
            }
            match Watch::new(target.clone(), &path, self.watch_tx.clone()) {
                Ok(watch) => self.watches.push(watch),
                Err(why) => {
                    tracing::warn!(?why, path = %path.display(), "cannot watch path");
                    self.unwatchable.push((target, path));
                }
            }
        }
    }

    fn document_path(&self, scope: &Scope) -> PathBuf {
        match scope {
            Scope::Global => self.context.store().config().global_document.clone(),
            Scope::Workspace(document) => document.clone(),
        }
    }

    fn on_fs_event(&mut self, target: WatchTarget, event: notify::Event) {
        match target {
            WatchTarget::Document(scope) => {
                if watch::concerns(&event, &self.document_path(&scope)) {
                    tracing::info!(%scope, "configuration document changed");
                    self.context.store_mut().refresh(&scope);
                }
            }
            WatchTarget::Directory(id) => {
                if let Some(provider) = self.context.registry().get(id) {
                    provider.on_directory_event(&event);
                }
            }
        }
    }

    fn report_changes(&self) {
        if !self.changed.replace(false) {
            return;
        }

        for provider in self.context.selection() {
            match provider.current_image() {
                Some(image) => {
                    let (width, height) = image.pixel_size();
                    tracing::info!(
                        id = %provider.id(),
                        kind = ?provider.kind(),
                        scope = %provider.scope(),
                        width,
                        height,
                        "background image ready"
                    );
                }
                None => tracing::info!(
                    id = %provider.id(),
                    kind = ?provider.kind(),
                    scope = %provider.scope(),
                    "no background image"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::tests::write_png;
    use backdrop_config::{Setting, write_document};
    use std::time::Duration;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert!(config.watch);
        assert!(config.workspace.is_none());
    }

    #[test]
    fn handle_stops_engine_thread() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            store: StoreConfig {
                global_document: dir.path().join("config.ron"),
                base_dir: dir.path().to_path_buf(),
            },
            watch: false,
            ..EngineConfig::default()
        };

        let mut handle = BackgroundHandle::spawn(config).unwrap();
        handle.stop();

        assert!(handle.join.is_none());
    }

    #[test]
    fn background_load_reaches_provider_through_loop() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("bg.png"), 4, 3);
        let global_document = dir.path().join("config.ron");
        write_document(&global_document, &Setting::default().image_path("bg.png")).unwrap();

        let mut event_loop: calloop::EventLoop<'static, Context> =
            calloop::EventLoop::try_new().unwrap();
        let (load_tx, load_rx) = calloop::channel::channel::<Completed>();
        event_loop
            .handle()
            .insert_source(load_rx, |event, _, context: &mut Context| {
                if let calloop::channel::Event::Msg(completed) = event {
                    context.complete(completed);
                }
            })
            .unwrap();

        let mut context = Context::new(
            StoreConfig {
                global_document,
                base_dir: dir.path().to_path_buf(),
            },
            Loader::Background(load_tx),
        );
        let id = context.attach(None)[0].id();
        let count = Rc::new(Cell::new(0));
        let inner = Rc::clone(&count);
        let _subscription = context
            .registry()
            .get(id)
            .unwrap()
            .subscribe(Box::new(move || inner.set(inner.get() + 1)));

        for _ in 0..50 {
            if context.registry().get(id).unwrap().current_image().is_some() {
                break;
            }
            event_loop
                .dispatch(Some(Duration::from_millis(100)), &mut context)
                .unwrap();
        }

        let image = context.registry().get(id).unwrap().current_image().unwrap();
        assert_eq!(image.pixel_size(), (4, 3));
        assert!(count.get() >= 1);
    }
}
