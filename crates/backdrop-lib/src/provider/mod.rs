// SPDX-License-Identifier: MPL-2.0

//! Image providers.
//!
//! A [`Provider`] owns the current image of one (scope, kind) pair. It listens
//! to its configuration record and re-derives the image whenever the record
//! changes or, for slideshows, whenever its timer ticks. Decoding happens in a
//! [`LoadJob`], which is either run in place or on a worker thread whose result
//! is posted back to the event loop.

pub mod slideshow;
pub mod static_image;
pub mod text_image;

use crate::raster::{self, RasterImage};
use crate::transform;
use backdrop_config::{BackgroundKind, Notifier, Scope, Setting, SettingEntry, Subscription};
use calloop::channel::Sender;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

pub use slideshow::{Order, SlideCursor, Slides, Slideshow};
pub use static_image::StaticImage;
pub use text_image::TextImage;

/// What every provider variant offers to whoever draws its image.
pub trait ImageProvider {
    /// The image to draw, or `None` when there is nothing to draw.
    fn current_image(&self) -> Option<Arc<RasterImage>>;

    /// Calls `listener` each time the image may have changed. The event has no
    /// payload; listeners re-read [`ImageProvider::current_image`].
    fn subscribe(&self, listener: Box<dyn FnMut()>) -> Subscription;

    fn kind(&self) -> BackgroundKind;

    fn scope(&self) -> &Scope;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(pub(crate) usize);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider#{}", self.0)
    }
}

/// What a [`LoadJob`] produced.
#[derive(Debug, Default)]
pub struct Loaded {
    pub image: Option<RasterImage>,
    /// Fresh file set of a slideshow directory.
    pub slides: Option<Slides>,
}

/// Result of a background load, posted back to the event loop.
#[derive(Debug)]
pub struct Completed {
    pub provider: ProviderId,
    pub generation: u64,
    pub loaded: Loaded,
}

/// Where load jobs run.
#[derive(Clone, Default)]
pub enum Loader {
    /// On the calling thread, before the request returns.
    #[default]
    Inline,
    /// On a worker thread; the result arrives through the sender.
    Background(Sender<Completed>),
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loader::Inline => write!(f, "Inline"),
            Loader::Background(_) => write!(f, "Background"),
        }
    }
}

/// Everything a provider needs besides its configuration record.
#[derive(Debug, Clone)]
pub struct ProviderEnv {
    pub loader: Loader,
    /// Directory relative paths resolve against.
    pub base_dir: PathBuf,
}

/// Why a provider is asked to re-derive its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Construction or configuration change: start over from the record.
    Reload,
    /// Slideshow timer.
    Tick,
}

impl Trigger {
    fn merge(self, other: Trigger) -> Trigger {
        if self == Trigger::Reload || other == Trigger::Reload {
            Trigger::Reload
        } else {
            Trigger::Tick
        }
    }
}

/// Self-contained filesystem and decode work. Runs on any thread.
#[derive(Debug)]
pub enum LoadJob {
    File {
        path: PathBuf,
        setting: Setting,
    },
    /// Lists a slideshow directory and loads its first image.
    Slideshow {
        directory: PathBuf,
        setting: Setting,
    },
    /// Renders text with the given font, or a system font when `None`.
    Text {
        font: Option<PathBuf>,
        setting: Setting,
    },
    Nothing,
}

impl LoadJob {
    /// Produces the display-ready image. Every failure yields no image.
    pub fn run(self) -> Loaded {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.run_inner())) {
            Ok(loaded) => loaded,
            Err(_) => {
                tracing::warn!("image decode panicked");
                Loaded::default()
            }
        }
    }

    fn run_inner(self) -> Loaded {
        match self {
            LoadJob::Nothing => Loaded::default(),
            LoadJob::File { path, setting } => Loaded {
                image: load_file(&path, &setting),
                slides: None,
            },
            LoadJob::Slideshow { directory, setting } => {
                let (slides, first) = Slides::scan(&directory, &setting);
                tracing::debug!(
                    directory = %directory.display(),
                    count = slides.len(),
                    "slideshow directory scanned"
                );
                Loaded {
                    image: first.and_then(|path| load_file(&path, &setting)),
                    slides: Some(slides),
                }
            }
            LoadJob::Text { font, setting } => Loaded {
                image: render_text(font, &setting),
                slides: None,
            },
        }
    }
}

fn load_file(path: &Path, setting: &Setting) -> Option<RasterImage> {
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "image file not found");
        return None;
    }
    let decoded = raster::decode_file(path).and_then(|image| {
        let (width, height) = image.pixel_size();
        if width == 0 || height == 0 {
            Err(raster::empty_image(path))
        } else {
            Ok(image)
        }
    });
    match decoded {
        Ok(image) => Some(transform::prepare(image, setting)),
        Err(why) => {
            tracing::warn!(?why, path = %path.display(), "failed to decode image");
            None
        }
    }
}

fn render_text(font: Option<PathBuf>, setting: &Setting) -> Option<RasterImage> {
    if setting.text.is_empty() {
        return None;
    }
    let font = font.or_else(|| text_image::system_font().map(Path::to_path_buf))?;
    match text_image::render(&setting.text, setting.text_size as f32, &font) {
        Ok(Some(pixels)) => Some(transform::prepare_text(RasterImage::new(pixels), setting)),
        Ok(None) => None,
        Err(why) => {
            tracing::warn!(?why, font = %font.display(), "failed to render text");
            None
        }
    }
}

/// Variant-specific state, dispatched by tag.
#[derive(Debug)]
pub enum Variant {
    Single(StaticImage),
    SingleEach(StaticImage),
    Slideshow(Slideshow),
    TextImage(TextImage),
}

impl Variant {
    fn new(kind: BackgroundKind) -> Self {
        match kind {
            BackgroundKind::Single => Variant::Single(StaticImage),
            BackgroundKind::SingleEach => Variant::SingleEach(StaticImage),
            BackgroundKind::Slideshow => Variant::Slideshow(Slideshow::default()),
            BackgroundKind::TextImage => Variant::TextImage(TextImage),
        }
    }

    fn kind(&self) -> BackgroundKind {
        match self {
            Variant::Single(_) => BackgroundKind::Single,
            Variant::SingleEach(_) => BackgroundKind::SingleEach,
            Variant::Slideshow(_) => BackgroundKind::Slideshow,
            Variant::TextImage(_) => BackgroundKind::TextImage,
        }
    }

    /// Decides what to load. `None` means the image stays as it is.
    fn plan(
        &mut self,
        trigger: Trigger,
        setting: &Setting,
        scope: &Scope,
        env: &ProviderEnv,
    ) -> Option<LoadJob> {
        match self {
            Variant::Single(image) | Variant::SingleEach(image) => {
                (trigger == Trigger::Reload).then(|| image.plan(setting, scope, &env.base_dir))
            }
            Variant::Slideshow(show) => show.plan(trigger, setting, scope, &env.base_dir),
            Variant::TextImage(text) => {
                (trigger == Trigger::Reload).then(|| text.plan(setting, scope, &env.base_dir))
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ReloadState {
    in_flight: bool,
    pending: Option<Trigger>,
    generation: u64,
}

/// State shared between the provider and its configuration listener.
struct Shared {
    id: ProviderId,
    scope: Scope,
    env: ProviderEnv,
    variant: RefCell<Variant>,
    setting: RefCell<Setting>,
    current: RefCell<Option<Arc<RasterImage>>>,
    changed: Notifier<()>,
    reload: Cell<ReloadState>,
}

impl Shared {
    fn request(&self, trigger: Trigger) {
        let mut state = self.reload.get();
        if state.in_flight {
            state.pending = Some(state.pending.map_or(trigger, |queued| queued.merge(trigger)));
            self.reload.set(state);
            tracing::trace!(id = %self.id, ?trigger, "reload coalesced");
            return;
        }
        self.start(trigger);
    }

    fn start(&self, trigger: Trigger) {
        let setting = self.setting.borrow().clone();
        let job = self
            .variant
            .borrow_mut()
            .plan(trigger, &setting, &self.scope, &self.env);
        let Some(job) = job else {
            return;
        };

        let mut state = self.reload.get();
        state.generation += 1;
        state.in_flight = true;
        self.reload.set(state);
        let generation = state.generation;

        tracing::debug!(id = %self.id, scope = %self.scope, ?trigger, generation, "loading image");

        match &self.env.loader {
            Loader::Inline => {
                let loaded = job.run();
                self.complete(generation, loaded);
            }
            Loader::Background(sender) => {
                let sender = sender.clone();
                let provider = self.id;
                let spawned = std::thread::Builder::new()
                    .name(format!("backdrop-load-{}", provider.0))
                    .spawn(move || {
                        let loaded = job.run();
                        let _ = sender.send(Completed {
                            provider,
                            generation,
                            loaded,
                        });
                    });
                if let Err(why) = spawned {
                    tracing::error!(?why, id = %self.id, "failed to spawn load thread");
                    self.complete(generation, Loaded::default());
                }
            }
        }
    }

    fn complete(&self, generation: u64, loaded: Loaded) {
        let mut state = self.reload.get();
        if generation != state.generation {
            tracing::debug!(id = %self.id, generation, "discarding stale image");
            return;
        }

        if let Some(slides) = loaded.slides {
            if let Variant::Slideshow(show) = &mut *self.variant.borrow_mut() {
                show.install(slides);
            }
        }
        *self.current.borrow_mut() = loaded.image.map(Arc::new);
        let pending = state.pending.take();
        state.in_flight = false;
        self.reload.set(state);

        self.changed.emit(&());

        if let Some(trigger) = pending {
            self.start(trigger);
        }
    }
}

/// One image source bound to one configuration record.
pub struct Provider {
    entry: Rc<SettingEntry>,
    shared: Rc<Shared>,
    _config: Subscription,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.shared.id)
            .field("kind", &self.kind())
            .field("scope", &self.shared.scope)
            .field("has_image", &self.shared.current.borrow().is_some())
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Builds the provider, loads its first image and subscribes to `entry`.
    ///
    /// The provider owns its scope key; it may differ from `entry`'s scope when
    /// a workspace-bound provider reads the record that was in effect when it
    /// was created.
    pub fn new(
        id: ProviderId,
        kind: BackgroundKind,
        scope: Scope,
        entry: Rc<SettingEntry>,
        env: ProviderEnv,
    ) -> Self {
        let shared = Rc::new(Shared {
            id,
            scope,
            env,
            variant: RefCell::new(Variant::new(kind)),
            setting: RefCell::new(entry.get()),
            current: RefCell::new(None),
            changed: Notifier::new(),
            reload: Cell::new(ReloadState::default()),
        });

        let listener = Rc::clone(&shared);
        let config = entry.subscribe(move |setting: &Setting| {
            *listener.setting.borrow_mut() = setting.clone();
            listener.request(Trigger::Reload);
        });

        tracing::debug!(%id, ?kind, scope = %shared.scope, "provider created");
        shared.request(Trigger::Reload);

        Self {
            entry,
            shared,
            _config: config,
        }
    }

    pub fn id(&self) -> ProviderId {
        self.shared.id
    }

    /// The configuration record this provider follows.
    pub fn entry(&self) -> &Rc<SettingEntry> {
        &self.entry
    }

    /// Advances a slideshow. Other variants ignore ticks.
    pub fn tick(&self) {
        if self.kind() == BackgroundKind::Slideshow {
            self.shared.request(Trigger::Tick);
        }
    }

    /// Time until the next slideshow advance.
    pub fn tick_interval(&self) -> Duration {
        self.shared.setting.borrow().tick_interval()
    }

    /// Directory a slideshow is showing, if this is one.
    pub fn slideshow_directory(&self) -> Option<PathBuf> {
        match &*self.shared.variant.borrow() {
            Variant::Slideshow(show) => show.directory().map(PathBuf::from),
            _ => None,
        }
    }

    /// Number of images a slideshow is rotating through.
    pub fn slideshow_len(&self) -> usize {
        match &*self.shared.variant.borrow() {
            Variant::Slideshow(show) => show.len(),
            _ => 0,
        }
    }

    /// Applies created or removed files to a slideshow's file set.
    pub fn on_directory_event(&self, event: &notify::Event) {
        if let Variant::Slideshow(show) = &mut *self.shared.variant.borrow_mut() {
            show.on_directory_event(event, &self.shared.setting.borrow());
        }
    }

    /// Accepts the result of a background load.
    pub fn complete(&self, generation: u64, loaded: Loaded) {
        self.shared.complete(generation, loaded);
    }

    /// Whether a load is currently running for this provider.
    pub fn is_loading(&self) -> bool {
        self.shared.reload.get().in_flight
    }
}

impl ImageProvider for Provider {
    fn current_image(&self) -> Option<Arc<RasterImage>> {
        self.shared.current.borrow().clone()
    }

    fn subscribe(&self, mut listener: Box<dyn FnMut()>) -> Subscription {
        self.shared.changed.subscribe(move |()| listener())
    }

    fn kind(&self) -> BackgroundKind {
        self.shared.variant.borrow().kind()
    }

    fn scope(&self) -> &Scope {
        &self.shared.scope
    }
}
