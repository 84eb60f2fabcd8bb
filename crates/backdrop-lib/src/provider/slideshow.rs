// SPDX-License-Identifier: MPL-2.0

//! Timed rotation over the images of a directory.

use super::{LoadJob, Trigger};
use backdrop_config::{Scope, Setting};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    #[default]
    Sequential,
    /// Uniformly random among the images not yet shown in the current loop.
    Shuffle,
}

/// Position of a slideshow within its file set.
///
/// The first [`SlideCursor::advance`] on a fresh cursor yields the first
/// index. Without looping the cursor stops on the last image it reached.
#[derive(Debug)]
pub struct SlideCursor {
    len: usize,
    position: Option<usize>,
    looping: bool,
    order: Order,
    seen: Vec<bool>,
    rng: StdRng,
}

impl Default for SlideCursor {
    fn default() -> Self {
        Self::new(0, Order::Sequential, true)
    }
}

impl SlideCursor {
    pub fn new(len: usize, order: Order, looping: bool) -> Self {
        Self::with_rng(len, order, looping, StdRng::from_os_rng())
    }

    /// Cursor with a deterministic shuffle sequence.
    pub fn with_seed(len: usize, order: Order, looping: bool, seed: u64) -> Self {
        Self::with_rng(len, order, looping, StdRng::seed_from_u64(seed))
    }

    fn with_rng(len: usize, order: Order, looping: bool, rng: StdRng) -> Self {
        Self {
            len,
            position: None,
            looping,
            order,
            seen: vec![false; len],
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Moves to the next image and returns its index, or `None` if there are
    /// no images.
    pub fn advance(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }

        let next = match self.order {
            Order::Sequential => match self.position {
                None => 0,
                Some(position) if position + 1 < self.len => position + 1,
                Some(_) if self.looping => 0,
                Some(position) => position,
            },
            Order::Shuffle => {
                if self.seen.iter().all(|seen| *seen) {
                    if let (false, Some(position)) = (self.looping, self.position) {
                        return Some(position);
                    }
                    self.seen.fill(false);
                }
                let unseen: Vec<usize> = (0..self.len).filter(|&i| !self.seen[i]).collect();
                unseen[self.rng.random_range(0..unseen.len())]
            }
        };

        self.seen[next] = true;
        self.position = Some(next);
        Some(next)
    }

    /// Accounts for an image appended to the end of the set.
    pub fn push(&mut self) {
        self.len += 1;
        self.seen.push(false);
    }

    /// Accounts for the image at `index` leaving the set. When the current
    /// image is removed, the next advance continues with its successor.
    pub fn remove(&mut self, index: usize) {
        if index >= self.len {
            return;
        }
        self.len -= 1;
        self.seen.remove(index);
        self.position = match self.position {
            Some(position) if position > index => Some(position - 1),
            Some(position) if position == index => index.checked_sub(1),
            other => other,
        };
        if self.len == 0 {
            self.position = None;
        }
    }
}

/// The images of a slideshow directory and the rotation over them.
#[derive(Debug, Default)]
pub struct Slides {
    files: Vec<PathBuf>,
    cursor: SlideCursor,
}

impl Slides {
    /// Lists `directory` and moves to its first image, which is returned.
    pub fn scan(directory: &Path, setting: &Setting) -> (Self, Option<PathBuf>) {
        let files = list_images(directory, setting);
        let order = if setting.shuffle_slideshow {
            Order::Shuffle
        } else {
            Order::Sequential
        };
        let mut slides = Self {
            cursor: SlideCursor::new(files.len(), order, setting.loop_slideshow),
            files,
        };
        let first = slides.cursor.advance().map(|index| slides.files[index].clone());
        (slides, first)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The next image, or `None` when the rotation stays where it is.
    fn advance(&mut self) -> Option<PathBuf> {
        let before = self.cursor.position();
        let next = self.cursor.advance()?;
        if before == Some(next) {
            return None;
        }
        Some(self.files[next].clone())
    }
}

#[derive(Debug, Default)]
pub struct Slideshow {
    directory: Option<PathBuf>,
    slides: Slides,
}

impl Slideshow {
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// A reload lists the directory on the loader; a tick moves the rotation
    /// over the files already known.
    pub fn plan(
        &mut self,
        trigger: Trigger,
        setting: &Setting,
        scope: &Scope,
        base_dir: &Path,
    ) -> Option<LoadJob> {
        match trigger {
            Trigger::Reload => {
                let directory = setting.resolved_image_directory(scope, base_dir);
                self.directory = Some(directory.clone());
                Some(LoadJob::Slideshow {
                    directory,
                    setting: setting.clone(),
                })
            }
            Trigger::Tick => self.slides.advance().map(|path| LoadJob::File {
                path,
                setting: setting.clone(),
            }),
        }
    }

    /// Replaces the file set with the result of a directory listing.
    pub fn install(&mut self, slides: Slides) {
        self.slides = slides;
    }

    /// Keeps the file set in step with the watched directory without resetting
    /// the rotation.
    pub fn on_directory_event(&mut self, event: &notify::Event, setting: &Setting) {
        let Some(directory) = self.directory.as_deref() else {
            return;
        };
        let slides = &mut self.slides;

        match event.kind {
            notify::EventKind::Create(CreateKind::Folder) => {}
            notify::EventKind::Create(_)
            | notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in &event.paths {
                    if path.parent() == Some(directory)
                        && setting.matches_extension(path)
                        && !slides.files.contains(path)
                    {
                        tracing::debug!(path = %path.display(), "slideshow image added");
                        slides.files.push(path.clone());
                        slides.cursor.push();
                    }
                }
            }
            notify::EventKind::Remove(_)
            | notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    if let Some(index) = slides.files.iter().position(|file| file == path) {
                        tracing::debug!(path = %path.display(), "slideshow image removed");
                        slides.files.remove(index);
                        slides.cursor.remove(index);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Files directly inside `directory` whose names match the configured
/// extensions, sorted by path.
pub fn list_images(directory: &Path, setting: &Setting) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| setting.matches_extension(path))
        .collect();
    files.sort();
    files
}
