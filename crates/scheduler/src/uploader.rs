//! Incremental texture uploader driven by the render loop's idle hook.
//!
//! Uploading every tile of a large image in one frame would blow the frame
//! budget. The uploader queues textures and, on each idle tick, uploads tiles
//! from the head of the queue until the queue drains or the upload budget is
//! spent. Whatever is left waits for the next tick.

use crate::frame_budget::{FrameBudget, UPLOAD_BUDGET};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// Something that can be uploaded to the GPU one tile at a time.
pub trait UploadTask<C: ?Sized>: Send + Sync {
    /// Whether every tile has been uploaded
    fn is_ready(&self) -> bool;

    /// Upload the next tile.
    ///
    /// Returns `true` once every tile has been uploaded.
    fn upload_next_tile(&self, canvas: &mut C) -> bool;
}

/// Callback run by the render loop when it has no other work.
pub trait IdleListener<C: ?Sized>: Send + Sync {
    /// Do a slice of deferred work.
    ///
    /// Returning `true` keeps the listener registered for the next idle tick;
    /// returning `false` removes it.
    fn on_idle(&self, canvas: &mut C, render_requested: bool) -> bool;
}

/// The render loop the uploader attaches to.
///
/// Implementations must not call back into a listener from inside
/// [`RenderLoop::add_idle_listener`]; listeners run on the next idle tick.
/// The uploader never holds its queue while registering, so a loop may keep
/// its own lock held while it runs listeners.
pub trait RenderLoop<C: ?Sized>: Send + Sync {
    /// Register a listener for idle ticks
    fn add_idle_listener(&self, listener: Arc<dyn IdleListener<C>>);

    /// Ask for a new frame to be drawn
    fn request_render(&self);
}

struct UploadQueue<T: ?Sized> {
    textures: VecDeque<Arc<T>>,
    registered: bool,
}

/// Time-budgeted tile uploader, one per render surface.
///
/// Textures upload in the order they were added. A texture's tiles upload
/// strictly in index order, and the head texture is drained before the next
/// one starts; only the budget interrupts it.
///
/// The uploader registers itself as an idle listener when the first texture
/// arrives, stays registered while work remains, and drops off the render
/// loop once the queue is empty.
pub struct Uploader<T: ?Sized, C: ?Sized> {
    render_loop: Arc<dyn RenderLoop<C>>,
    queue: Mutex<UploadQueue<T>>,
    budget: Duration,
    this: Weak<Self>,
}

impl<T, C> Uploader<T, C>
where
    T: UploadTask<C> + ?Sized + 'static,
    C: ?Sized + 'static,
{
    /// Create an uploader with the default 4ms budget
    pub fn new(render_loop: Arc<dyn RenderLoop<C>>) -> Arc<Self> {
        Self::with_budget(render_loop, UPLOAD_BUDGET)
    }

    /// Create an uploader with a custom per-tick budget
    pub fn with_budget(render_loop: Arc<dyn RenderLoop<C>>, budget: Duration) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            render_loop,
            queue: Mutex::new(UploadQueue {
                textures: VecDeque::new(),
                registered: false,
            }),
            budget,
            this: this.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, UploadQueue<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a texture for upload.
    ///
    /// A texture that is already fully uploaded is ignored.
    pub fn add_texture(&self, texture: Arc<T>) {
        if texture.is_ready() {
            return;
        }

        let pending = {
            let mut queue = self.lock();
            queue.textures.push_back(texture);
            if queue.registered {
                return;
            }
            queue.registered = true;
            queue.textures.len()
        };

        // Registered with the queue unlocked
        if let Some(this) = self.this.upgrade() {
            debug!(pending, "uploader registered for idle ticks");
            self.render_loop.add_idle_listener(this);
        }
    }

    /// Drop every queued texture
    pub fn clear(&self) {
        self.lock().textures.clear();
    }

    /// Number of textures waiting for upload
    pub fn pending(&self) -> usize {
        self.lock().textures.len()
    }

    /// Whether the uploader is currently registered with the render loop
    pub fn is_registered(&self) -> bool {
        self.lock().registered
    }

    /// Per-tick upload budget
    pub fn budget(&self) -> Duration {
        self.budget
    }
}

impl<T, C> IdleListener<C> for Uploader<T, C>
where
    T: UploadTask<C> + ?Sized + 'static,
    C: ?Sized + 'static,
{
    fn on_idle(&self, canvas: &mut C, _render_requested: bool) -> bool {
        let mut queue = self.lock();
        let budget = FrameBudget::new(self.budget);
        let mut steps = 0usize;

        while !budget.is_exceeded() {
            let Some(texture) = queue.textures.front() else {
                break;
            };
            if texture.upload_next_tile(canvas) {
                queue.textures.pop_front();
            }
            steps += 1;
            self.render_loop.request_render();
        }

        queue.registered = !queue.textures.is_empty();
        trace!(
            steps,
            remaining = queue.textures.len(),
            elapsed_us = budget.elapsed().as_micros() as u64,
            "upload tick"
        );
        queue.registered
    }
}
