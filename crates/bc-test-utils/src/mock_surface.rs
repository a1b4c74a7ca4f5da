//! Recording render surface.
//!
//! Keeps the containers and attachments the client asked for. Attaching to
//! a surface that was neither registered up front nor created as a container
//! fails with `UnknownSurface`, like a missing DOM target.
//!
//! `with_attach_gate` blocks the first attach on the calling thread until the
//! test releases it. Tests using it need a multi-threaded runtime.

use broadcast_client::errors::RenderError;
use broadcast_client::render::RenderSurface;
use broadcast_client::transport::MediaHandle;
use common::types::{MediaKind, SurfaceId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// Upper bound on a gated attach.
const GATE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct SurfaceInner {
    static_surfaces: HashSet<SurfaceId>,
    containers: Vec<SurfaceId>,
    attachments: HashMap<SurfaceId, Vec<MediaHandle>>,
    removed: Vec<SurfaceId>,
}

#[derive(Debug, Default)]
struct AttachGate {
    armed: AtomicBool,
    entered: Notify,
    released: Mutex<bool>,
    wake: Condvar,
}

impl AttachGate {
    fn hold(&self) {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return;
        }
        self.entered.notify_one();
        let mut released = self.released.lock().expect("gate lock poisoned");
        while !*released {
            let (guard, wait) = self
                .wake
                .wait_timeout(released, GATE_TIMEOUT)
                .expect("gate lock poisoned");
            released = guard;
            if wait.timed_out() {
                break;
            }
        }
    }
}

/// Render surface double that records every write.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    inner: Mutex<SurfaceInner>,
    gate: AttachGate,
}

impl RecordingSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-existing target such as the local preview element.
    #[must_use]
    pub fn with_surface(self, surface: impl Into<String>) -> Self {
        self.lock()
            .static_surfaces
            .insert(SurfaceId::new(surface));
        self
    }

    /// Block the first attach until [`release_attach`](Self::release_attach).
    #[must_use]
    pub fn with_attach_gate(self) -> Self {
        self.gate.armed.store(true, Ordering::SeqCst);
        self
    }

    /// Wait until the gated attach has started.
    pub async fn attach_started(&self) {
        self.gate.entered.notified().await;
    }

    /// Let the gated attach complete.
    pub fn release_attach(&self) {
        *self.gate.released.lock().expect("gate lock poisoned") = true;
        self.gate.wake.notify_all();
    }

    /// Containers currently present, in creation order.
    #[must_use]
    pub fn containers(&self) -> Vec<SurfaceId> {
        self.lock().containers.clone()
    }

    #[must_use]
    pub fn has_container(&self, container: &str) -> bool {
        self.lock()
            .containers
            .iter()
            .any(|id| id.as_str() == container)
    }

    /// Media kinds currently attached to `surface`.
    #[must_use]
    pub fn attached(&self, surface: &str) -> Vec<MediaKind> {
        self.lock()
            .attachments
            .get(&SurfaceId::new(surface))
            .map(|handles| handles.iter().map(|h| h.kind).collect())
            .unwrap_or_default()
    }

    /// Containers removed so far, in removal order.
    #[must_use]
    pub fn removed(&self) -> Vec<SurfaceId> {
        self.lock().removed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceInner> {
        self.inner.lock().expect("surface lock poisoned")
    }
}

impl RenderSurface for RecordingSurface {
    fn create_container(&self, container: &SurfaceId) -> Result<(), RenderError> {
        let mut inner = self.lock();
        if !inner.containers.contains(container) {
            inner.containers.push(container.clone());
        }
        Ok(())
    }

    fn attach(&self, surface: &SurfaceId, media: &MediaHandle) -> Result<(), RenderError> {
        self.gate.hold();
        let mut inner = self.lock();
        if !inner.static_surfaces.contains(surface) && !inner.containers.contains(surface) {
            return Err(RenderError::UnknownSurface(surface.to_string()));
        }
        let handles = inner.attachments.entry(surface.clone()).or_default();
        handles.retain(|h| h.kind != media.kind);
        handles.push(media.clone());
        Ok(())
    }

    fn detach(&self, surface: &SurfaceId, kind: MediaKind) {
        if let Some(handles) = self.lock().attachments.get_mut(surface) {
            handles.retain(|h| h.kind != kind);
        }
    }

    fn remove_container(&self, container: &SurfaceId) {
        let mut inner = self.lock();
        let before = inner.containers.len();
        inner.containers.retain(|id| id != container);
        if inner.containers.len() != before {
            inner.removed.push(container.clone());
        }
        inner.attachments.remove(container);
    }
}
