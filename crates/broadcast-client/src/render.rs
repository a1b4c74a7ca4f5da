//! Render surface seam.
//!
//! The UI layer owns the render targets; this crate only addresses them by
//! opaque [`SurfaceId`]. Both the local media controller and the remote
//! participant registry write through one [`SharedSurface`], which applies
//! writes one at a time.

use crate::errors::RenderError;
use crate::transport::MediaHandle;
use common::types::{MediaKind, SurfaceId};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Platform render target collection (enables mocking).
pub trait RenderSurface: Send + Sync {
    /// Create a container that media can be attached to.
    fn create_container(&self, container: &SurfaceId) -> Result<(), RenderError>;

    /// Attach a media stream to a surface.
    fn attach(&self, surface: &SurfaceId, media: &MediaHandle) -> Result<(), RenderError>;

    /// Stop rendering one media kind on a surface. Unknown surfaces are ignored.
    fn detach(&self, surface: &SurfaceId, kind: MediaKind);

    /// Remove a container and everything attached to it. Unknown containers are ignored.
    fn remove_container(&self, container: &SurfaceId);
}

/// Serializing handle to a [`RenderSurface`] shared between writers.
#[derive(Clone)]
pub struct SharedSurface {
    inner: Arc<dyn RenderSurface>,
    write_lock: Arc<Mutex<()>>,
}

impl SharedSurface {
    #[must_use]
    pub fn new(inner: Arc<dyn RenderSurface>) -> Self {
        Self {
            inner,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn create_container(&self, container: &SurfaceId) -> Result<(), RenderError> {
        let _guard = self.write_lock.lock().await;
        self.inner.create_container(container)
    }

    pub async fn attach(&self, surface: &SurfaceId, media: &MediaHandle) -> Result<(), RenderError> {
        let _guard = self.write_lock.lock().await;
        self.inner.attach(surface, media)
    }

    pub async fn detach(&self, surface: &SurfaceId, kind: MediaKind) {
        let _guard = self.write_lock.lock().await;
        self.inner.detach(surface, kind);
    }

    pub async fn remove_container(&self, container: &SurfaceId) {
        let _guard = self.write_lock.lock().await;
        self.inner.remove_container(container);
    }
}
