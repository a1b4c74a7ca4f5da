//! Mock capture devices.
//!
//! Every opened track is remembered so tests can check that rollback and
//! leave closed it, and that mute/video toggles reached the device.

use async_trait::async_trait;
use broadcast_client::errors::DeviceError;
use broadcast_client::media::{CaptureDevices, LocalTrack};
use broadcast_client::transport::MediaHandle;
use common::types::MediaKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Observable state of one opened mock track.
#[derive(Debug)]
pub struct TrackRecord {
    kind: MediaKind,
    handle: MediaHandle,
    enabled: AtomicBool,
    closed: AtomicBool,
}

impl TrackRecord {
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    #[must_use]
    pub fn handle(&self) -> MediaHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Track handed out by [`MockCaptureDevices`].
#[derive(Debug)]
pub struct MockTrack {
    record: Arc<TrackRecord>,
}

#[async_trait]
impl LocalTrack for MockTrack {
    fn kind(&self) -> MediaKind {
        self.record.kind
    }

    fn handle(&self) -> MediaHandle {
        self.record.handle.clone()
    }

    fn is_enabled(&self) -> bool {
        self.record.is_enabled()
    }

    async fn set_enabled(&self, enabled: bool) -> Result<(), DeviceError> {
        if self.record.is_closed() {
            return Err(DeviceError::Failed {
                kind: self.record.kind,
                reason: "track closed".to_string(),
            });
        }
        self.record.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.record.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct MockDevicesInner {
    failures: HashMap<MediaKind, DeviceError>,
    opened: Vec<Arc<TrackRecord>>,
}

/// Mock microphone and camera.
#[derive(Debug, Default)]
pub struct MockCaptureDevices {
    inner: Mutex<MockDevicesInner>,
}

impl MockCaptureDevices {
    /// Create devices where every open succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every open of `kind` with `error`.
    #[must_use]
    pub fn with_failure(self, kind: MediaKind, error: DeviceError) -> Self {
        self.inner.lock().unwrap().failures.insert(kind, error);
        self
    }

    /// Every track opened so far, in open order.
    #[must_use]
    pub fn opened(&self) -> Vec<Arc<TrackRecord>> {
        self.inner.lock().unwrap().opened.clone()
    }

    /// Most recently opened track of `kind`.
    #[must_use]
    pub fn latest(&self, kind: MediaKind) -> Option<Arc<TrackRecord>> {
        self.opened().into_iter().rev().find(|record| record.kind == kind)
    }

    /// Number of opened tracks that were not closed.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened()
            .iter()
            .filter(|record| !record.is_closed())
            .count()
    }
}

#[async_trait]
impl CaptureDevices for MockCaptureDevices {
    async fn open(&self, kind: MediaKind) -> Result<Box<dyn LocalTrack>, DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.failures.get(&kind) {
            return Err(error.clone());
        }

        let record = Arc::new(TrackRecord {
            kind,
            handle: MediaHandle::new(format!("local-{kind}-{}", Uuid::new_v4()), kind),
            enabled: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        });
        inner.opened.push(Arc::clone(&record));
        Ok(Box::new(MockTrack { record }))
    }
}
