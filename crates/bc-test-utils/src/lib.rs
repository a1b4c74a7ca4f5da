//! # Broadcast Client Test Utilities
//!
//! Mock implementations of the external collaborators and a wired-up session
//! harness for testing the broadcast client without a media SDK, devices or
//! a credential backend.
//!
//! ## Modules
//!
//! - `mock_transport` - Mock media SDK with call recording and event injection
//! - `mock_devices` - Mock microphone and camera with track records
//! - `mock_surface` - Render surface that records containers and attachments
//! - `mock_credentials` - Credential provider with fetch/invalidate counters
//! - `fixtures` - Test configuration, credentials and the `TestSession` harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let session = TestSession::builder()
//!         .devices(MockCaptureDevices::new().with_failure(MediaKind::Video, DeviceError::Busy(MediaKind::Video)))
//!         .build();
//!
//!     let err = session.orchestrator.join(Role::Host).await.unwrap_err();
//!     assert_eq!(session.devices.open_count(), 0);
//! }
//! ```

pub mod fixtures;
pub mod mock_credentials;
pub mod mock_devices;
pub mod mock_surface;
pub mod mock_transport;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_credentials::*;
pub use mock_devices::*;
pub use mock_surface::*;
pub use mock_transport::*;
