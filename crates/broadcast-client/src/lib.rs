//! Broadcast Client Library
//!
//! Session orchestration for a real-time audio/video broadcast. A participant
//! joins a channel as a publishing **Host** or a receive-only **Audience**
//! member; the library manages local capture tracks, reacts to remote
//! presence events and keeps render containers in sync with the live
//! participant set.
//!
//! # Architecture
//!
//! ```text
//! SessionOrchestrator (one per participant session)
//! ├── CredentialProvider       credential backend + cache
//! ├── TransportClient          wraps the media SDK, normalizes errors
//! ├── LocalMediaController     owns capture tracks (hosts only)
//! ├── RemoteParticipantRegistry
//! │   └── fed by the event pump task draining TransportEvents
//! └── SharedSurface            serialized writes to the render surface
//! ```
//!
//! The media SDK, capture devices and render surface are external; they are
//! reached through the [`transport::MediaTransport`],
//! [`media::CaptureDevices`] and [`render::RenderSurface`] traits.
//!
//! # Key Design Decisions
//!
//! - **Single state guard**: every session transition is one check-and-set
//!   on a `watch` channel
//! - **Full rollback**: a failed join never leaves tracks, containers or a
//!   live transport behind
//! - **Peer isolation**: a subscribe failure only affects that participant
//!
//! # Modules
//!
//! - [`config`] - Environment configuration
//! - [`credentials`] - Session credential provider and cache
//! - [`errors`] - Error taxonomy
//! - [`media`] - Local capture tracks
//! - [`observability`] - Tracing setup and metrics
//! - [`orchestrator`] - Session lifecycle
//! - [`registry`] - Remote participants
//! - [`render`] - Render surface seam
//! - [`transport`] - Media transport wrapper

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod credentials;
pub mod errors;
pub mod media;
pub mod observability;
pub mod orchestrator;
pub mod registry;
pub mod render;
pub mod transport;

pub use errors::SessionError;
pub use orchestrator::{SessionOrchestrator, SessionState};
