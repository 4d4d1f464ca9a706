//! # intercom-core
//!
//! Call domain model and session orchestration for the Intercom realtime
//! communications manager.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Call** - The call document: identity snapshot, signaling state, outcome
//! - **CallStore** - Persistence contract with optimistic concurrency
//! - **Ports** - Media bridge, presence directory, and event sink seams
//! - **CallOrchestrator** - The state machine that drives a call through
//!   offer/answer signaling and teardown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │ API adapter │────▶│ CallOrchestrator │────▶│  CallStore  │
//! └─────────────┘     └──────────────────┘     └─────────────┘
//!                        │            │
//!                        ▼            ▼
//!                 ┌─────────────┐ ┌─────────────┐
//!                 │ MediaBridge │ │  EventSink  │
//!                 └─────────────┘ └─────────────┘
//! ```

pub mod call;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod ports;
pub mod store;

pub use call::{ActiveCall, Call, CallDirection, CallState, EndReason, Role};
pub use error::{CallError, ErrorKind};
pub use events::CallEvent;
pub use orchestrator::{CallOrchestrator, InitiatedCall, JoinedCall};
pub use ports::{BridgeError, EndpointOffer, EventSink, MediaBridge, PresenceDirectory, PresenceInfo};
pub use store::{CallStore, StoreError, UpdateError};
