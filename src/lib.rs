//! # Streaming Updates Client
//!
//! A client library that keeps a local, incrementally-updated view of
//! server-owned entities synchronized over one long-lived, bidirectional
//! connection, with transparent reconnection, ordered delivery, and
//! resumable catch-up after network interruption.
//!
//! ## Core Concepts
//!
//! - **KeyCache**: per-entity-type cache of known primary keys and the
//!   highest sequence number observed, used as the resync cursor
//! - **Subscription specs**: filter criteria describing what to watch
//! - **Sync markers**: boundary events around a subscription's catch-up
//! - **Stream**: the pull-driven state machine owning the transport
//!
//! ## Example
//!
//! ```ignore
//! use syncstream::{ProjectSpec, Stream, SubscriptionSpec, WebSocketTransport};
//!
//! let mut stream = Stream::new(WebSocketTransport::new("ws://example.com/stream"));
//! stream.subscribe(
//!     Some("initial".to_string()),
//!     SubscriptionSpec::new().with_projects(ProjectSpec::new().workspace(1)),
//! )?;
//!
//! for event in &mut stream {
//!     println!("{:?}", event?);
//! }
//! ```

pub mod cache;
pub mod error;
pub mod ranges;
pub mod spec;
pub mod stream;
pub mod transport;
pub mod wire;

// Re-exports
pub use cache::KeyCache;
pub use error::{Result, StreamError};
pub use spec::{ProjectSpec, SubscriptionSpec};
pub use stream::{Event, Stream, Sync};
pub use transport::{Transport, TransportEvent, WebSocketTransport};
pub use wire::{ProjectMsg, ProjectsDeleted, SubscribeFrame, SyncFrame};
