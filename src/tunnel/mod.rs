//! Per-project ngrok tunnels run as Docker sidecars.
//!
//! Each project with tunneling enabled gets one container, `ngrok-<project>`,
//! running the ngrok agent against `<project>.workspace:80`. Starting a tunnel
//! creates the container on demand and watches its console output until the
//! public forwarding URL appears.
//!
//! # Lifecycle
//!
//! ```text
//!   Absent ──start──▶ Creating ──attach+start──▶ AwaitingLink ──link/end/deadline──▶ Running
//!     ▲                  │                                                             │
//!     │                  └──────────── error (container removed) ──────────┐          │
//!     └───────────────────────────────────── stop ◀─────────────────────────┴──────────┘
//! ```
//!
//! Only the wait for the link suspends; it is bounded by the configured
//! deadline and can be cancelled. The container outlives the wait under its
//! `always` restart policy.

pub mod error;
pub mod link;
mod manager;

pub use error::{Result, TunnelError};
pub use link::{LinkScanner, extract_forwarding_link};
pub use manager::{
    LINK_SETTLE, LinkOutcome, StartOptions, StartOutcome, TunnelManager, TunnelState,
    container_name, parse_public_url, wait_for_link,
};
