//! Boundary with the host RPC runtime.
//!
//! The balancer owns no network I/O. The runtime creates connections, drives
//! them, and reports their state back; the balancer only asks for
//! connections, requests (re)connects, and publishes pickers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   new_connection / update_state   ┌──────────────────┐
//! │                  │ ─────────────────────────────────►│                  │
//! │  ConnectionPool  │                                   │   Host runtime   │
//! │  (event loop)    │ ◄───────────────────────────────  │ (ChannelController)
//! │                  │   resolved addresses / states     │                  │
//! └────────┬─────────┘                                   └────────┬─────────┘
//!          │ connect / update_addresses                           │ owns
//!          ▼                                                      ▼
//!   Arc<dyn SubConnection>  ─────────── same handle ───────  socket, streams
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Backend addresses and connection handles |
//! | `controller` | Channel-level callbacks into the runtime |

// ============================================================================
// Submodules
// ============================================================================

/// Backend addresses and connection handles.
pub mod connection;

/// Channel-level callbacks into the runtime.
pub mod controller;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Address, NewConnectionOptions, SubConnection};
pub use controller::ChannelController;
