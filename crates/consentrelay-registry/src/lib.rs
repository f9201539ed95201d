//! Registry clients: HTTP access to gICS behind the `PolicyRegistry` capability.

#[cfg(feature = "http")]
pub mod gics;

#[cfg(feature = "http")]
pub use gics::{GicsClient, GicsError};
