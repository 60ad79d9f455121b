//! KUDO Bridge CRD Definitions
//!
//! Custom resources owned by the bridge controllers plus the subset of the
//! KUDO API (`kudo.dev/v1beta1`) the watcher reads and writes.

pub mod bridge_instance;
pub mod error;
pub mod kudo;
mod schema;

pub use bridge_instance::*;
pub use error::CrdError;
pub use kudo::*;
