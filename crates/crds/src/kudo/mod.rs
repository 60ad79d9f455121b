//! KUDO resources (`kudo.dev/v1beta1`)
//!
//! Only the fields the bridge reads or writes are typed; the remaining plan
//! and task structures are carried as raw JSON. Schemas are owned by KUDO, so
//! schema generation is disabled.

pub mod instance;
pub mod operator;
pub mod operator_version;

pub use instance::*;
pub use operator::*;
pub use operator_version::*;

/// API group of the KUDO resources
pub const KUDO_GROUP: &str = "kudo.dev";

/// Label KUDO puts on instances naming their operator
pub const OPERATOR_LABEL: &str = "kudo.dev/operator";
