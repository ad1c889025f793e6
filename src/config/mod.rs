//! Configuration

mod profile;
pub mod request;
pub mod targets;

pub use profile::*;
pub use request::{PartitionRequest, RequestSize};
pub use targets::Target;
