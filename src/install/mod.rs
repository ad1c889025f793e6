//! Pre-script orchestration

mod installer;

pub use installer::*;
