//! kspart library - kickstart partitioning pre-script

pub mod config;
pub mod disk;
pub mod install;
pub mod kickstart;
pub mod utils;

pub use config::KickstartConfig;
pub use utils::error::KickstartError;
