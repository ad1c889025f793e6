//! Disk measurement, allocation and partitioning

pub mod detection;
pub mod formatting;
pub mod layouts;
pub mod lvm;
pub mod partitioning;
pub mod validation;
