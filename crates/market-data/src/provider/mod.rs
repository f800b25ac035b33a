//! Price source implementations.

pub mod iex_cloud;
