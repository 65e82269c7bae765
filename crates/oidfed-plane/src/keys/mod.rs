//! Key management for the federation entity

pub mod registry;

pub use registry::KeyRegistry;
