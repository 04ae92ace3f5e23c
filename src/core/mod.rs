//! Core types, errors, and utilities

pub mod camera;
pub mod error;
pub mod logging;
pub mod types;

pub use camera::CameraPose;
pub use error::Error;
pub use types::Result;
