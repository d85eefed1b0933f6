#![forbid(unsafe_code)]

pub mod audio;
pub mod effect;
pub mod encode;
pub mod error;
pub mod frame;
pub mod manifest;
pub mod media;
pub mod musicgen;
pub mod render;
pub mod resolution;
pub mod timeline;

pub use error::{StillcastError, StillcastResult};
pub use resolution::Resolution;
