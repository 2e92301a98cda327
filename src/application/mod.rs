//! Request handling: rendering, error images and the per-request pipeline.

pub mod error;
pub mod error_image;
pub mod files;
pub mod kroki;
pub mod pipeline;
