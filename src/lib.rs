//! LiveDoc: serve a directory of diagram sources and images as embeddable images.
//!
//! Diagram sources are rendered through a Kroki-compatible service on every
//! request; static images are served unmodified. Every failure is answered with
//! an SVG error panel so Markdown viewers never show a broken image.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
