use std::error::Error as StdError;

use axum::response::Response;
use thiserror::Error;

use crate::{
    application::{files::FileError, kroki::RenderFailure, kroki::RenderFailureKind},
    config::LoadError,
    domain::{error::ErrorKind, path::PathRejection},
    infra::error::InfraError,
    util::bytes::format_bytes,
};

/// Diagnostic detail for a failed request, carried in response extensions
/// so the logging middleware can report it.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub kind: ErrorKind,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, kind: ErrorKind, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            kind,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Why a single asset request ended in an error image.
#[derive(Debug, Error)]
pub enum AssetFailure {
    #[error("invalid path: {0}")]
    InvalidPath(#[source] PathRejection),
    #[error("malformed request path: {detail}")]
    MalformedPath { detail: String },
    #[error("unsupported extension {extension:?}")]
    UnsupportedFormat { extension: Option<String> },
    #[error("file not found: {path}")]
    FileNotFound { path: String },
    #[error("file {path} is {actual} bytes, limit is {limit}")]
    FileTooLarge { path: String, actual: u64, limit: u64 },
    #[error("failed to read {path}")]
    Unreadable {
        path: String,
        #[source]
        source: FileError,
    },
    #[error("render failed")]
    Render(#[from] RenderFailure),
    #[error("request handling panicked: {0}")]
    Panicked(String),
}

impl AssetFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssetFailure::InvalidPath(_) | AssetFailure::MalformedPath { .. } => {
                ErrorKind::PathTraversal
            }
            AssetFailure::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            AssetFailure::FileNotFound { .. } => ErrorKind::FileNotFound,
            AssetFailure::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            AssetFailure::Render(failure) if failure.kind == RenderFailureKind::SyntaxError => {
                ErrorKind::SyntaxError
            }
            AssetFailure::Render(_) => ErrorKind::ServiceError,
            AssetFailure::Unreadable { .. } | AssetFailure::Panicked(_) => ErrorKind::Unknown,
        }
    }

    /// Text drawn into the error image.
    pub fn message(&self) -> String {
        match self {
            AssetFailure::InvalidPath(reason) => format!(
                "Invalid path ({reason}). Path traversal attempts (using \"..\") are not allowed for security reasons."
            ),
            AssetFailure::MalformedPath { .. } => {
                "Invalid path. The request path could not be decoded.".to_string()
            }
            AssetFailure::UnsupportedFormat { extension } => {
                let extension = extension
                    .as_deref()
                    .map(|ext| format!(".{ext}"))
                    .unwrap_or_else(|| "(none)".to_string());
                format!(
                    "The file extension \"{extension}\" is not supported. Supported formats include .puml, .mmd, .d2, .png, .jpg, .svg, and more."
                )
            }
            AssetFailure::FileNotFound { path } => {
                format!("The file \"{path}\" does not exist or cannot be accessed.")
            }
            AssetFailure::FileTooLarge { actual, limit, .. } => format!(
                "File size ({}) exceeds the maximum allowed size of {}.",
                size_label(*actual),
                size_label(*limit)
            ),
            AssetFailure::Unreadable { path, source } => {
                format!("The file \"{path}\" could not be read: {source}")
            }
            AssetFailure::Render(failure) => match failure.kind {
                RenderFailureKind::SyntaxError => format!(
                    "Diagram contains syntax errors. {}",
                    failure
                        .details
                        .as_deref()
                        .unwrap_or("Please check your diagram source code.")
                ),
                _ => format!("Failed to render diagram via Kroki service. {failure}"),
            },
            AssetFailure::Panicked(_) => "An unexpected error occurred while handling this request.".to_string(),
        }
    }
}

/// Byte count with a non-breaking space between number and unit.
fn size_label(bytes: u64) -> String {
    format_bytes(bytes).replace(' ', "\u{a0}")
}

/// Process-level failures surfaced by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
