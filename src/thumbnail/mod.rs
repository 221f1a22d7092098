//! Street-image thumbnails: fetch, render to a small data URL, memoize.
//!
//! Every request settles to a [`ThumbnailRef`]; failures become a tinted
//! fallback icon instead of an error.

pub mod cache;
pub mod preload;
pub mod render;

use serde::{Deserialize, Serialize};

/// Why a thumbnail fell back to the placeholder icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The fetch did not finish within the deadline.
    Timeout,
    /// Transport, HTTP status or decode failure.
    Error,
}

impl FailureKind {
    /// Tint of the fallback icon.
    pub fn color(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "#ffc107",
            FailureKind::Error => "#dc3545",
        }
    }
}

/// A settled thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThumbnailRef {
    Rendered { data_url: String },
    Fallback { kind: FailureKind, data_url: String },
}

impl ThumbnailRef {
    pub fn fallback(kind: FailureKind) -> Self {
        ThumbnailRef::Fallback {
            kind,
            data_url: render::fallback_icon(kind),
        }
    }

    pub fn data_url(&self) -> &str {
        match self {
            ThumbnailRef::Rendered { data_url } | ThumbnailRef::Fallback { data_url, .. } => data_url,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ThumbnailRef::Fallback { .. })
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            ThumbnailRef::Fallback { kind, .. } => Some(*kind),
            ThumbnailRef::Rendered { .. } => None,
        }
    }
}

/// What the cache knows about one image without doing any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailState {
    Ready(ThumbnailRef),
    Pending,
    Missing,
}
