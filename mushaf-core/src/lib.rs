use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod annotation;
pub mod config;
pub mod error;
pub mod layout;
pub mod logging;
pub mod navigation;
pub mod persist;
pub mod store;
pub mod strokes;

#[cfg(test)]
pub(crate) mod test_support;

pub use annotation::{
    AnnotationAdapter, CanvasFactory, ChangeNotifier, FreehandCanvas, InputMode, ToolState,
};
pub use config::{AppDirs, AutosaveConfig, ReaderConfig};
pub use error::{NavigationError, StoreError};
pub use layout::{Orientation, Slot, Spread, TurnDirection};
pub use navigation::{
    ClearScope, Command, NavigationController, NavigationEvent, NavigationState, Phase,
};
pub use persist::Persister;
pub use store::{AnnotationStore, FileAnnotationStore, MemoryAnnotationStore};
pub use strokes::{EncodedStrokes, StrokeMap, StrokeSet};

pub type PageIndex = usize;

/// Stable identity of a document across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Keys a document by its file name, so annotations follow the file when
    /// it moves between directories.
    pub fn for_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

/// Intrinsic size of one page, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageHandle {
    pub index: PageIndex,
    pub width: f32,
    pub height: f32,
}

impl PageHandle {
    pub fn aspect_ratio(&self) -> f32 {
        if self.height <= 0.0 {
            return 1.0;
        }
        self.width / self.height
    }
}

pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    /// Returns `None` for indices outside `[0, page_count)`.
    fn page(&self, index: PageIndex) -> Option<PageHandle>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
}

/// Backend with a fixed page count and a uniform page size, for hosts that
/// lay pages out themselves.
pub struct StaticDocument {
    info: DocumentInfo,
    width: f32,
    height: f32,
}

impl StaticDocument {
    pub fn new(id: DocumentId, page_count: usize, width: f32, height: f32) -> Self {
        Self {
            info: DocumentInfo {
                id,
                page_count,
                metadata: DocumentMetadata::default(),
            },
            width,
            height,
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.info.metadata = metadata;
        self
    }
}

impl DocumentBackend for StaticDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page(&self, index: PageIndex) -> Option<PageHandle> {
        (index < self.info.page_count).then_some(PageHandle {
            index,
            width: self.width,
            height: self.height,
        })
    }
}
