//! PDF-backed documents. Page sizes and metadata are read once when the file
//! is opened; drawing the pages is up to the host.

use mushaf_core::{
    DocumentBackend, DocumentId, DocumentInfo, DocumentMetadata, PageHandle, PageIndex,
};

#[cfg(feature = "pdf")]
mod provider;

#[cfg(feature = "pdf")]
pub use provider::PdfiumDocumentProvider;

/// Environment variable naming a pdfium library to bind before the default
/// search locations.
pub const LIBRARY_PATH_ENV: &str = "MUSHAF_PDFIUM_LIBRARY_PATH";

/// Page geometry and metadata of an opened PDF.
#[derive(Debug, Clone)]
pub struct PdfBook {
    info: DocumentInfo,
    pages: Vec<PageHandle>,
}

impl PdfBook {
    pub fn new<I>(id: DocumentId, metadata: DocumentMetadata, page_sizes: I) -> Self
    where
        I: IntoIterator<Item = (f32, f32)>,
    {
        let pages: Vec<PageHandle> = page_sizes
            .into_iter()
            .enumerate()
            .map(|(index, (width, height))| PageHandle {
                index,
                width,
                height,
            })
            .collect();
        Self {
            info: DocumentInfo {
                id,
                page_count: pages.len(),
                metadata,
            },
            pages,
        }
    }
}

impl DocumentBackend for PdfBook {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page(&self, index: PageIndex) -> Option<PageHandle> {
        self.pages.get(index).copied()
    }
}
