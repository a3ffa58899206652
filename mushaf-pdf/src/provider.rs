use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use mushaf_core::{DocumentBackend, DocumentId, DocumentMetadata, DocumentProvider};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::{PdfBook, LIBRARY_PATH_ENV};

pub struct PdfiumDocumentProvider {
    pdfium: Pdfium,
}

impl PdfiumDocumentProvider {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self { pdfium })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumDocumentProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let book = load_book(&self.pdfium, &absolute)?;
        debug!(
            path = %absolute.display(),
            pages = book.info().page_count,
            "pdf opened"
        );
        Ok(Arc::new(book))
    }
}

fn load_book(pdfium: &Pdfium, path: &Path) -> Result<PdfBook> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open {:?}", path))?;

    let page_sizes: Vec<(f32, f32)> = document
        .pages()
        .iter()
        .map(|page| (page.width().value, page.height().value))
        .collect();

    let metadata = document.metadata();
    let title = metadata_value(
        metadata
            .get(PdfDocumentMetadataTagType::Title)
            .as_ref()
            .map(|tag| tag.value()),
    );
    let author = metadata_value(
        metadata
            .get(PdfDocumentMetadataTagType::Author)
            .as_ref()
            .map(|tag| tag.value()),
    );

    Ok(PdfBook::new(
        DocumentId::for_path(path),
        DocumentMetadata { title, author },
        page_sizes,
    ))
}

/// Blank metadata entries are treated as missing.
fn metadata_value(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    match env::var(LIBRARY_PATH_ENV) {
        Ok(path) if !path.is_empty() => match Pdfium::bind_to_library(&path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!("failed to load Pdfium from {}={}: {}", LIBRARY_PATH_ENV, path, err);
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                LIBRARY_PATH_ENV,
                errors.join(", ")
            ))
        }
    }
}
