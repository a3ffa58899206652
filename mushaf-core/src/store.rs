use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use tracing::warn;
use uuid::Uuid;

use crate::error::StoreError;
use crate::strokes::EncodedStrokes;
use crate::{DocumentId, PageIndex};

/// Durable mapping from document to its annotations and last viewed page.
pub trait AnnotationStore: Send + Sync {
    /// Replaces the whole stroke map of `document`.
    fn put(&self, document: &DocumentId, strokes: &EncodedStrokes) -> Result<(), StoreError>;
    /// Returns an empty map when nothing was stored.
    fn get(&self, document: &DocumentId) -> Result<EncodedStrokes, StoreError>;
    fn clear(&self, document: &DocumentId) -> Result<(), StoreError>;
    fn put_last_page(&self, document: &DocumentId, page: PageIndex) -> Result<(), StoreError>;
    fn get_last_page(&self, document: &DocumentId) -> Result<Option<PageIndex>, StoreError>;
}

static STORE_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0d6a52-8c4e-5b1a-9d27-6e41c0b8a913").expect("valid namespace UUID")
});

fn file_stem_for(document: &DocumentId) -> String {
    Uuid::new_v5(&STORE_NAMESPACE, document.as_str().as_bytes()).to_string()
}

pub(crate) fn page_key(page: PageIndex) -> String {
    page.to_string()
}

pub(crate) fn parse_page_key(key: &str) -> Option<PageIndex> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize)]
struct StrokeFile {
    document: DocumentId,
    #[serde_as(as = "BTreeMap<_, Base64>")]
    pages: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BookmarkFile {
    document: DocumentId,
    page: PageIndex,
}

/// JSON files under a state directory, one per document and concern.
pub struct FileAnnotationStore {
    strokes_dir: PathBuf,
    bookmarks_dir: PathBuf,
}

impl FileAnnotationStore {
    pub fn new(root: PathBuf) -> anyhow::Result<Self> {
        let strokes_dir = root.join("strokes");
        let bookmarks_dir = root.join("bookmarks");
        for dir in [&strokes_dir, &bookmarks_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create state directory at {:?}", dir))?;
        }
        Ok(Self {
            strokes_dir,
            bookmarks_dir,
        })
    }

    fn strokes_path(&self, document: &DocumentId) -> PathBuf {
        self.strokes_dir
            .join(format!("{}.json", file_stem_for(document)))
    }

    fn bookmark_path(&self, document: &DocumentId) -> PathBuf {
        self.bookmarks_dir
            .join(format!("{}.json", file_stem_for(document)))
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, StoreError> {
    let payload = match fs::read(path) {
        Ok(payload) => payload,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes next to `path` and renames into place so readers never observe a
/// partially written file.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    let write = || -> std::io::Result<()> {
        let payload = serde_json::to_vec_pretty(value)
            .map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err))?;
        let mut file = File::create(&tmp)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    write().map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

impl AnnotationStore for FileAnnotationStore {
    fn put(&self, document: &DocumentId, strokes: &EncodedStrokes) -> Result<(), StoreError> {
        let file = StrokeFile {
            document: document.clone(),
            pages: strokes
                .iter()
                .map(|(page, bytes)| (page_key(*page), bytes.to_vec()))
                .collect(),
        };
        write_json_atomic(&self.strokes_path(document), &file)
    }

    fn get(&self, document: &DocumentId) -> Result<EncodedStrokes, StoreError> {
        let path = self.strokes_path(document);
        let Some(file) = read_json::<StrokeFile>(&path)? else {
            return Ok(EncodedStrokes::new());
        };

        let mut strokes = EncodedStrokes::new();
        for (key, data) in file.pages {
            match parse_page_key(&key) {
                Some(page) => {
                    strokes.insert(page, Bytes::from(data));
                }
                None => warn!(
                    key = %key,
                    path = ?path,
                    "skipping stroke entry with invalid page key"
                ),
            }
        }
        Ok(strokes)
    }

    fn clear(&self, document: &DocumentId) -> Result<(), StoreError> {
        let path = self.strokes_path(document);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Write { path, source }),
        }
    }

    fn put_last_page(&self, document: &DocumentId, page: PageIndex) -> Result<(), StoreError> {
        let file = BookmarkFile {
            document: document.clone(),
            page,
        };
        write_json_atomic(&self.bookmark_path(document), &file)
    }

    fn get_last_page(&self, document: &DocumentId) -> Result<Option<PageIndex>, StoreError> {
        let file = read_json::<BookmarkFile>(&self.bookmark_path(document))?;
        Ok(file.map(|bookmark| bookmark.page))
    }
}

pub struct MemoryAnnotationStore {
    strokes: Mutex<HashMap<DocumentId, EncodedStrokes>>,
    bookmarks: Mutex<HashMap<DocumentId, PageIndex>>,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self {
            strokes: Mutex::new(HashMap::new()),
            bookmarks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryAnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationStore for MemoryAnnotationStore {
    fn put(&self, document: &DocumentId, strokes: &EncodedStrokes) -> Result<(), StoreError> {
        self.strokes.lock().insert(document.clone(), strokes.clone());
        Ok(())
    }

    fn get(&self, document: &DocumentId) -> Result<EncodedStrokes, StoreError> {
        Ok(self
            .strokes
            .lock()
            .get(document)
            .cloned()
            .unwrap_or_default())
    }

    fn clear(&self, document: &DocumentId) -> Result<(), StoreError> {
        self.strokes.lock().remove(document);
        Ok(())
    }

    fn put_last_page(&self, document: &DocumentId, page: PageIndex) -> Result<(), StoreError> {
        self.bookmarks.lock().insert(document.clone(), page);
        Ok(())
    }

    fn get_last_page(&self, document: &DocumentId) -> Result<Option<PageIndex>, StoreError> {
        Ok(self.bookmarks.lock().get(document).copied())
    }
}
