//! Background writes of a document's annotations and bookmark.
//!
//! The controller publishes the state it wants stored; a writer task commits
//! the most recent version. Every field carries a version and a commit never
//! replaces a newer stored version with an older one.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::AutosaveConfig;
use crate::store::AnnotationStore;
use crate::strokes::EncodedStrokes;
use crate::{DocumentId, PageIndex};

#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    value: T,
}

#[derive(Debug, Clone, Default)]
struct Desired {
    strokes: Option<Versioned<Arc<EncodedStrokes>>>,
    last_page: Option<Versioned<PageIndex>>,
}

#[derive(Debug, Default)]
struct Committed {
    strokes: u64,
    last_page: u64,
}

struct Writer {
    store: Arc<dyn AnnotationStore>,
    document: DocumentId,
    committed: Mutex<Committed>,
    retries: u32,
    backoff: Duration,
}

impl Writer {
    /// Makes one attempt per field that is behind. Failures leave the field
    /// pending for the next commit.
    fn commit(&self, desired: &Desired) {
        // Held for the whole commit: writes for one document never overlap.
        let mut committed = self.committed.lock();

        if let Some(strokes) = &desired.strokes {
            if strokes.version > committed.strokes {
                let result = if strokes.value.is_empty() {
                    self.store.clear(&self.document)
                } else {
                    self.store.put(&self.document, &strokes.value)
                };
                match result {
                    Ok(()) => {
                        committed.strokes = strokes.version;
                        debug!(
                            document = %self.document,
                            pages = strokes.value.len(),
                            version = strokes.version,
                            "annotations written"
                        );
                    }
                    Err(err) => warn!(
                        ?err,
                        document = %self.document,
                        "failed to write annotations; keeping them in memory"
                    ),
                }
            }
        }

        if let Some(last_page) = &desired.last_page {
            if last_page.version > committed.last_page {
                let page = last_page.value;
                match self.store.put_last_page(&self.document, page) {
                    Ok(()) => committed.last_page = last_page.version,
                    Err(err) => warn!(
                        ?err,
                        document = %self.document,
                        page,
                        "failed to write bookmark"
                    ),
                }
            }
        }
    }

    fn is_behind(&self, desired: &Desired) -> bool {
        let committed = self.committed.lock();
        let strokes = desired
            .strokes
            .as_ref()
            .is_some_and(|s| s.version > committed.strokes);
        let last_page = desired
            .last_page
            .as_ref()
            .is_some_and(|p| p.version > committed.last_page);
        strokes || last_page
    }
}

async fn commit_blocking(writer: &Arc<Writer>, desired: &Desired) {
    let writer = Arc::clone(writer);
    let desired = desired.clone();
    if let Err(err) = tokio::task::spawn_blocking(move || writer.commit(&desired)).await {
        warn!(?err, "annotation writer task failed");
    }
}

/// Commits each change as it arrives. Failed commits are retried here, with
/// the backoff awaited outside the commit lock.
async fn write_loop(
    writer: Arc<Writer>,
    mut desired: watch::Receiver<Desired>,
    debounce: Duration,
) {
    while desired.changed().await.is_ok() {
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
        }
        let snapshot = desired.borrow_and_update().clone();
        commit_blocking(&writer, &snapshot).await;

        let mut attempt = 0;
        while attempt < writer.retries && writer.is_behind(&snapshot) {
            attempt += 1;
            debug!(attempt, document = %writer.document, "retrying store write");
            if !writer.backoff.is_zero() {
                tokio::time::sleep(writer.backoff).await;
            }
            commit_blocking(&writer, &snapshot).await;
        }
    }
    debug!("annotation writer stopped");
}

/// Serialized, last-write-wins persistence for one open document.
pub struct Persister {
    writer: Arc<Writer>,
    desired: watch::Sender<Desired>,
    next_version: u64,
    worker: Option<JoinHandle<()>>,
}

impl Persister {
    /// Spawns the writer on the current tokio runtime. Outside a runtime
    /// writes are committed on the calling thread, one attempt each.
    pub fn new(
        store: Arc<dyn AnnotationStore>,
        document: DocumentId,
        autosave: &AutosaveConfig,
    ) -> Self {
        let writer = Arc::new(Writer {
            store,
            document,
            committed: Mutex::new(Committed::default()),
            retries: autosave.write_retries,
            backoff: autosave.retry_backoff(),
        });
        let (desired, receiver) = watch::channel(Desired::default());
        let worker = match Handle::try_current() {
            Ok(handle) => Some(handle.spawn(write_loop(
                Arc::clone(&writer),
                receiver,
                autosave.debounce(),
            ))),
            Err(_) => {
                debug!(document = %writer.document, "no async runtime; writing inline");
                None
            }
        };
        Self {
            writer,
            desired,
            next_version: 0,
            worker,
        }
    }

    pub fn runs_in_background(&self) -> bool {
        self.worker.is_some()
    }

    pub fn schedule_strokes(&mut self, strokes: EncodedStrokes) {
        let version = self.bump();
        let value = Arc::new(strokes);
        self.desired
            .send_modify(|desired| desired.strokes = Some(Versioned { version, value }));
        self.commit_inline();
    }

    pub fn schedule_last_page(&mut self, page: PageIndex) {
        let version = self.bump();
        self.desired.send_modify(|desired| {
            desired.last_page = Some(Versioned {
                version,
                value: page,
            })
        });
        self.commit_inline();
    }

    /// Commits the latest scheduled state on the calling thread. Makes a
    /// single attempt and never waits for a retry backoff.
    pub fn flush(&self) {
        let snapshot = self.desired.borrow().clone();
        self.writer.commit(&snapshot);
    }

    /// Whether something scheduled has not reached the store yet.
    pub fn has_pending_writes(&self) -> bool {
        self.writer.is_behind(&self.desired.borrow())
    }

    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn commit_inline(&self) {
        if self.worker.is_none() {
            self.flush();
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        // The worker exits once the sender is gone; anything it still holds
        // is older than what this flush writes.
        self.flush();
    }
}
