use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::annotation::{CanvasFactory, ChangeNotifier, FreehandCanvas, InputMode, ToolState};
use crate::error::StoreError;
use crate::store::{AnnotationStore, MemoryAnnotationStore};
use crate::strokes::{EncodedStrokes, StrokeSet};
use crate::{DocumentId, PageHandle, PageIndex};

#[derive(Debug, Default)]
struct CanvasState {
    strokes: StrokeSet,
    mode: Option<InputMode>,
    tool: Option<ToolState>,
    notifier: Option<ChangeNotifier>,
}

type LiveCanvases = Arc<Mutex<HashMap<PageIndex, Arc<Mutex<CanvasState>>>>>;

/// Canvases that tests can draw on while their page is mounted.
#[derive(Clone, Default)]
pub(crate) struct CanvasBoard {
    live: LiveCanvases,
    created: Arc<AtomicUsize>,
}

impl CanvasBoard {
    /// Replaces the content of the live canvas for `page` and notifies.
    pub fn draw(&self, page: PageIndex, data: &[u8]) -> bool {
        let Some(state) = self.live.lock().get(&page).cloned() else {
            return false;
        };
        let notifier = {
            let mut state = state.lock();
            state.strokes = StrokeSet::from_bytes(Bytes::copy_from_slice(data));
            state.notifier.clone()
        };
        if let Some(notifier) = notifier {
            notifier.notify();
        }
        true
    }

    pub fn content(&self, page: PageIndex) -> Option<StrokeSet> {
        self.state(page).map(|state| state.lock().strokes.clone())
    }

    pub fn input_mode(&self, page: PageIndex) -> Option<InputMode> {
        self.state(page).and_then(|state| state.lock().mode)
    }

    pub fn tool(&self, page: PageIndex) -> Option<ToolState> {
        self.state(page).and_then(|state| state.lock().tool.clone())
    }

    pub fn select_tool(&self, page: PageIndex, tool: ToolState) {
        if let Some(state) = self.state(page) {
            state.lock().tool = Some(tool);
        }
    }

    pub fn live_pages(&self) -> Vec<PageIndex> {
        let mut pages: Vec<_> = self.live.lock().keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn state(&self, page: PageIndex) -> Option<Arc<Mutex<CanvasState>>> {
        self.live.lock().get(&page).cloned()
    }
}

impl CanvasFactory for CanvasBoard {
    fn create(&mut self, page: &PageHandle, notifier: ChangeNotifier) -> Box<dyn FreehandCanvas> {
        let state = Arc::new(Mutex::new(CanvasState {
            notifier: Some(notifier),
            ..CanvasState::default()
        }));
        self.live.lock().insert(page.index, Arc::clone(&state));
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(BoardCanvas {
            page: page.index,
            state,
            live: Arc::clone(&self.live),
        })
    }
}

struct BoardCanvas {
    page: PageIndex,
    state: Arc<Mutex<CanvasState>>,
    live: LiveCanvases,
}

impl FreehandCanvas for BoardCanvas {
    fn current(&self) -> StrokeSet {
        self.state.lock().strokes.clone()
    }

    fn set_current(&mut self, strokes: StrokeSet) {
        self.state.lock().strokes = strokes;
    }

    fn set_input_mode(&mut self, mode: InputMode) {
        self.state.lock().mode = Some(mode);
    }

    fn tool_state(&self) -> Option<ToolState> {
        self.state.lock().tool.clone()
    }

    fn apply_tool_state(&mut self, tool: &ToolState) {
        self.state.lock().tool = Some(tool.clone());
    }
}

impl Drop for BoardCanvas {
    fn drop(&mut self) {
        let mut live = self.live.lock();
        if live
            .get(&self.page)
            .is_some_and(|state| Arc::ptr_eq(state, &self.state))
        {
            live.remove(&self.page);
        }
    }
}

/// Memory store that can be told to fail reads or a number of writes, and
/// counts the writes that went through.
pub(crate) struct FlakyStore {
    inner: MemoryAnnotationStore,
    failing_writes: AtomicUsize,
    failing_reads: bool,
    writes: AtomicUsize,
}

impl FlakyStore {
    pub fn reliable() -> Self {
        Self {
            inner: MemoryAnnotationStore::new(),
            failing_writes: AtomicUsize::new(0),
            failing_reads: false,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn failing_writes(count: usize) -> Self {
        let store = Self::reliable();
        store.failing_writes.store(count, Ordering::SeqCst);
        store
    }

    pub fn failing_reads() -> Self {
        Self {
            failing_reads: true,
            ..Self::reliable()
        }
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryAnnotationStore {
        &self.inner
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write<F>(&self, op: F) -> Result<(), StoreError>
    where
        F: FnOnce() -> Result<(), StoreError>,
    {
        let fail = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        op()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self) -> Result<(), StoreError> {
        if self.failing_reads {
            Err(StoreError::Unavailable("injected read failure".into()))
        } else {
            Ok(())
        }
    }
}

impl AnnotationStore for FlakyStore {
    fn put(&self, document: &DocumentId, strokes: &EncodedStrokes) -> Result<(), StoreError> {
        self.write(|| self.inner.put(document, strokes))
    }

    fn get(&self, document: &DocumentId) -> Result<EncodedStrokes, StoreError> {
        self.read()?;
        self.inner.get(document)
    }

    fn clear(&self, document: &DocumentId) -> Result<(), StoreError> {
        self.write(|| self.inner.clear(document))
    }

    fn put_last_page(&self, document: &DocumentId, page: PageIndex) -> Result<(), StoreError> {
        self.write(|| self.inner.put_last_page(document, page))
    }

    fn get_last_page(&self, document: &DocumentId) -> Result<Option<PageIndex>, StoreError> {
        self.read()?;
        self.inner.get_last_page(document)
    }
}
