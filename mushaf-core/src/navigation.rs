use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument, trace, warn};

use crate::annotation::{AnnotationAdapter, CanvasFactory, ChangeNotifier, StrokeChange, ToolState};
use crate::config::ReaderConfig;
use crate::error::NavigationError;
use crate::layout::{self, Orientation, Slot, Spread, TurnDirection};
use crate::persist::Persister;
use crate::store::AnnotationStore;
use crate::strokes::{EncodedStrokes, StrokeMap};
use crate::{DocumentBackend, DocumentId, DocumentInfo, PageIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Transitioning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    Document,
    VisibleSpread,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    pub spread: Spread,
    pub orientation: Orientation,
    pub document: DocumentId,
}

#[derive(Debug, Clone)]
pub enum Command {
    GoToPage { page: i64 },
    /// 1-based page number as typed by the reader.
    GoToPageNumber { number: usize },
    Advance,
    Retreat,
    SetOrientation(Orientation),
    SetAnnotationMode(bool),
    ClearAnnotations(ClearScope),
    Suspend,
    Resume,
    LayoutSettled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    DocumentOpened(DocumentId),
    DocumentClosed(DocumentId),
    SpreadMounted(Spread),
    SurfaceTornDown,
    SurfaceRebuilt(Orientation),
    PageChanged(PageIndex),
    BookmarkRestorePending(PageIndex),
    StrokesChanged(PageIndex),
    AnnotationsCleared(ClearScope),
    AnnotationModeChanged(bool),
}

struct OpenDocument {
    backend: Arc<dyn DocumentBackend>,
    strokes: StrokeMap,
    spread: Spread,
    current_page: PageIndex,
    adapters: Vec<AnnotationAdapter>,
    persister: Persister,
    deferred_restore: Option<PageIndex>,
    suspended_tool: Option<ToolState>,
}

impl OpenDocument {
    fn info(&self) -> &DocumentInfo {
        self.backend.info()
    }

    fn page_count(&self) -> usize {
        self.backend.info().page_count
    }

    /// Copies live canvas content into the stroke map and schedules a write
    /// when anything changed.
    fn snapshot_visible(&mut self) -> bool {
        let mut changed = false;
        for adapter in &mut self.adapters {
            let current = adapter.snapshot();
            adapter.mark_reported(current.clone());
            changed |= self.strokes.record(adapter.page(), current);
        }
        if changed {
            self.persister.schedule_strokes(self.strokes.encode());
        }
        changed
    }

    fn mount(
        &mut self,
        canvases: &mut dyn CanvasFactory,
        sender: &UnboundedSender<StrokeChange>,
        mount: u64,
        annotation_mode: bool,
    ) {
        let mut adapters = Vec::new();
        for page in self.spread.pages() {
            let Some(handle) = self.backend.page(page) else {
                warn!(page, document = %self.info().id, "document has no handle for page");
                continue;
            };
            let notifier = ChangeNotifier::new(page, mount, sender.clone());
            let canvas = canvases.create(&handle, notifier);
            adapters.push(AnnotationAdapter::new(
                page,
                mount,
                self.strokes.seed_for(page),
                canvas,
                annotation_mode,
            ));
        }
        self.adapters = adapters;
    }

    fn adapter(&self, page: PageIndex) -> Option<&AnnotationAdapter> {
        self.adapters.iter().find(|adapter| adapter.page() == page)
    }
}

/// Owns the mounted spread of the open document and keeps its annotations
/// in step with navigation.
pub struct NavigationController {
    store: Arc<dyn AnnotationStore>,
    canvases: Box<dyn CanvasFactory>,
    config: ReaderConfig,
    orientation: Orientation,
    annotation_mode: bool,
    phase: Phase,
    document: Option<OpenDocument>,
    mounts: u64,
    change_sender: UnboundedSender<StrokeChange>,
    changes: UnboundedReceiver<StrokeChange>,
    events: Arc<Mutex<Vec<NavigationEvent>>>,
}

impl NavigationController {
    pub fn new(
        store: Arc<dyn AnnotationStore>,
        canvases: Box<dyn CanvasFactory>,
        config: ReaderConfig,
    ) -> Self {
        let (change_sender, changes) = unbounded_channel();
        Self {
            store,
            canvases,
            orientation: config.orientation,
            annotation_mode: config.annotation_mode,
            config,
            phase: Phase::Idle,
            document: None,
            mounts: 0,
            change_sender,
            changes,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<NavigationEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn annotation_mode(&self) -> bool {
        self.annotation_mode
    }

    pub fn state(&self) -> Option<NavigationState> {
        self.document.as_ref().map(|doc| NavigationState {
            spread: doc.spread,
            orientation: self.orientation,
            document: doc.info().id.clone(),
        })
    }

    pub fn current_spread(&self) -> Option<Spread> {
        self.document.as_ref().map(|doc| doc.spread)
    }

    /// Page of the last committed navigation.
    pub fn current_page(&self) -> Option<PageIndex> {
        self.document.as_ref().map(|doc| doc.current_page)
    }

    pub fn document_info(&self) -> Option<&DocumentInfo> {
        self.document.as_ref().map(OpenDocument::info)
    }

    pub fn strokes(&self) -> Option<&StrokeMap> {
        self.document.as_ref().map(|doc| &doc.strokes)
    }

    pub fn visible_adapters(&self) -> &[AnnotationAdapter] {
        self.document
            .as_ref()
            .map(|doc| doc.adapters.as_slice())
            .unwrap_or_default()
    }

    pub fn pending_restore(&self) -> Option<PageIndex> {
        self.document.as_ref().and_then(|doc| doc.deferred_restore)
    }

    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::GoToPage { page } => self.go_to_page(page),
            Command::GoToPageNumber { number } => self.go_to_page_number(number),
            Command::Advance => self.advance(),
            Command::Retreat => self.retreat(),
            Command::SetOrientation(orientation) => self.set_orientation(orientation),
            Command::SetAnnotationMode(enabled) => self.set_annotation_mode(enabled),
            Command::ClearAnnotations(scope) => self.clear_annotations(scope),
            Command::Suspend => self.suspend(),
            Command::Resume => self.resume(),
            Command::LayoutSettled => self.layout_settled(),
        }
    }

    /// Opens `backend`, replacing any open document. Stored annotations and
    /// the bookmark are loaded here; unreadable store data counts as absent.
    /// Without an explicit `initial_page` the bookmark is applied once the
    /// host reports the first layout through [`Self::layout_settled`].
    #[instrument(skip(self, backend), fields(document = %backend.info().id))]
    pub fn open(
        &mut self,
        backend: Arc<dyn DocumentBackend>,
        initial_page: Option<PageIndex>,
    ) -> Result<(), NavigationError> {
        let info = backend.info().clone();
        let page_count = info.page_count;
        if page_count == 0 {
            return Err(NavigationError::EmptyDocument(info.id.to_string()));
        }
        if self.document.is_some() {
            self.close()?;
        }

        let strokes = match self.store.get(&info.id) {
            Ok(encoded) => StrokeMap::decode(encoded),
            Err(err) => {
                warn!(?err, "failed to load annotations; starting without them");
                StrokeMap::new()
            }
        };
        let bookmark = match self.store.get_last_page(&info.id) {
            Ok(page) => page,
            Err(err) => {
                warn!(?err, "failed to load bookmark");
                None
            }
        };

        let start = match initial_page {
            Some(page) if page < page_count => page,
            Some(page) => {
                debug!(page, page_count, "initial page out of range; opening at the start");
                0
            }
            None => 0,
        };
        let deferred_restore = match (initial_page, bookmark) {
            (None, Some(page)) if page >= page_count => {
                debug!(page, page_count, "ignoring out-of-range bookmark");
                None
            }
            (None, Some(page)) if page != start => Some(page),
            _ => None,
        };

        let Some(spread) = layout::spread_for(start, self.orientation, page_count) else {
            return Err(NavigationError::EmptyDocument(info.id.to_string()));
        };

        info!(
            pages = page_count,
            title = ?info.metadata.title,
            annotated_pages = strokes.len(),
            bookmark = ?bookmark,
            "document opened"
        );

        let persister = Persister::new(
            Arc::clone(&self.store),
            info.id.clone(),
            &self.config.autosave,
        );
        self.document = Some(OpenDocument {
            backend,
            strokes,
            spread,
            current_page: start,
            adapters: Vec::new(),
            persister,
            deferred_restore,
            suspended_tool: None,
        });

        self.emit(NavigationEvent::DocumentOpened(info.id));
        self.mount_current();
        if let Some(page) = deferred_restore {
            self.emit(NavigationEvent::BookmarkRestorePending(page));
        }
        Ok(())
    }

    /// Saves the visible pages, writes everything out and drops the document.
    #[instrument(skip(self))]
    pub fn close(&mut self) -> Result<(), NavigationError> {
        let Some(mut doc) = self.document.take() else {
            return Err(NavigationError::NoDocument);
        };
        doc.snapshot_visible();
        if doc.deferred_restore.take().is_some() {
            debug!("bookmark restore cancelled by close");
        }
        doc.adapters.clear();
        doc.persister.flush();

        let id = doc.info().id.clone();
        info!(document = %id, "document closed");
        drop(doc);
        self.emit(NavigationEvent::SurfaceTornDown);
        self.emit(NavigationEvent::DocumentClosed(id));
        Ok(())
    }

    /// Jumps to `target`. Requests outside the document are ignored.
    pub fn go_to_page(&mut self, target: i64) -> bool {
        let Some(page) = self.checked_target(target) else {
            return false;
        };
        self.cancel_deferred_restore();
        self.transition_to(page)
    }

    pub fn go_to_page_number(&mut self, number: usize) -> bool {
        let target = i64::try_from(number).map_or(-1, |number| number - 1);
        self.go_to_page(target)
    }

    pub fn advance(&mut self) -> bool {
        self.step(TurnDirection::Forward)
    }

    pub fn retreat(&mut self) -> bool {
        self.step(TurnDirection::Backward)
    }

    /// Page-turn gesture that started on `origin`. Ignored when that page is
    /// being drawn on.
    pub fn turn_page(&mut self, origin: Slot, direction: TurnDirection) -> bool {
        let Some(doc) = self.document.as_ref() else {
            return false;
        };
        if !doc.spread.slots().contains(&origin) {
            debug!(?origin, "page turn from a slot that is not mounted");
            return false;
        }
        if let Slot::Page(page) = origin {
            if doc
                .adapter(page)
                .is_some_and(|adapter| !adapter.accepts_page_turns())
            {
                trace!(page, "page turn suppressed while annotating");
                return false;
            }
        }
        self.step(direction)
    }

    /// Rebuilds the surface for `orientation` around the current focal page.
    /// The stroke map is written out first and survives untouched.
    #[instrument(skip(self))]
    pub fn set_orientation(&mut self, orientation: Orientation) -> bool {
        if orientation == self.orientation || !self.is_idle() {
            return false;
        }
        let Some(doc) = self.document.as_mut() else {
            self.orientation = orientation;
            return true;
        };
        let focal = doc.spread.focal_page();
        let Some(spread) = layout::spread_for(focal, orientation, doc.page_count()) else {
            return false;
        };

        self.phase = Phase::Transitioning;
        doc.snapshot_visible();
        if doc.current_page != focal {
            doc.current_page = focal;
            doc.persister.schedule_last_page(focal);
        }
        doc.persister.flush();
        doc.adapters.clear();
        doc.spread = spread;
        self.orientation = orientation;
        self.emit(NavigationEvent::SurfaceTornDown);
        self.emit(NavigationEvent::SurfaceRebuilt(orientation));
        self.mount_current();
        self.phase = Phase::Idle;
        true
    }

    pub fn set_annotation_mode(&mut self, enabled: bool) -> bool {
        if enabled == self.annotation_mode {
            return false;
        }
        self.annotation_mode = enabled;
        if let Some(doc) = self.document.as_mut() {
            doc.snapshot_visible();
            for adapter in &mut doc.adapters {
                adapter.set_annotation_mode_enabled(enabled);
            }
        }
        self.emit(NavigationEvent::AnnotationModeChanged(enabled));
        true
    }

    /// Removes annotations either for the whole document or for the pages
    /// currently mounted.
    pub fn clear_annotations(&mut self, scope: ClearScope) -> bool {
        if !self.is_idle() {
            return false;
        }
        let Some(doc) = self.document.as_mut() else {
            return false;
        };

        self.phase = Phase::Transitioning;
        match scope {
            ClearScope::Document => {
                doc.strokes.clear();
                for adapter in &mut doc.adapters {
                    adapter.clear();
                }
                doc.persister.schedule_strokes(EncodedStrokes::new());
            }
            ClearScope::VisibleSpread => {
                for adapter in &mut doc.adapters {
                    doc.strokes.remove(adapter.page());
                    adapter.clear();
                }
                doc.persister.schedule_strokes(doc.strokes.encode());
            }
        }
        debug!(?scope, remaining = doc.strokes.len(), "annotations cleared");
        self.phase = Phase::Idle;
        self.emit(NavigationEvent::AnnotationsCleared(scope));
        true
    }

    /// Writes annotations and bookmark synchronously and remembers the
    /// active drawing tool.
    #[instrument(skip(self))]
    pub fn suspend(&mut self) -> bool {
        let Some(doc) = self.document.as_mut() else {
            return false;
        };
        doc.snapshot_visible();
        doc.suspended_tool = doc.adapters.iter().find_map(AnnotationAdapter::tool_state);
        doc.persister.schedule_last_page(doc.current_page);
        doc.persister.flush();
        debug!(tool = ?doc.suspended_tool, "suspended");
        true
    }

    /// Hands the drawing tool captured by [`Self::suspend`] back to the
    /// visible pages.
    pub fn resume(&mut self) -> bool {
        let Some(doc) = self.document.as_mut() else {
            return false;
        };
        let Some(tool) = doc.suspended_tool.take() else {
            return false;
        };
        for adapter in &mut doc.adapters {
            adapter.apply_tool_state(&tool);
        }
        true
    }

    /// Called by the host once the first layout pass is done. Applies a
    /// pending bookmark restoration.
    pub fn layout_settled(&mut self) -> bool {
        let Some(page) = self
            .document
            .as_mut()
            .and_then(|doc| doc.deferred_restore.take())
        else {
            return false;
        };
        info!(page, "restoring bookmark");
        self.transition_to(page)
    }

    pub fn cancel_deferred_restore(&mut self) -> bool {
        let cancelled = self
            .document
            .as_mut()
            .and_then(|doc| doc.deferred_restore.take());
        if let Some(page) = cancelled {
            debug!(page, "bookmark restore cancelled");
        }
        cancelled.is_some()
    }

    /// Records strokes reported by the visible canvases and schedules a
    /// write. Returns the number of pages whose content changed.
    pub fn poll_changes(&mut self) -> usize {
        let mut changed_pages = Vec::new();
        while let Ok(change) = self.changes.try_recv() {
            let Some(doc) = self.document.as_mut() else {
                continue;
            };
            let Some(adapter) = doc
                .adapters
                .iter_mut()
                .find(|adapter| adapter.page() == change.page && adapter.mount() == change.mount)
            else {
                trace!(page = change.page, mount = change.mount, "stale stroke change");
                continue;
            };
            if let Some(strokes) = adapter.take_local_edits() {
                if doc.strokes.record(change.page, strokes) {
                    changed_pages.push(change.page);
                }
            }
        }

        if changed_pages.is_empty() {
            return 0;
        }
        if let Some(doc) = self.document.as_mut() {
            doc.persister.schedule_strokes(doc.strokes.encode());
        }
        for page in &changed_pages {
            self.emit(NavigationEvent::StrokesChanged(*page));
        }
        changed_pages.len()
    }

    fn step(&mut self, direction: TurnDirection) -> bool {
        if !self.is_idle() {
            return false;
        }
        let Some(doc) = self.document.as_ref() else {
            return false;
        };
        let Some(next) = layout::neighbor(&doc.spread, direction, doc.page_count()) else {
            debug!(?direction, spread = ?doc.spread, "at the end of the document");
            return false;
        };
        self.cancel_deferred_restore();
        self.transition_to(next.focal_page())
    }

    fn checked_target(&self, target: i64) -> Option<PageIndex> {
        let doc = self.document.as_ref()?;
        if !self.is_idle() {
            debug!(target, "navigation already in progress");
            return None;
        }
        match usize::try_from(target) {
            Ok(page) if page < doc.page_count() => Some(page),
            _ => {
                debug!(target, page_count = doc.page_count(), "ignoring page outside the document");
                None
            }
        }
    }

    fn transition_to(&mut self, target: PageIndex) -> bool {
        if !self.is_idle() {
            return false;
        }
        let orientation = self.orientation;
        let Some(doc) = self.document.as_mut() else {
            return false;
        };
        let Some(spread) = layout::spread_for(target, orientation, doc.page_count()) else {
            return false;
        };

        self.phase = Phase::Transitioning;
        doc.snapshot_visible();
        doc.adapters.clear();
        doc.spread = spread;
        doc.current_page = target;
        doc.persister.schedule_last_page(target);
        debug!(target, ?spread, "navigated");
        self.mount_current();
        self.emit(NavigationEvent::PageChanged(target));
        self.phase = Phase::Idle;
        true
    }

    fn mount_current(&mut self) {
        let Some(doc) = self.document.as_mut() else {
            return;
        };
        self.mounts += 1;
        doc.mount(
            self.canvases.as_mut(),
            &self.change_sender,
            self.mounts,
            self.annotation_mode,
        );
        let spread = doc.spread;
        self.emit(NavigationEvent::SpreadMounted(spread));
    }

    fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    fn emit(&self, event: NavigationEvent) {
        self.events.lock().push(event);
    }
}

impl Drop for NavigationController {
    fn drop(&mut self) {
        if self.document.is_some() {
            let _ = self.close();
        }
    }
}
