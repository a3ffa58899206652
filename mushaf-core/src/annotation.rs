use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::strokes::StrokeSet;
use crate::{PageHandle, PageIndex};

/// How a page surface treats touch input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputMode {
    /// Drawing takes every touch; page turns are not recognized.
    CaptureAll,
    /// Touches fall through to the page-turn gesture.
    PassThrough,
}

impl InputMode {
    pub fn for_annotation_mode(enabled: bool) -> Self {
        if enabled {
            InputMode::CaptureAll
        } else {
            InputMode::PassThrough
        }
    }
}

/// Opaque description of the active drawing tool.
#[derive(Clone, PartialEq, Eq)]
pub struct ToolState(Bytes);

impl ToolState {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ToolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ToolState({} bytes)", self.0.len())
    }
}

/// The freehand input widget drawn over one page.
pub trait FreehandCanvas {
    fn current(&self) -> StrokeSet;
    fn set_current(&mut self, strokes: StrokeSet);
    fn set_input_mode(&mut self, mode: InputMode);

    fn tool_state(&self) -> Option<ToolState> {
        None
    }

    fn apply_tool_state(&mut self, _tool: &ToolState) {}
}

/// Creates canvases for the pages of a newly mounted spread.
pub trait CanvasFactory {
    fn create(&mut self, page: &PageHandle, notifier: ChangeNotifier) -> Box<dyn FreehandCanvas>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StrokeChange {
    pub page: PageIndex,
    pub mount: u64,
}

/// Handed to a canvas so it can report new strokes to its adapter's owner.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    change: StrokeChange,
    sender: UnboundedSender<StrokeChange>,
}

impl ChangeNotifier {
    pub(crate) fn new(page: PageIndex, mount: u64, sender: UnboundedSender<StrokeChange>) -> Self {
        Self {
            change: StrokeChange { page, mount },
            sender,
        }
    }

    pub fn page(&self) -> PageIndex {
        self.change.page
    }

    pub fn notify(&self) {
        if self.sender.send(self.change).is_err() {
            trace!(page = self.change.page, "stroke change after controller shut down");
        }
    }
}

/// Live annotation session of one visible page.
///
/// Dropping an adapter does not save anything; the owner snapshots it first.
pub struct AnnotationAdapter {
    page: PageIndex,
    mount: u64,
    canvas: Box<dyn FreehandCanvas>,
    reported: StrokeSet,
    annotation_mode: bool,
}

impl AnnotationAdapter {
    pub fn new(
        page: PageIndex,
        mount: u64,
        seed: StrokeSet,
        mut canvas: Box<dyn FreehandCanvas>,
        annotation_mode: bool,
    ) -> Self {
        canvas.set_current(seed.clone());
        canvas.set_input_mode(InputMode::for_annotation_mode(annotation_mode));
        Self {
            page,
            mount,
            canvas,
            reported: seed,
            annotation_mode,
        }
    }

    pub fn page(&self) -> PageIndex {
        self.page
    }

    pub(crate) fn mount(&self) -> u64 {
        self.mount
    }

    /// Current live content. Does not touch the stroke map.
    pub fn snapshot(&self) -> StrokeSet {
        self.canvas.current()
    }

    pub fn has_local_edits(&self) -> bool {
        self.canvas.current() != self.reported
    }

    /// Returns the live content if it changed since the last call.
    pub fn take_local_edits(&mut self) -> Option<StrokeSet> {
        let current = self.canvas.current();
        if current == self.reported {
            return None;
        }
        self.reported = current.clone();
        Some(current)
    }

    /// Marks the live content as saved.
    pub(crate) fn mark_reported(&mut self, strokes: StrokeSet) {
        self.reported = strokes;
    }

    pub fn clear(&mut self) {
        self.canvas.set_current(StrokeSet::default());
        self.reported = StrokeSet::default();
    }

    pub fn set_annotation_mode_enabled(&mut self, enabled: bool) {
        self.annotation_mode = enabled;
        self.canvas
            .set_input_mode(InputMode::for_annotation_mode(enabled));
    }

    pub fn annotation_mode_enabled(&self) -> bool {
        self.annotation_mode
    }

    pub fn accepts_page_turns(&self) -> bool {
        !self.annotation_mode
    }

    pub fn tool_state(&self) -> Option<ToolState> {
        self.canvas.tool_state()
    }

    pub fn apply_tool_state(&mut self, tool: &ToolState) {
        self.canvas.apply_tool_state(tool);
    }
}

impl fmt::Debug for AnnotationAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationAdapter")
            .field("page", &self.page)
            .field("mount", &self.mount)
            .field("annotation_mode", &self.annotation_mode)
            .finish()
    }
}
