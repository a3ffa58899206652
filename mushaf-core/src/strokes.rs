use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bytes::Bytes;

use crate::PageIndex;

/// Store representation of a document's annotations.
pub type EncodedStrokes = BTreeMap<PageIndex, Bytes>;

/// One page's freehand marks, in the encoding of the input widget.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct StrokeSet(Bytes);

impl StrokeSet {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for StrokeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrokeSet({} bytes)", self.0.len())
    }
}

/// Annotations of every page of the open document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrokeMap {
    pages: HashMap<PageIndex, StrokeSet>,
}

impl StrokeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(encoded: EncodedStrokes) -> Self {
        let pages = encoded
            .into_iter()
            .map(|(page, bytes)| (page, StrokeSet::from_bytes(bytes)))
            .collect();
        Self { pages }
    }

    pub fn encode(&self) -> EncodedStrokes {
        self.pages
            .iter()
            .map(|(page, strokes)| (*page, strokes.to_bytes()))
            .collect()
    }

    pub fn get(&self, page: PageIndex) -> Option<&StrokeSet> {
        self.pages.get(&page)
    }

    /// Content a freshly mounted page starts from.
    pub fn seed_for(&self, page: PageIndex) -> StrokeSet {
        self.pages.get(&page).cloned().unwrap_or_default()
    }

    /// Stores `strokes` for `page` and reports whether the map changed.
    /// An empty set for a page without an entry is not recorded.
    pub fn record(&mut self, page: PageIndex, strokes: StrokeSet) -> bool {
        match self.pages.get(&page) {
            Some(existing) if *existing == strokes => false,
            None if strokes.is_empty() => false,
            _ => {
                self.pages.insert(page, strokes);
                true
            }
        }
    }

    pub fn remove(&mut self, page: PageIndex) -> Option<StrokeSet> {
        self.pages.remove(&page)
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> impl Iterator<Item = PageIndex> + '_ {
        self.pages.keys().copied()
    }
}
