//! Spread composition for a right-bound book.
//!
//! In landscape two pages are shown side by side. Reading runs right to left,
//! so the lower page of a pair sits on the right of the spine and the higher
//! page on the left. Page 0 has no partner and is shown on the right with a
//! placeholder on the left; after it pages pair up as `(1, 2)`, `(3, 4)`, ...
//! with the odd page on the right. A final odd page without a partner gets a
//! placeholder on its left.

use serde::{Deserialize, Serialize};

use crate::PageIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Page(PageIndex),
    Placeholder,
}

impl Slot {
    pub fn page(self) -> Option<PageIndex> {
        match self {
            Slot::Page(index) => Some(index),
            Slot::Placeholder => None,
        }
    }
}

/// Pages shown at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spread {
    Single(PageIndex),
    /// `right` is always a real page and always the lower index.
    Pair { left: Slot, right: PageIndex },
}

/// Reading direction of a transition. `Forward` moves toward higher page
/// indices, which is visually leftward in a right-to-left book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnDirection {
    Forward,
    Backward,
}

impl Spread {
    pub fn orientation(&self) -> Orientation {
        match self {
            Spread::Single(_) => Orientation::Portrait,
            Spread::Pair { .. } => Orientation::Landscape,
        }
    }

    /// Slots in visual order, left to right.
    pub fn slots(&self) -> Vec<Slot> {
        match *self {
            Spread::Single(page) => vec![Slot::Page(page)],
            Spread::Pair { left, right } => vec![left, Slot::Page(right)],
        }
    }

    /// Real pages in visual order.
    pub fn pages(&self) -> Vec<PageIndex> {
        self.slots().into_iter().filter_map(Slot::page).collect()
    }

    /// The lower-numbered real page. Orientation changes recompute the spread
    /// from this page.
    pub fn focal_page(&self) -> PageIndex {
        match *self {
            Spread::Single(page) => page,
            Spread::Pair { right, .. } => right,
        }
    }

    pub fn contains(&self, page: PageIndex) -> bool {
        self.slots().contains(&Slot::Page(page))
    }

    pub fn has_placeholder(&self) -> bool {
        matches!(
            self,
            Spread::Pair {
                left: Slot::Placeholder,
                ..
            }
        )
    }
}

/// Spread that shows `target`, or `None` when `target` is not a page of a
/// document with `page_count` pages.
pub fn spread_for(
    target: PageIndex,
    orientation: Orientation,
    page_count: usize,
) -> Option<Spread> {
    if target >= page_count {
        return None;
    }

    let spread = match orientation {
        Orientation::Portrait => Spread::Single(target),
        Orientation::Landscape if target == 0 => Spread::Pair {
            left: Slot::Placeholder,
            right: 0,
        },
        Orientation::Landscape => {
            let right = if target % 2 == 1 { target } else { target - 1 };
            let left = right + 1;
            Spread::Pair {
                left: if left < page_count {
                    Slot::Page(left)
                } else {
                    Slot::Placeholder
                },
                right,
            }
        }
    };
    Some(spread)
}

/// Page a transition from `spread` in `direction` should land on.
pub fn neighbor_target(
    spread: &Spread,
    direction: TurnDirection,
    page_count: usize,
) -> Option<PageIndex> {
    let target = match (*spread, direction) {
        (Spread::Single(page), TurnDirection::Forward) => page.checked_add(1),
        (Spread::Single(page), TurnDirection::Backward) => page.checked_sub(1),
        // The opening spread is followed by the first pair.
        (Spread::Pair { right: 0, .. }, TurnDirection::Forward) => Some(1),
        (Spread::Pair { right, .. }, TurnDirection::Forward) => right.checked_add(2),
        (Spread::Pair { right, .. }, TurnDirection::Backward) => right.checked_sub(1),
    }?;
    (target < page_count).then_some(target)
}

/// Adjacent spread for an incremental transition.
pub fn neighbor(spread: &Spread, direction: TurnDirection, page_count: usize) -> Option<Spread> {
    let target = neighbor_target(spread, direction, page_count)?;
    spread_for(target, spread.orientation(), page_count)
}

/// Whether landscape layout may place a placeholder next to `page`.
pub fn is_lone_landscape_page(page: PageIndex, page_count: usize) -> bool {
    page == 0 || (page + 1 == page_count && page % 2 == 1)
}
