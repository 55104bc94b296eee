//! Page visibility: which placeholders are close enough to the viewport to
//! deserve a live render
//!
//! Pages are stacked vertically. Placeholders keep their full size whether or
//! not the page is mounted, so the scroll position of other pages never moves
//! when a page is mounted or released.

use crate::document::Viewport;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Placement of one page placeholder in the scroll container, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageLayout {
    pub page: u32,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PageLayout {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Stack pages top to bottom with `gap` pixels between them.
/// `viewports` are already scaled and in page order.
pub fn layout_pages(viewports: &[Viewport], gap: f64) -> Vec<PageLayout> {
    let mut cursor = 0.0;
    viewports
        .iter()
        .enumerate()
        .map(|(index, vp)| {
            let layout = PageLayout {
                page: index as u32 + 1,
                top: cursor,
                width: vp.width,
                height: vp.height,
            };
            cursor += vp.height + gap;
            layout
        })
        .collect()
}

/// Total scroll height of a layout
pub fn content_height(layouts: &[PageLayout]) -> f64 {
    layouts.last().map(PageLayout::bottom).unwrap_or(0.0)
}

/// The visible part of the scroll container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportWindow {
    pub scroll_top: f64,
    pub height: f64,
}

impl ViewportWindow {
    pub fn new(scroll_top: f64, height: f64) -> Self {
        Self { scroll_top, height }
    }

    /// Window grown by `margin` viewport heights above and below
    fn expanded(&self, margin: f64) -> (f64, f64) {
        let extra = self.height.max(0.0) * margin;
        (self.scroll_top - extra, self.scroll_top + self.height + extra)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VisibilityChange {
    Enter(u32),
    Exit(u32),
}

impl VisibilityChange {
    pub fn page(&self) -> u32 {
        match self {
            VisibilityChange::Enter(page) | VisibilityChange::Exit(page) => *page,
        }
    }
}

/// Tracks the set of pages that should be live and reports changes to it
#[derive(Debug, Clone)]
pub struct VisibilityController {
    margin: f64,
    live: BTreeSet<u32>,
}

impl VisibilityController {
    pub fn new(margin: f64) -> Self {
        Self {
            margin,
            live: BTreeSet::new(),
        }
    }

    /// Pages whose placeholder intersects the expanded window. Edges count
    /// as intersecting.
    pub fn wanted(&self, layouts: &[PageLayout], window: ViewportWindow) -> BTreeSet<u32> {
        let (start, end) = window.expanded(self.margin);
        layouts
            .iter()
            .filter(|l| l.bottom() >= start && l.top <= end)
            .map(|l| l.page)
            .collect()
    }

    /// Recompute the live set. Exits come first, then enters, each in
    /// ascending page order.
    pub fn update(&mut self, layouts: &[PageLayout], window: ViewportWindow) -> Vec<VisibilityChange> {
        let wanted = self.wanted(layouts, window);

        let mut changes: Vec<VisibilityChange> = self
            .live
            .difference(&wanted)
            .map(|&page| VisibilityChange::Exit(page))
            .collect();
        changes.extend(
            wanted
                .difference(&self.live)
                .map(|&page| VisibilityChange::Enter(page)),
        );

        if !changes.is_empty() {
            debug!(?changes, live = wanted.len(), "visibility changed");
        }

        self.live = wanted;
        changes
    }

    /// Forget the live set so the next `update` re-enters every wanted page
    pub fn invalidate(&mut self) {
        self.live.clear();
    }

    /// Drop one page from the live set, so the next `update` that still
    /// wants it reports it as entered again
    pub fn forget(&mut self, page: u32) -> bool {
        self.live.remove(&page)
    }

    pub fn is_live(&self, page: u32) -> bool {
        self.live.contains(&page)
    }

    pub fn live_pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.live.iter().copied()
    }
}

impl Default for VisibilityController {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// The page under the viewport's vertical center line. A center line that
/// falls in a gap belongs to the page above it.
pub fn page_at_center(layouts: &[PageLayout], window: ViewportWindow) -> Option<u32> {
    let center = (window.scroll_top + window.height / 2.0).max(0.0);
    let mut current = layouts.first()?.page;
    for layout in layouts {
        if layout.top > center {
            break;
        }
        current = layout.page;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn letter_pages(count: usize, scale: f64) -> Vec<PageLayout> {
        let viewports = vec![
            Viewport {
                width: 612.0 * scale,
                height: 792.0 * scale
            };
            count
        ];
        layout_pages(&viewports, 10.0)
    }

    #[test]
    fn test_layout_stacks_with_gap() {
        let layouts = letter_pages(3, 1.0);
        let tops: Vec<f64> = layouts.iter().map(|l| l.top).collect();
        assert_eq!(tops, vec![0.0, 802.0, 1604.0]);
        assert_eq!(content_height(&layouts), 1604.0 + 792.0);
    }

    #[test]
    fn test_layout_uses_scaled_size() {
        let layouts = letter_pages(2, 1.5);
        assert_eq!(layouts[1].width, 918.0);
        assert_eq!(layouts[1].height, 1188.0);
    }

    #[test]
    fn test_initial_update_enters_pages_within_margin() {
        let layouts = letter_pages(10, 1.0);
        let mut controller = VisibilityController::new(1.0);

        // Window 0..800, expanded to -800..1600
        let changes = controller.update(&layouts, ViewportWindow::new(0.0, 800.0));
        assert_eq!(
            changes,
            vec![VisibilityChange::Enter(1), VisibilityChange::Enter(2)]
        );
    }

    #[test]
    fn test_same_inputs_yield_no_changes() {
        let layouts = letter_pages(5, 1.0);
        let mut controller = VisibilityController::default();
        let window = ViewportWindow::new(900.0, 700.0);

        assert!(!controller.update(&layouts, window).is_empty());
        assert!(controller.update(&layouts, window).is_empty());
    }

    #[test]
    fn test_scrolling_emits_exits_then_enters() {
        let layouts = letter_pages(10, 1.0);
        let mut controller = VisibilityController::new(0.0);

        controller.update(&layouts, ViewportWindow::new(0.0, 700.0));
        assert!(controller.is_live(1));

        let changes = controller.update(&layouts, ViewportWindow::new(2500.0, 700.0));
        assert_eq!(
            changes,
            vec![
                VisibilityChange::Exit(1),
                VisibilityChange::Enter(4),
            ]
        );
    }

    #[test]
    fn test_edges_are_inclusive() {
        let layouts = letter_pages(3, 1.0);
        let mut controller = VisibilityController::new(0.0);

        // Window ends exactly at page 2's top edge
        controller.update(&layouts, ViewportWindow::new(102.0, 700.0));
        assert!(controller.is_live(2));
    }

    #[test]
    fn test_invalidate_reenters_visible_pages() {
        let layouts = letter_pages(3, 1.0);
        let mut controller = VisibilityController::new(0.0);
        let window = ViewportWindow::new(0.0, 500.0);

        controller.update(&layouts, window);
        controller.invalidate();
        assert_eq!(
            controller.update(&layouts, window),
            vec![VisibilityChange::Enter(1)]
        );
    }

    #[test]
    fn test_page_at_center() {
        let layouts = letter_pages(3, 1.0);
        assert_eq!(page_at_center(&layouts, ViewportWindow::new(0.0, 600.0)), Some(1));
        assert_eq!(page_at_center(&layouts, ViewportWindow::new(700.0, 600.0)), Some(2));
        // Center line at 797 sits in the gap after page 1
        assert_eq!(page_at_center(&layouts, ViewportWindow::new(497.0, 600.0)), Some(1));
        assert_eq!(page_at_center(&[], ViewportWindow::new(0.0, 600.0)), None);
    }

    #[test]
    fn test_forgotten_page_enters_again() {
        let layouts = letter_pages(3, 1.0);
        let window = ViewportWindow::new(0.0, 800.0);
        let mut controller = VisibilityController::default();
        controller.update(&layouts, window);
        assert!(controller.is_live(1));

        assert!(controller.forget(1));
        assert!(!controller.forget(1));
        assert_eq!(
            controller.update(&layouts, window),
            vec![VisibilityChange::Enter(1)]
        );
    }
}
