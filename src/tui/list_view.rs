//! Widget drawing the materialized part of the feed.
//!
//! Virtual items are positioned in terminal lines: an item starting at
//! `start` with `size` lines occupies rows `start - scroll_offset ..
//! start - scroll_offset + size` of the list area. Items cut by the top or
//! bottom edge are clipped.

use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Rect};
use ratatui::text::Line;
use ratatui::widgets::{Paragraph, Widget, Wrap};

use super::styles::Theme;
use crate::scroll::{ListStatus, ScrollCoordinator, Slot};
use crate::virtualizer::VirtualItem;

pub struct FeedView<'a> {
    coordinator: &'a ScrollCoordinator<String>,
    theme: &'a Theme,
}

impl<'a> FeedView<'a> {
    pub fn new(coordinator: &'a ScrollCoordinator<String>, theme: &'a Theme) -> Self {
        Self { coordinator, theme }
    }

    fn render_items(&self, area: Rect, buf: &mut Buffer) {
        let offset = self.coordinator.virtualizer().scroll_offset();
        for item in self.coordinator.layout().items {
            let Some((rect, skip)) = item_rect(&item, offset, area) else {
                continue;
            };
            let paragraph = match self.coordinator.slot(item.index) {
                Some(Slot::Record(record)) => {
                    Paragraph::new(format!(" {}", record.payload)).style(self.theme.row_style(record.id))
                }
                Some(Slot::Loader { state, .. }) => Paragraph::new(state.label())
                    .alignment(Alignment::Center)
                    .style(self.theme.loader_style(state)),
                None => continue,
            };
            paragraph.scroll((skip, 0)).render(rect, buf);
        }
    }

    fn render_message(&self, area: Rect, buf: &mut Buffer, lines: Vec<Line<'static>>) {
        let height = (lines.len() as u16).min(area.height);
        let message_area = Rect {
            y: area.y + (area.height - height) / 2,
            height,
            ..area
        };
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(message_area, buf);
    }
}

impl Widget for FeedView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        buf.set_style(area, self.theme.base_style());

        match self.coordinator.status() {
            ListStatus::Pending => {
                let line = Line::styled("Loading...", self.theme.placeholder_style());
                self.render_message(area, buf, vec![line]);
            }
            ListStatus::Error(message) => {
                let lines = vec![
                    Line::styled(format!("Error: {}", message), self.theme.error_style()),
                    Line::styled("press r to retry", self.theme.placeholder_style()),
                ];
                self.render_message(area, buf, lines);
            }
            ListStatus::Ready => self.render_items(area, buf),
        }
    }
}

/// Rows of `area` covered by an item and the number of its own lines cut
/// off at the top
fn item_rect(item: &VirtualItem, scroll_offset: f64, area: Rect) -> Option<(Rect, u16)> {
    let top = (item.start - scroll_offset).round() as i64;
    let bottom = (item.end() - scroll_offset).round() as i64;
    let visible_top = top.max(0);
    let visible_bottom = bottom.min(i64::from(area.height));
    if visible_bottom <= visible_top {
        return None;
    }

    let rect = Rect {
        y: area.y + visible_top as u16,
        height: (visible_bottom - visible_top) as u16,
        ..area
    };
    let skip = (visible_top - top) as u16;
    Some((rect, skip))
}
