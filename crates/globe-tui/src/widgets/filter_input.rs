//! FilterInput — wraps tui-input for the country filter bar.

use ratatui::crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use tui_input::{backend::crossterm::EventHandler, Input};

use crate::theme::{C_FILTER_BG, C_FILTER_FG, C_MUTED};

pub enum FilterAction {
    Changed(String),
    Confirmed,
    Cancelled,
}

pub struct FilterInput {
    input: Input,
    active: bool,
    placeholder: String,
}

impl FilterInput {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            input: Input::default(),
            active: false,
            placeholder: placeholder.into(),
        }
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Handle a key event while the filter has focus.
    ///
    /// Esc with text clears the text (filter stays open); Esc on an empty
    /// input closes the filter.
    pub fn handle_key(&mut self, key: KeyEvent) -> FilterAction {
        match key.code {
            KeyCode::Esc => {
                if !self.input.value().is_empty() {
                    self.input = Input::default();
                    FilterAction::Changed(String::new())
                } else {
                    self.deactivate();
                    FilterAction::Cancelled
                }
            }
            KeyCode::Enter => {
                self.deactivate();
                FilterAction::Confirmed
            }
            _ => {
                self.input
                    .handle_event(&ratatui::crossterm::event::Event::Key(key));
                FilterAction::Changed(self.input.value().to_string())
            }
        }
    }

    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        let scroll = self
            .input
            .visual_scroll(area.width.saturating_sub(4) as usize);
        let value = self.input.value();
        let display = if value.is_empty() {
            Span::styled(
                format!("/ {}", self.placeholder),
                Style::default().fg(C_MUTED),
            )
        } else {
            // Skip by characters: `scroll` is a column offset, not a byte
            // index, and slicing bytes panics on multibyte input.
            let visible: String = value.chars().skip(scroll).collect();
            Span::styled(format!("/ {visible}"), Style::default().fg(C_FILTER_FG))
        };

        let paragraph =
            Paragraph::new(Line::from(vec![display])).style(Style::default().bg(C_FILTER_BG));
        frame.render_widget(paragraph, area);

        if self.active {
            let offset = self.input.visual_cursor().saturating_sub(scroll) as u16;
            let cursor_x = area.x + 2 + offset;
            frame.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(1)), area.y));
        }
    }
}

impl Default for FilterInput {
    fn default() -> Self {
        Self::new("filter countries...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use ratatui::crossterm::event::KeyModifiers;
    use ratatui::Terminal;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn draw_into(input: &FilterInput, width: u16) {
        let backend = TestBackend::new(width, 1);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal
            .draw(|f| {
                let area = f.area();
                input.draw(f, area);
            })
            .unwrap();
    }

    #[test]
    fn wide_text_overflowing_the_bar_draws_without_panicking() {
        // CJK input is two columns per char; once it scrolls, the visible
        // window starts mid-text and must be cut on a char boundary.
        let mut input = FilterInput::default();
        input.activate();
        for _ in 0..24 {
            input.handle_key(key('日'));
        }
        draw_into(&input, 12);
    }

    #[test]
    fn accented_text_draws_at_any_width() {
        let mut input = FilterInput::default();
        input.activate();
        for c in "Côte d'Ivoire Über Ålesund São Tomé".chars() {
            input.handle_key(key(c));
        }
        for width in 1..=20 {
            draw_into(&input, width);
        }
    }

    #[test]
    fn esc_clears_then_closes() {
        let mut input = FilterInput::default();
        input.activate();
        input.handle_key(key('a'));
        let esc = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
        assert!(matches!(
            input.handle_key(esc),
            FilterAction::Changed(ref s) if s.is_empty()
        ));
        assert!(input.is_active());
        assert!(matches!(input.handle_key(esc), FilterAction::Cancelled));
        assert!(!input.is_active());
    }
}
