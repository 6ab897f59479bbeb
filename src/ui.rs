use ratatui::{
    backend::TestBackend,
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
    Frame, Terminal,
};

use crate::error::Result;
use crate::navigator::{ModeKind, NavigatorViewModel, SlotKind};
use crate::storage::WindowGeometry;
use crate::theme::Theme;
use crate::tree::NodeType;

const DEFAULT_WIDTH: u16 = 56;
const DEFAULT_HEIGHT: u16 = 16;

pub fn draw(frame: &mut Frame, view: &NavigatorViewModel, theme: &Theme, geometry: Option<WindowGeometry>) {
    let area = overlay_area(frame.area(), geometry);
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(title(view))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .title_style(Style::default().fg(theme.title))
        .style(Style::default().bg(theme.background));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(inner);

    match view.mode {
        ModeKind::Browse => draw_slots(frame, view, theme, chunks[0]),
        ModeKind::CommandPalette => draw_palette(frame, view, theme, chunks[0]),
        ModeKind::InputEdit => draw_edit(frame, view, theme, chunks[0]),
    }
    draw_status(frame, view, theme, chunks[1]);
}

/// The host screen while the overlay is hidden
pub fn draw_hidden(frame: &mut Frame, theme: &Theme, activate: char) {
    let hint = format!("Ctrl+{} opens keytree, Ctrl+C quits", activate.to_ascii_uppercase());
    let paragraph = Paragraph::new(hint).style(Style::default().fg(theme.status_fg));
    frame.render_widget(paragraph, frame.area());
}

/// Where the overlay goes: the saved geometry clamped to the screen, or centered
pub fn overlay_area(screen: Rect, geometry: Option<WindowGeometry>) -> Rect {
    match geometry {
        Some(g) => {
            let x = g.x.min(screen.width.saturating_sub(1));
            let y = g.y.min(screen.height.saturating_sub(1));
            Rect {
                x: screen.x + x,
                y: screen.y + y,
                width: g.width.min(screen.width - x),
                height: g.height.min(screen.height - y),
            }
        }
        None => {
            let width = DEFAULT_WIDTH.min(screen.width);
            let height = DEFAULT_HEIGHT.min(screen.height);
            Rect {
                x: screen.x + (screen.width - width) / 2,
                y: screen.y + (screen.height - height) / 2,
                width,
                height,
            }
        }
    }
}

fn title(view: &NavigatorViewModel) -> String {
    let mut title = String::from(" keytree");
    for segment in &view.breadcrumb {
        title.push_str(" / ");
        title.push_str(segment);
    }
    if view.total_pages > 1 {
        title.push_str(&format!("  [{}/{}]", view.page + 1, view.total_pages));
    }
    title.push(' ');
    title
}

fn draw_slots(frame: &mut Frame, view: &NavigatorViewModel, theme: &Theme, area: Rect) {
    if view.slots.is_empty() {
        let empty = Paragraph::new("(empty)").style(Style::default().fg(theme.page_control));
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = view
        .slots
        .iter()
        .map(|slot| {
            let (label, style) = match slot.kind {
                SlotKind::Item(node_type) => {
                    let suffix = match node_type {
                        NodeType::Directory => "/",
                        NodeType::VirtualDirectory => "/…",
                        NodeType::Input => ":",
                        NodeType::Action => "",
                    };
                    (
                        format!("{}{}", slot.label, suffix),
                        Style::default().fg(node_color(node_type, theme)),
                    )
                }
                SlotKind::PreviousPage | SlotKind::NextPage => (
                    slot.label.clone(),
                    Style::default()
                        .fg(theme.page_control)
                        .add_modifier(Modifier::ITALIC),
                ),
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {} ", slot.digit), Style::default().fg(theme.digit)),
                Span::styled(label, style),
            ]))
        })
        .collect();

    frame.render_widget(List::new(items), area);
}

fn draw_palette(frame: &mut Frame, view: &NavigatorViewModel, theme: &Theme, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(area);

    let query = view.query.as_deref().unwrap_or_default();
    let prompt = Paragraph::new(Line::from(vec![
        Span::styled("> ", Style::default().fg(theme.digit)),
        Span::styled(format!("{}_", query), Style::default().fg(theme.query)),
    ]));
    frame.render_widget(prompt, chunks[0]);

    let items: Vec<ListItem> = view
        .results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let style = if Some(i) == view.selected {
                Style::default()
                    .fg(theme.selected_fg)
                    .bg(theme.selected_bg)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.result_path)
            };
            ListItem::new(Line::from(Span::styled(format!(" {}", result.path), style)))
        })
        .collect();

    // Keep the selection on screen
    let height = chunks[1].height as usize;
    let skip = view
        .selected
        .map_or(0, |selected| (selected + 1).saturating_sub(height));
    frame.render_widget(List::new(items.into_iter().skip(skip).collect::<Vec<_>>()), chunks[1]);
}

fn draw_edit(frame: &mut Frame, view: &NavigatorViewModel, theme: &Theme, area: Rect) {
    let Some(edit) = &view.edit else {
        return;
    };
    let text = vec![
        Line::from(Span::styled(edit.label.clone(), Style::default().fg(theme.input))),
        Line::from(vec![
            Span::styled("> ", Style::default().fg(theme.digit)),
            Span::styled(format!("{}_", edit.buffer), Style::default().fg(theme.query)),
        ]),
    ];
    frame.render_widget(Paragraph::new(text), area);
}

fn draw_status(frame: &mut Frame, view: &NavigatorViewModel, theme: &Theme, area: Rect) {
    let line = if view.loading {
        Line::from(Span::styled("Loading…", Style::default().fg(theme.loading)))
    } else if let Some(message) = &view.message {
        Line::from(Span::styled(message.clone(), Style::default().fg(theme.message)))
    } else {
        let help = match view.mode {
            ModeKind::Browse => "1-9 select  ⌫ back  ` search  esc hide",
            ModeKind::CommandPalette => "type to search  ↑↓ select  ⏎ open  esc close",
            ModeKind::InputEdit => "⏎ save  esc cancel",
        };
        Line::from(Span::styled(help, Style::default().fg(theme.status_fg)))
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn node_color(node_type: NodeType, theme: &Theme) -> ratatui::style::Color {
    match node_type {
        NodeType::Directory => theme.directory,
        NodeType::Action => theme.action,
        NodeType::Input => theme.input,
        NodeType::VirtualDirectory => theme.virtual_directory,
    }
}

/// Render `view` off-screen and return the screen as text
pub fn render_to_string(view: &NavigatorViewModel, theme: &Theme, width: u16, height: u16) -> Result<String> {
    let backend = TestBackend::new(width, height);
    let mut terminal = Terminal::new(backend)?;
    terminal.draw(|frame| draw(frame, view, theme, None))?;
    Ok(buffer_to_string(terminal.backend().buffer()))
}

pub fn buffer_to_string(buffer: &Buffer) -> String {
    let mut result = String::new();

    for y in 0..buffer.area().height {
        for x in 0..buffer.area().width {
            let sym = buffer[(x, y)].symbol();

            // Use a space for empty cells to make output more readable
            if sym.is_empty() {
                result.push(' ');
            } else {
                result.push_str(sym);
            }
        }
        result.push('\n');
    }

    result
}
