mod theme;

use crate::app::{AppModel, FormField, Focus, PopupDialog, ReviewOverlay, SessionForm, TextField};
use crate::domain::{
    Registry, ReviewLineKind, ReviewRow, SidebarRow, SidebarView, render_sidebar,
};
use crate::infra::{CellStyle, TermColor, TerminalSnapshot};
use ratatui::prelude::*;
use ratatui::widgets::*;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const SIDEBAR_WIDTH: u16 = 40;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PaneLayout {
    pub sidebar: Option<Rect>,
    pub terminal: Rect,
    pub status: Rect,
}

pub fn layout(area: Rect, sidebar_visible: bool) -> PaneLayout {
    let status_height = u16::from(area.height > 1);
    let body = Rect {
        height: area.height.saturating_sub(status_height),
        ..area
    };
    let status = Rect {
        y: body.y.saturating_add(body.height),
        height: status_height,
        ..area
    };

    let sidebar_width = if sidebar_visible {
        SIDEBAR_WIDTH.min(body.width / 2)
    } else {
        0
    };
    let sidebar = (sidebar_width > 0).then_some(Rect {
        width: sidebar_width,
        ..body
    });
    let terminal = Rect {
        x: body.x.saturating_add(sidebar_width),
        width: body.width.saturating_sub(sidebar_width),
        ..body
    };
    PaneLayout {
        sidebar,
        terminal,
        status,
    }
}

/// Rows and columns available to the session terminal below its title line.
pub fn terminal_size(area: Rect, sidebar_visible: bool) -> (u16, u16) {
    let pane = layout(area, sidebar_visible).terminal;
    (pane.height.saturating_sub(1).max(1), pane.width.max(1))
}

pub fn render(
    frame: &mut Frame,
    model: &AppModel,
    registry: &Registry,
    terminal: Option<&TerminalSnapshot>,
) {
    let full_area = frame.area();
    if full_area.width == 0 || full_area.height == 0 {
        return;
    }

    let panes = layout(full_area, model.sidebar.visible);
    if let Some(area) = panes.sidebar {
        let view = render_sidebar(registry, &model.sidebar);
        render_sidebar_panel(frame, area, &view, model.focus == Focus::Sidebar);
    }
    let overlay_open =
        model.form.is_some() || model.popup.is_some() || model.review.is_some() || model.help_open;
    render_terminal_pane(
        frame,
        panes.terminal,
        registry,
        terminal,
        model.focus == Focus::Terminal && !overlay_open,
    );
    render_status_bar(frame, panes.status, model, registry);

    if let Some(review) = &model.review {
        render_review_overlay(frame, full_area, review);
    }
    if let Some(form) = &model.form {
        render_form_overlay(frame, full_area, form);
    }
    if model.help_open {
        render_help_overlay(frame, full_area);
    }
    if let Some(popup) = &model.popup {
        render_popup_overlay(frame, full_area, popup);
    }
}

fn render_sidebar_panel(frame: &mut Frame, area: Rect, view: &SidebarView, focused: bool) {
    let block = Block::default()
        .borders(Borders::RIGHT)
        .border_style(theme::border(focused))
        .style(Style::default().bg(theme::SURFACE))
        .title(Span::styled(
            " Sessions ",
            Style::default().fg(theme::FG).add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(inner);
    let width = chunks[0].width as usize;

    let mut selected_row = 0usize;
    let mut lines = Vec::with_capacity(view.rows.len());
    for (index, row) in view.rows.iter().enumerate() {
        if matches!(row, SidebarRow::Header { selected: true, .. }) {
            selected_row = index;
        }
        lines.push(sidebar_line(row, width, view.list_focused));
    }

    let height = chunks[0].height as usize;
    let offset = (selected_row + 1).saturating_sub(height);
    let paragraph =
        Paragraph::new(lines).scroll((u16::try_from(offset).unwrap_or(u16::MAX), 0));
    frame.render_widget(paragraph, chunks[0]);

    let mut spans = Vec::new();
    for button in &view.buttons {
        spans.push(Span::styled(
            format!(" {} ", button.label),
            theme::button(button.focused),
        ));
        spans.push(Span::raw(" "));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), chunks[1]);
}

fn sidebar_line(row: &SidebarRow, width: usize, list_focused: bool) -> Line<'static> {
    match row {
        SidebarRow::Header {
            label,
            branch,
            status,
            additions,
            deletions,
            active,
            selected,
            ..
        } => {
            let marker = if *active { "● " } else { "  " };
            let totals = format!(" +{additions} -{deletions}");
            let branch = branch
                .as_deref()
                .map(|branch| format!(" {branch}"))
                .unwrap_or_default();
            let status = format!(" {status}");
            let fixed = UnicodeWidthStr::width(marker)
                + UnicodeWidthStr::width(totals.as_str())
                + UnicodeWidthStr::width(status.as_str());
            let label_room = width.saturating_sub(fixed);
            let label = truncate_end(label, label_room);
            let branch = truncate_end(
                &branch,
                label_room.saturating_sub(UnicodeWidthStr::width(label.as_str())),
            );
            let used = fixed
                + UnicodeWidthStr::width(label.as_str())
                + UnicodeWidthStr::width(branch.as_str());
            let pad = " ".repeat(width.saturating_sub(used));

            let base = if *selected && list_focused {
                theme::selected()
            } else if *selected {
                Style::default().fg(theme::FG).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme::FG)
            };
            Line::from(vec![
                Span::styled(marker.to_string(), base.fg(theme::ACCENT)),
                Span::styled(label, base),
                Span::styled(branch, base.fg(theme::MUTED)),
                Span::styled(status, base.fg(theme::DIM)),
                Span::styled(pad, base),
                Span::styled(format!(" +{additions}"), base.fg(theme::ADDED)),
                Span::styled(format!(" -{deletions}"), base.fg(theme::REMOVED)),
            ])
        }
        SidebarRow::File {
            symbol,
            additions,
            deletions,
            path,
        } => {
            let counts = format!(" +{additions} -{deletions} ");
            let room = width.saturating_sub(4 + UnicodeWidthStr::width(counts.as_str()));
            Line::from(vec![
                Span::styled(format!("  {symbol}"), Style::default().fg(theme::ACCENT)),
                Span::styled(counts, Style::default().fg(theme::DIM)),
                Span::styled(truncate_middle(path, room), Style::default().fg(theme::MUTED)),
            ])
        }
        SidebarRow::MoreFiles(count) => Line::from(Span::styled(
            format!("  … {count} more files"),
            Style::default().fg(theme::DIM),
        )),
        SidebarRow::Empty => Line::from(Span::styled(
            "  No sessions yet. Press n to start one.",
            Style::default().fg(theme::DIM),
        )),
    }
}

fn render_terminal_pane(
    frame: &mut Frame,
    area: Rect,
    registry: &Registry,
    snapshot: Option<&TerminalSnapshot>,
    show_cursor: bool,
) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let title_area = Rect { height: 1, ..area };
    let body = Rect {
        y: area.y.saturating_add(1),
        height: area.height.saturating_sub(1),
        ..area
    };

    let title = match registry.active() {
        Some(session) => {
            let mut text = format!(" {}", session.label);
            if let Some(branch) = &session.branch {
                text.push_str(&format!(" · {branch}"));
            }
            text.push_str(&format!(" · {}", session.work_area.display()));
            truncate_middle(&text, area.width as usize)
        }
        None => " agentbay".to_string(),
    };
    frame.render_widget(
        Paragraph::new(title).style(Style::default().fg(theme::MUTED).bg(theme::BAR_BG)),
        title_area,
    );

    let Some(snapshot) = snapshot else {
        let hint = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                "No active session.",
                Style::default().fg(theme::FG).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                "Ctrl+G focuses the sidebar; n starts a new session.",
                Style::default().fg(theme::DIM),
            )),
        ])
        .alignment(Alignment::Center);
        frame.render_widget(hint, body);
        return;
    };

    let mut lines: Vec<Line> = snapshot
        .lines
        .iter()
        .take(body.height as usize)
        .map(|runs| {
            Line::from(
                runs.iter()
                    .map(|run| Span::styled(run.text.clone(), cell_style(run.style)))
                    .collect::<Vec<_>>(),
            )
        })
        .collect();
    if snapshot.exited {
        let exited = Line::from(Span::styled(
            "[process exited]",
            Style::default()
                .fg(theme::WARNING)
                .add_modifier(Modifier::BOLD),
        ));
        if lines.len() >= body.height as usize {
            lines.pop();
        }
        lines.push(exited);
    }
    frame.render_widget(Paragraph::new(lines), body);

    if !show_cursor || snapshot.exited {
        return;
    }
    if let Some((row, col)) = snapshot.cursor {
        if row < body.height && col < body.width {
            frame.set_cursor_position((body.x + col, body.y + row));
        }
    }
}

fn term_color(color: TermColor) -> Color {
    match color {
        TermColor::Indexed(index) => Color::Indexed(index),
        TermColor::Rgb(r, g, b) => Color::Rgb(r, g, b),
    }
}

fn cell_style(style: CellStyle) -> Style {
    let mut out = Style::default();
    if let Some(fg) = style.fg {
        out = out.fg(term_color(fg));
    }
    if let Some(bg) = style.bg {
        out = out.bg(term_color(bg));
    }
    if style.bold {
        out = out.add_modifier(Modifier::BOLD);
    }
    if style.italic {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if style.underline {
        out = out.add_modifier(Modifier::UNDERLINED);
    }
    if style.inverse {
        out = out.add_modifier(Modifier::REVERSED);
    }
    out
}

fn render_status_bar(frame: &mut Frame, area: Rect, model: &AppModel, registry: &Registry) {
    if area.height == 0 {
        return;
    }
    let base = Style::default().fg(theme::MUTED).bg(theme::BAR_BG);

    let (left, left_style) = match &model.notice {
        Some(notice) => (notice.clone(), base.fg(theme::WARNING)),
        None => (status_hint(model).to_string(), base),
    };
    let mut right = format!("{} sessions ", registry.len());
    if let Some(bridge) = &model.bridge_status {
        right = format!("{bridge} · {right}");
    }

    let width = area.width as usize;
    let right_width = UnicodeWidthStr::width(right.as_str());
    let left = truncate_end(&format!(" {left}"), width.saturating_sub(right_width + 1));
    let pad = width.saturating_sub(UnicodeWidthStr::width(left.as_str()) + right_width);

    let line = Line::from(vec![
        Span::styled(left, left_style),
        Span::styled(" ".repeat(pad), base),
        Span::styled(right, base.fg(theme::DIM)),
    ]);
    frame.render_widget(Paragraph::new(line).style(base), area);
}

fn status_hint(model: &AppModel) -> &'static str {
    if model.popup.is_some() {
        "←/→ choose · Enter confirm · Esc cancel"
    } else if model.form.is_some() {
        "Tab switch field · Enter start · Esc cancel"
    } else if model.review.is_some() {
        "↑/↓ move · Enter open file · Esc close"
    } else if model.focus == Focus::Sidebar {
        "↑/↓ select · Enter switch · Tab actions · n/x/r/o · Esc terminal · F1 help · Ctrl+Q quit"
    } else {
        "Ctrl+G sidebar · Ctrl+T toggle sidebar · F1 help · Ctrl+Q quit"
    }
}

fn render_popup_overlay(frame: &mut Frame, area: Rect, dialog: &PopupDialog) {
    let popup_area = centered_rect(64, 36, area);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme::border(true))
        .padding(Padding::horizontal(1))
        .title(Span::styled(
            format!(" {} ", dialog.popup.title),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(2),
            Constraint::Length(1),
        ])
        .split(inner);

    frame.render_widget(
        Paragraph::new(dialog.popup.message.as_str()).wrap(Wrap { trim: false }),
        chunks[0],
    );

    let mut spans = Vec::new();
    for (index, action) in dialog.popup.actions.iter().enumerate() {
        if index > 0 {
            spans.push(Span::raw("   "));
        }
        let style = if index == dialog.selected {
            Style::default()
                .add_modifier(Modifier::REVERSED)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let mut chars = action.label.chars();
        let first: String = chars.next().map(String::from).unwrap_or_default();
        spans.push(Span::styled("[ ", style));
        spans.push(Span::styled(
            first,
            style.fg(theme::ACCENT).add_modifier(Modifier::UNDERLINED),
        ));
        spans.push(Span::styled(format!("{} ]", chars.as_str()), style));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).alignment(Alignment::Center),
        chunks[1],
    );

    frame.render_widget(
        Paragraph::new("←/→ choose  Enter confirm  Esc cancel  or press the highlighted letter")
            .style(Style::default().fg(theme::DIM))
            .alignment(Alignment::Center),
        chunks[2],
    );
}

fn render_form_overlay(frame: &mut Frame, area: Rect, form: &SessionForm) {
    let form_area = centered_rect(70, 40, area);
    frame.render_widget(Clear, form_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme::border(true))
        .padding(Padding::horizontal(1))
        .title(" New session ");
    let inner = block.inner(form_area);
    frame.render_widget(block, form_area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner);

    let label = |text: &'static str, focused: bool| {
        let style = if focused {
            Style::default().fg(theme::ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme::MUTED)
        };
        Paragraph::new(Span::styled(text, style))
    };

    let path_focused = form.focus == FormField::WorkArea;
    frame.render_widget(label("Work area (existing dir, new worktree or new dir)", path_focused), chunks[0]);
    render_text_field(frame, chunks[1], &form.work_area, path_focused);
    frame.render_widget(label("First prompt (optional)", !path_focused), chunks[3]);
    render_text_field(frame, chunks[4], &form.prompt, !path_focused);

    if let Some(error) = &form.error {
        frame.render_widget(
            Paragraph::new(Span::styled(error.as_str(), Style::default().fg(theme::REMOVED))),
            chunks[5],
        );
    }
    frame.render_widget(
        Paragraph::new("Tab switch field  Enter start  Esc cancel")
            .style(Style::default().fg(theme::DIM))
            .alignment(Alignment::Center),
        chunks[6],
    );
}

fn render_text_field(frame: &mut Frame, area: Rect, field: &TextField, focused: bool) {
    let width = area.width as usize;
    if width == 0 {
        return;
    }
    let before: String = field.text.chars().take(field.cursor_col).collect();
    let cursor_x = UnicodeWidthStr::width(before.as_str());
    let scroll = (cursor_x + 1).saturating_sub(width);

    let style = Style::default().fg(theme::FG).bg(theme::BAR_BG);
    frame.render_widget(
        Paragraph::new(field.text.as_str())
            .style(style)
            .scroll((0, u16::try_from(scroll).unwrap_or(u16::MAX))),
        area,
    );
    if focused {
        let x = area.x + (cursor_x - scroll) as u16;
        frame.set_cursor_position((x, area.y));
    }
}

fn render_review_overlay(frame: &mut Frame, area: Rect, review: &ReviewOverlay) {
    let review_area = centered_rect(92, 88, area);
    frame.render_widget(Clear, review_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme::border(true))
        .title(Span::styled(
            format!(" Review · {} ", review.view.title),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(review_area);
    frame.render_widget(block, review_area);

    if review.view.files.is_empty() {
        frame.render_widget(
            Paragraph::new("No changes in this work area.")
                .style(Style::default().fg(theme::DIM))
                .alignment(Alignment::Center),
            inner,
        );
        return;
    }

    let width = inner.width as usize;
    let height = inner.height as usize;
    let offset = (review.cursor + 1).saturating_sub(height);
    let lines: Vec<Line> = review
        .view
        .rows()
        .into_iter()
        .enumerate()
        .skip(offset)
        .take(height)
        .map(|(index, row)| {
            let line = review_line(row, width);
            if index == review.cursor {
                line.patch_style(Style::default().bg(theme::ACCENT_BG))
            } else {
                line
            }
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn review_line(row: ReviewRow<'_>, width: usize) -> Line<'static> {
    match row {
        ReviewRow::FileHeader(file) => Line::from(vec![
            Span::styled(
                format!("{} ", file.kind.symbol()),
                Style::default().fg(theme::ACCENT).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                truncate_middle(&file.path, width.saturating_sub(16)),
                Style::default().fg(theme::FG).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  +{}", file.additions), Style::default().fg(theme::ADDED)),
            Span::styled(format!(" -{}", file.deletions), Style::default().fg(theme::REMOVED)),
        ]),
        ReviewRow::Line(line) => {
            let color = match line.kind {
                ReviewLineKind::Hunk => theme::HUNK,
                ReviewLineKind::Added => theme::ADDED,
                ReviewLineKind::Removed => theme::REMOVED,
            };
            Line::from(Span::styled(
                truncate_end(&line.text, width),
                Style::default().fg(color),
            ))
        }
        ReviewRow::MoreLines(count) => Line::from(Span::styled(
            format!("… {count} more lines"),
            Style::default().fg(theme::DIM),
        )),
        ReviewRow::Blank => Line::from(""),
    }
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup = centered_rect(70, 70, area);
    frame.render_widget(Clear, popup);

    let text = vec![
        Line::from("Global"),
        Line::from("  - Ctrl+G: focus the sidebar (opens it if hidden)"),
        Line::from("  - Ctrl+T: show/hide the sidebar"),
        Line::from("  - Ctrl+Q: quit (kills every session)"),
        Line::from("  - F1: this help"),
        Line::from(""),
        Line::from("Sidebar"),
        Line::from("  - ↑/↓: select session, moving past the last row reaches the buttons"),
        Line::from("  - Tab: cycle New / Close / Review / Open"),
        Line::from("  - Enter: switch to session or run the focused button"),
        Line::from("  - n / x / r / o: new, close, review, open"),
        Line::from("  - Esc: leave the buttons, then hand focus to the terminal"),
        Line::from(""),
        Line::from("Terminal"),
        Line::from("  - Every other key goes to the agent in the active session"),
        Line::from(""),
        Line::from("Review"),
        Line::from("  - ↑/↓ PgUp/PgDn: move  Enter/o: open file  Esc: close"),
    ];

    let paragraph = Paragraph::new(text).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .padding(Padding::horizontal(1))
            .title(" Help (any key to close) "),
    );
    frame.render_widget(paragraph, popup);
}

fn truncate_end(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }
    let ellipsis = "…";
    let mut out = take_prefix_width(text, max_width.saturating_sub(1));
    out.push_str(ellipsis);
    out
}

fn truncate_middle(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }

    let available = max_width.saturating_sub(1);
    if available <= 4 {
        return truncate_end(text, max_width);
    }

    let left_width = available / 2;
    let right_width = available - left_width;
    let left = take_prefix_width(text, left_width);
    let right = take_suffix_width(text, right_width);
    format!("{left}…{right}")
}

fn take_prefix_width(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + ch_width > width {
            break;
        }
        used += ch_width;
        out.push(ch);
    }
    out
}

fn take_suffix_width(text: &str, width: usize) -> String {
    let mut chars = Vec::new();
    let mut used = 0;
    for ch in text.chars().rev() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + ch_width > width {
            break;
        }
        used += ch_width;
        chars.push(ch);
    }
    chars.into_iter().rev().collect()
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
