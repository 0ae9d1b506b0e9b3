//! Terminal UI rendering for the monitor.
//!
//! Handles raw-mode setup/teardown and draws the status indicator, output
//! pane, and the overlay dialogs (script picker, stop confirmation, path
//! entry) with ratatui.

use std::io::{self, Stdout};

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::Terminal;

use crate::app::{App, InputMode};
use crate::output::{sanitize_text, StreamKind};

pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Enables raw mode and enters the alternate screen.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

/// Restores the terminal to its original state.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the monitor state.
pub fn draw(app: &mut App, terminal: &mut TuiTerminal) -> io::Result<()> {
    let title = match app.current_script() {
        Some(script) if app.run_state.is_running => format!("runbar · {}", script),
        _ => "runbar".to_string(),
    };
    execute!(terminal.backend_mut(), SetTitle(title))?;
    terminal.draw(|frame| {
        let area = frame.size();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(area);

        let border_style = Style::default().fg(Color::DarkGray);

        let status_style = if app.run_state.is_running {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::Gray)
        };
        let status = Paragraph::new(Line::from(Span::styled(app.status_line(), status_style)))
            .block(
                Block::default()
                    .title("Status")
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(border_style),
            );
        frame.render_widget(status, rows[0]);

        let output_block = Block::default()
            .title(output_title(app))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(border_style);
        let output_area = output_block.inner(rows[1]);
        app.view_height = output_area.height as usize;

        let (lines, total) = output_lines(app, output_area.height as usize, output_area.width as usize);
        frame.render_widget(Paragraph::new(lines).block(output_block), rows[1]);
        if total == 0 {
            let empty = Paragraph::new("No output yet").style(Style::default().fg(Color::DarkGray));
            frame.render_widget(empty, output_area);
        }

        let help_line = match app.input_mode {
            InputMode::EditPath => format!("Project path: {}▌ (Enter to save, Esc to cancel)", app.input),
            _ => app
                .notice()
                .map(str::to_string)
                .unwrap_or_else(|| {
                    "s start | x stop | o open project | f follow | ↑/↓ scroll | q quit".to_string()
                }),
        };
        let help = Paragraph::new(Line::from(Span::styled(
            help_line,
            Style::default().fg(Color::DarkGray),
        )))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style),
        );
        frame.render_widget(help, rows[2]);

        match app.input_mode {
            InputMode::PickScript => draw_picker(frame, app, area),
            InputMode::ConfirmStop => draw_confirm(frame, app, area),
            _ => {}
        }
    })?;
    Ok(())
}

fn output_title(app: &App) -> String {
    if app.run_state.is_running {
        match app.current_script() {
            Some(script) => format!("Output - {} (running)", script),
            None => "Output (running)".to_string(),
        }
    } else if app.follow {
        "Output".to_string()
    } else {
        "Output (scrolling, f to follow)".to_string()
    }
}

fn output_lines(app: &App, height: usize, width: usize) -> (Text<'static>, usize) {
    if height == 0 {
        return (Text::default(), 0);
    }
    let total = app.output.len();
    let start = if app.follow {
        total.saturating_sub(height)
    } else {
        app.scroll.min(total.saturating_sub(height))
    };
    let lines = app
        .output
        .iter()
        .skip(start)
        .take(height)
        .map(|chunk| {
            let text = truncate(&sanitize_text(&chunk.text, true), width.saturating_sub(1));
            let style = match chunk.stream {
                StreamKind::Stdout => Style::default(),
                StreamKind::Stderr => Style::default().fg(Color::Red),
            };
            Line::from(Span::styled(text, style))
        })
        .collect::<Vec<_>>();
    (Text::from(lines), total)
}

fn draw_picker(frame: &mut ratatui::Frame<'_>, app: &App, area: Rect) {
    let popup = centered_rect(50, 60, area);
    let items = app
        .scripts
        .iter()
        .map(|script| {
            ListItem::new(Line::from(vec![
                Span::styled(script.name.clone(), Style::default().add_modifier(Modifier::BOLD)),
                Span::styled(format!("  {}", script.command), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect::<Vec<_>>();
    let list = List::new(items)
        .block(
            Block::default()
                .title("Run script (Enter to start, Esc to cancel)")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("▶ ");
    let mut state = ListState::default();
    if !app.scripts.is_empty() {
        state.select(Some(app.picker_selected.min(app.scripts.len() - 1)));
    }
    frame.render_widget(Clear, popup);
    frame.render_stateful_widget(list, popup, &mut state);
}

fn draw_confirm(frame: &mut ratatui::Frame<'_>, app: &App, area: Rect) {
    let popup = centered_rect(50, 20, area);
    let script = app.current_script().unwrap_or("the current script");
    let text = format!("{} is still running.\nStop it and start a new run? (y/n)", script);
    let dialog = Paragraph::new(text).block(
        Block::default()
            .title("Confirm stop")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    frame.render_widget(Clear, popup);
    frame.render_widget(dialog, popup);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

fn truncate(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = text.chars().take(max.saturating_sub(1)).collect::<String>();
    out.push('~');
    out
}
