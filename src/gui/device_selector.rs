use std::{io::stdout, path::PathBuf, time::Duration};

use crate::gui::error::MonitorError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// What a key press does to the list.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Move(usize),
    Pick(usize),
    Quit,
    Ignore,
}

fn step(cursor: usize, n_ports: usize, code: KeyCode) -> Step {
    match code {
        KeyCode::Down | KeyCode::Char('j') => Step::Move((cursor + 1) % n_ports),
        KeyCode::Up | KeyCode::Char('k') => Step::Move((cursor + n_ports - 1) % n_ports),
        KeyCode::Enter => Step::Pick(cursor),
        KeyCode::Char('q') | KeyCode::Esc => Step::Quit,
        _ => Step::Ignore,
    }
}

/// Lets the user pick the serial device a board is plugged into. Returns
/// `None` if there is nothing to pick from or the user quits.
pub fn device_selector(mut available_ports: Vec<PathBuf>) -> Result<Option<PathBuf>, MonitorError> {
    let n_ports = available_ports.len();
    if n_ports == 0 {
        return Ok(None);
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    let selected_port = loop {
        let title = Title::from(" Board Selector ".magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Select ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let port_names = available_ports.iter().map(|p| p.to_string_lossy());
        let list = List::new(port_names)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match step(cursor, n_ports, key.code) {
                        Step::Move(next) => cursor = next,
                        Step::Pick(i) => break Some(i),
                        Step::Quit => break None,
                        Step::Ignore => {}
                    }
                }
            }
        }
    };

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(selected_port.map(|i| available_ports.swap_remove(i)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps() {
        assert_eq!(step(0, 3, KeyCode::Up), Step::Move(2));
        assert_eq!(step(2, 3, KeyCode::Down), Step::Move(0));
        assert_eq!(step(1, 3, KeyCode::Char('j')), Step::Move(2));
        assert_eq!(step(1, 3, KeyCode::Enter), Step::Pick(1));
        assert_eq!(step(1, 3, KeyCode::Esc), Step::Quit);
        assert_eq!(step(1, 3, KeyCode::Char('z')), Step::Ignore);
    }

    #[test]
    fn nothing_to_pick() {
        assert!(matches!(device_selector(Vec::new()), Ok(None)));
    }
}
