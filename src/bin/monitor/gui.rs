use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};
use std::{
    io,
    sync::mpsc::SyncSender,
    time::{Duration, Instant},
};

use touchfloor::dummy_floor::DummyFloorHandle;
use touchfloor::grid::Grid;
use touchfloor::gui::MonitorError;
use touchfloor::pipeline::{ControlCommand, Processor};
use touchfloor::tracker::{Touch, TrackerDelta};

struct App {
    processor: Processor,
    control: SyncSender<ControlCommand>,
    floor: Option<DummyFloorHandle>,
    flood: bool,
    delta: TrackerDelta,
    last_command: Option<ControlCommand>,
}

impl App {
    fn new(
        processor: Processor,
        control: SyncSender<ControlCommand>,
        floor: Option<DummyFloorHandle>,
    ) -> App {
        App {
            processor,
            control,
            floor,
            flood: false,
            delta: TrackerDelta::default(),
            last_command: None,
        }
    }

    fn on_tick(&mut self) {
        self.delta = self.processor.tick();
    }

    /// Handles a key press. Returns `false` when the user asked to quit.
    fn on_key(&mut self, key: char) -> Result<bool, MonitorError> {
        if key == 'q' {
            return Ok(false);
        }
        if let Some(command) = ControlCommand::from_key(key) {
            self.control.try_send(command)?;
            self.last_command = Some(command);
        } else if let Some(floor) = &self.floor {
            match key {
                'f' => {
                    self.flood = !self.flood;
                    floor.set_flood(self.flood);
                }
                '0'..='9' => floor.set_touches(key as usize - '0' as usize),
                _ => {}
            }
        }
        Ok(true)
    }
}

pub fn engage_gui(
    processor: Processor,
    control: SyncSender<ControlCommand>,
    floor: Option<DummyFloorHandle>,
    tick_rate: Duration,
) -> Result<(), MonitorError> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let app = App::new(processor, control, floor);
    let res = run_app(&mut terminal, app, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> Result<(), MonitorError> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, &app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let KeyCode::Char(c) = key.code {
                        if !app.on_key(c)? {
                            return Ok(());
                        }
                    }
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

/// Grey ramp from black to white.
fn shade(value: u16) -> Color {
    Color::Indexed(232 + (value as u32 * 23 / u16::MAX as u32) as u8)
}

/// Two terminal cells per surface pixel, with touches marked by their id.
fn heat_lines(surface: &Grid, touches: &[Touch]) -> Vec<Line<'static>> {
    (0..surface.height())
        .map(|y| {
            let spans: Vec<Span> = (0..surface.width())
                .map(|x| {
                    let value = surface.get(x, y).unwrap_or(0);
                    let style = Style::default().bg(shade(value));
                    let marker = touches.iter().find(|t| {
                        t.position.x.round() as i64 == x as i64
                            && t.position.y.round() as i64 == y as i64
                    });
                    match marker {
                        Some(t) => Span::styled(
                            format!("{:>2}", t.id),
                            style.fg(Color::Red).add_modifier(Modifier::BOLD),
                        ),
                        None => Span::styled("  ", style),
                    }
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(32)])
        .split(f.size());

    let heatmap = Paragraph::new(heat_lines(app.processor.surface(), &app.delta.confirmed))
        .block(Block::default().title(" Surface ").borders(Borders::ALL));
    f.render_widget(heatmap, chunks[0]);

    let mut items: Vec<ListItem> = app
        .delta
        .confirmed
        .iter()
        .map(|t| ListItem::new(format!("{:>2} {}", t.id, t.position)))
        .collect();
    items.push(ListItem::new(""));
    items.push(ListItem::new(format!("tick {}", app.processor.ticks())));
    items.push(ListItem::new(format!(
        "boards {}",
        app.processor.mapper().boards().len()
    )));
    if let Some(command) = app.last_command {
        items.push(ListItem::new(format!("last {:?}", command)));
    }
    items.push(ListItem::new(""));
    items.push(ListItem::new("l/u/x calibrate, q quit"));
    if app.floor.is_some() {
        items.push(ListItem::new("f flood, 0-9 touches"));
    }

    let touches = List::new(items).block(Block::default().title(" Touches ").borders(Borders::ALL));
    f.render_widget(touches, chunks[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use touchfloor::Point;

    #[test]
    fn shade_spans_the_ramp() {
        assert_eq!(shade(0), Color::Indexed(232));
        assert_eq!(shade(u16::MAX), Color::Indexed(255));
    }

    #[test]
    fn touches_are_marked() {
        let surface = Grid::new(3, 2);
        let touch = Touch {
            id: 7,
            position: Point { x: 1.2, y: 0.8 },
        };
        let lines = heat_lines(&surface, &[touch]);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].spans.len(), 3);
        assert_eq!(lines[1].spans[1].content, " 7");
        assert_eq!(lines[0].spans[1].content, "  ");
    }
}
