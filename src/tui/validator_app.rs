//! TUI for the validator with per-country progress display

use crate::proxy::scheduler::ProbeEvent;
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Duration;

/// Maximum number of recent entries to keep for display
const MAX_RECENT_ENTRIES: usize = 100;

/// Validator TUI application state
pub struct ValidatorApp {
    /// Countries in this run
    total_countries: usize,
    /// Candidates in this run
    total_candidates: usize,
    /// Countries whose scheduler finished
    finished_countries: usize,
    /// Country currently being worked on
    current_country: Option<String>,
    /// Network probes issued
    probes: usize,
    /// Results served from the cache
    cache_hits: usize,
    accepted_count: usize,
    rejected_count: usize,
    recent_accepted: VecDeque<String>,
    recent_rejected: VecDeque<String>,
    /// Selected list (0 = accepted, 1 = rejected)
    selected_list: usize,
    list_state: ListState,
    status_message: String,
    is_complete: bool,
    should_quit: bool,
}

impl ValidatorApp {
    pub fn new(total_countries: usize, total_candidates: usize) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            total_countries,
            total_candidates,
            finished_countries: 0,
            current_country: None,
            probes: 0,
            cache_hits: 0,
            accepted_count: 0,
            rejected_count: 0,
            recent_accepted: VecDeque::new(),
            recent_rejected: VecDeque::new(),
            selected_list: 0,
            list_state,
            status_message: "Starting validation... Press 'q' to quit.".to_string(),
            is_complete: false,
            should_quit: false,
        }
    }

    /// Whether every country finished before the user quit
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Run the TUI until the user quits, consuming progress events from `rx`
    pub async fn run(&mut self, rx: UnboundedReceiver<ProbeEvent>) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal, rx).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        mut rx: UnboundedReceiver<ProbeEvent>,
    ) -> Result<()> {
        loop {
            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            loop {
                match rx.try_recv() {
                    Ok(event) => self.apply(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.mark_complete();
                        break;
                    }
                }
            }

            // Yield so the validation tasks keep making progress
            tokio::task::yield_now().await;
        }

        Ok(())
    }

    fn mark_complete(&mut self) {
        if self.is_complete {
            return;
        }
        self.is_complete = true;
        self.status_message = format!(
            "Complete! Countries: {} | Accepted: {} | Probes: {} | Cached: {} | Press 'q' to quit",
            self.total_countries, self.accepted_count, self.probes, self.cache_hits
        );
    }

    fn apply(&mut self, event: ProbeEvent) {
        match event {
            ProbeEvent::CountryStarted { country, .. } => {
                self.current_country = Some(country);
            }
            ProbeEvent::Probed { result, cached, .. } => {
                if cached {
                    self.cache_hits += 1;
                } else {
                    self.probes += 1;
                }
                if !result.valid {
                    self.rejected_count += 1;
                    let label = if cached {
                        format!("{} (cached)", result.address)
                    } else {
                        result.address
                    };
                    push_recent(&mut self.recent_rejected, label);
                }
            }
            ProbeEvent::Accepted {
                country,
                address,
                latency_ms,
            } => {
                self.accepted_count += 1;
                push_recent(
                    &mut self.recent_accepted,
                    format!("{}#{} ({}ms)", address, country, latency_ms),
                );
            }
            ProbeEvent::CountryFinished(_) => {
                self.finished_countries += 1;
                // Abandoned probes may still hold the channel open
                if self.finished_countries >= self.total_countries {
                    self.mark_complete();
                }
            }
        }

        if !self.is_complete {
            let percentage = if self.total_countries > 0 {
                (self.finished_countries as f64 / self.total_countries as f64 * 100.0) as u32
            } else {
                100
            };
            self.status_message = format!(
                "Validating {}... {}% ({}/{} countries) | Accepted: {} | Probes: {} | Cached: {}",
                self.current_country.as_deref().unwrap_or("-"),
                percentage,
                self.finished_countries,
                self.total_countries,
                self.accepted_count,
                self.probes,
                self.cache_hits
            );
        }
    }

    fn handle_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(i) if i < len.saturating_sub(1) => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn selected_len(&self) -> usize {
        if self.selected_list == 0 {
            self.recent_accepted.len()
        } else {
            self.recent_rejected.len()
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Entry lists
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new(format!(
            "ProxyIP Quota Validator ({} candidates)",
            self.total_candidates
        ))
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let progress = if self.total_countries > 0 {
            (self.finished_countries as f64 / self.total_countries as f64 * 100.0) as u16
        } else {
            100
        };
        let progress_label = format!(
            "{}/{} countries ({}%)",
            self.finished_countries, self.total_countries, progress
        );
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(progress.min(100))
            .label(progress_label);
        f.render_widget(gauge, chunks[1]);

        let list_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        Self::render_entry_list(
            f,
            list_chunks[0],
            "Accepted",
            &self.recent_accepted,
            self.accepted_count,
            self.selected_list == 0,
            Color::Green,
            if self.selected_list == 0 { Some(&mut self.list_state) } else { None },
        );

        Self::render_entry_list(
            f,
            list_chunks[1],
            "Rejected",
            &self.recent_rejected,
            self.rejected_count,
            self.selected_list == 1,
            Color::Red,
            if self.selected_list == 1 { Some(&mut self.list_state) } else { None },
        );

        let status = Paragraph::new(self.status_message.clone())
            .style(if self.is_complete {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }

    #[allow(clippy::too_many_arguments)]
    fn render_entry_list(
        f: &mut Frame,
        area: Rect,
        title: &str,
        entries: &VecDeque<String>,
        total_count: usize,
        is_selected: bool,
        color: Color,
        list_state: Option<&mut ListState>,
    ) {
        let items: Vec<ListItem> = entries
            .iter()
            .rev() // Show newest first
            .map(|entry| ListItem::new(entry.clone()).style(Style::default().fg(color)))
            .collect();

        let block_title = format!("{} ({})", title, total_count);
        let border_style = if is_selected {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(block_title)
                    .border_style(border_style),
            )
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol(">> ");

        if let Some(state) = list_state {
            f.render_stateful_widget(list, area, state);
        } else {
            f.render_widget(list, area);
        }
    }
}

fn push_recent(list: &mut VecDeque<String>, entry: String) {
    list.push_back(entry);
    if list.len() > MAX_RECENT_ENTRIES {
        list.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::{CountrySummary, ProbeResult};

    #[test]
    fn test_apply_tracks_progress() {
        let mut app = ValidatorApp::new(1, 2);
        app.apply(ProbeEvent::CountryStarted {
            country: "US".to_string(),
            candidates: 2,
            quota: 1,
        });
        app.apply(ProbeEvent::Probed {
            country: "US".to_string(),
            result: ProbeResult::invalid("2.2.2.2:443"),
            cached: false,
        });
        app.apply(ProbeEvent::Probed {
            country: "US".to_string(),
            result: ProbeResult::valid("1.1.1.1:443", 50),
            cached: true,
        });
        app.apply(ProbeEvent::Accepted {
            country: "US".to_string(),
            address: "1.1.1.1:443".to_string(),
            latency_ms: 50,
        });
        app.apply(ProbeEvent::CountryFinished(CountrySummary {
            country: "US".to_string(),
            candidates: 2,
            accepted: 1,
            probes: 1,
            cache_hits: 1,
            quota: 1,
            quota_met: true,
        }));

        assert_eq!(app.probes, 1);
        assert_eq!(app.cache_hits, 1);
        assert_eq!(app.accepted_count, 1);
        assert_eq!(app.rejected_count, 1);
        assert_eq!(app.finished_countries, 1);
        assert_eq!(app.recent_accepted.back().unwrap(), "1.1.1.1:443#US (50ms)");
        assert!(app.is_complete());
        assert!(app.status_message.starts_with("Complete!"));
    }

    #[test]
    fn test_progress_before_last_country() {
        let mut app = ValidatorApp::new(2, 4);
        app.apply(ProbeEvent::CountryStarted {
            country: "NL".to_string(),
            candidates: 2,
            quota: 1,
        });
        app.apply(ProbeEvent::CountryFinished(CountrySummary {
            country: "NL".to_string(),
            candidates: 2,
            accepted: 0,
            probes: 2,
            cache_hits: 0,
            quota: 1,
            quota_met: false,
        }));

        assert!(!app.is_complete());
        assert!(app.status_message.contains("50% (1/2 countries)"));
    }

    #[test]
    fn test_recent_entries_are_bounded() {
        let mut list = VecDeque::new();
        for i in 0..(MAX_RECENT_ENTRIES + 10) {
            push_recent(&mut list, i.to_string());
        }
        assert_eq!(list.len(), MAX_RECENT_ENTRIES);
        assert_eq!(list.front().unwrap(), "10");
    }

    #[test]
    fn test_list_navigation_wraps() {
        let mut app = ValidatorApp::new(1, 1);
        push_recent(&mut app.recent_accepted, "a".to_string());
        push_recent(&mut app.recent_accepted, "b".to_string());

        app.handle_input(KeyCode::Down);
        assert_eq!(app.list_state.selected(), Some(1));
        app.handle_input(KeyCode::Down);
        assert_eq!(app.list_state.selected(), Some(0));
        app.handle_input(KeyCode::Up);
        assert_eq!(app.list_state.selected(), Some(1));

        app.handle_input(KeyCode::Tab);
        assert_eq!(app.selected_list, 1);
        app.handle_input(KeyCode::Char('q'));
        assert!(app.should_quit);
    }
}
