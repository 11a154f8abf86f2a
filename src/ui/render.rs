//! Frame rendering for the prompter

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use crate::theme::Styles;

/// Summary table waiting to be shown above the next list.
#[derive(Debug, Clone, Default)]
pub struct PendingSummary {
    pub title: String,
    pub rows: Vec<(String, String)>,
}

pub enum Body<'a> {
    Choices { options: &'a [String], selected: usize },
    Input { text: String },
}

pub struct Screen<'a> {
    pub title: &'a str,
    pub summary: Option<&'a PendingSummary>,
    pub notice: Option<&'a str>,
    pub body: Body<'a>,
}

const LIST_HINT: &str = "↑/↓ move  Enter select  Esc cancel";
const INPUT_HINT: &str = "Enter confirm  Backspace delete  Esc cancel";

const TITLE_HEIGHT: u16 = 3;
const HINT_HEIGHT: u16 = 1;
/// Both borders of a box.
const FRAME: u16 = 2;

/// Columns needed to fit `rows` summary lines into `available` terminal rows.
fn summary_columns(rows: usize, available: u16) -> usize {
    let inner = available.saturating_sub(FRAME).max(1) as usize;
    rows.div_ceil(inner).clamp(1, 2)
}

pub fn draw(f: &mut Frame, screen: &Screen) {
    let area = f.area();
    let notice_height = if screen.notice.is_some() { 1 } else { 0 };
    let body_height = match &screen.body {
        Body::Choices { options, .. } => options.len() as u16 + FRAME,
        Body::Input { .. } => 1 + FRAME,
    };

    // The body keeps room for every option; the summary gets what is left
    let spare = area
        .height
        .saturating_sub(TITLE_HEIGHT + notice_height + body_height + HINT_HEIGHT);
    let (summary_height, columns) = match screen.summary {
        Some(summary) => {
            let columns = summary_columns(summary.rows.len(), spare);
            let lines = summary.rows.len().div_ceil(columns) as u16;
            ((lines + FRAME).min(spare), columns)
        }
        None => (0, 1),
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(TITLE_HEIGHT),
            Constraint::Length(summary_height),
            Constraint::Length(notice_height),
            Constraint::Min(body_height.min(area.height)),
            Constraint::Length(HINT_HEIGHT),
        ])
        .split(area);

    f.render_widget(
        Block::default().style(if screen.summary.is_some() {
            Styles::panel_bg_danger()
        } else {
            Styles::panel_bg()
        }),
        f.area(),
    );

    render_title(f, chunks[0], screen.title);
    if let Some(summary) = screen.summary {
        render_summary(f, chunks[1], summary, columns);
    }
    if let Some(notice) = screen.notice {
        f.render_widget(
            Paragraph::new(Span::styled(notice, Styles::notice())),
            chunks[2],
        );
    }

    let hint = match &screen.body {
        Body::Choices { options, selected } => {
            render_choices(f, chunks[3], options, *selected);
            LIST_HINT
        }
        Body::Input { text } => {
            render_input(f, chunks[3], text);
            INPUT_HINT
        }
    };
    f.render_widget(
        Paragraph::new(Span::styled(hint, Styles::hint())).alignment(Alignment::Center),
        chunks[4],
    );
}

fn render_title(f: &mut Frame, area: Rect, title: &str) {
    let widget = Paragraph::new(Span::styled(title, Styles::title()))
        .block(Block::default().borders(Borders::ALL).border_style(Styles::border()))
        .alignment(Alignment::Center);
    f.render_widget(widget, area);
}

/// Rows fill the first column top to bottom, then the second.
fn render_summary(f: &mut Frame, area: Rect, summary: &PendingSummary, columns: usize) {
    let label_width = summary
        .rows
        .iter()
        .map(|(label, _)| label.chars().count())
        .max()
        .unwrap_or(0);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Styles::border_danger())
        .title(Span::styled(summary.title.as_str(), Styles::title()));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let per_column = summary.rows.len().div_ceil(columns).max(1);
    let areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![Constraint::Ratio(1, columns as u32); columns])
        .split(inner);

    for (rows, column) in summary.rows.chunks(per_column).zip(areas.iter()) {
        let lines: Vec<Line> = rows
            .iter()
            .map(|(label, value)| {
                Line::from(vec![
                    Span::styled(format!("{:<width$}  ", label, width = label_width), Styles::label()),
                    Span::styled(value.as_str(), Styles::text()),
                ])
            })
            .collect();
        f.render_widget(Paragraph::new(lines), *column);
    }
}

fn render_choices(f: &mut Frame, area: Rect, options: &[String], selected: usize) {
    let items: Vec<ListItem> = options
        .iter()
        .map(|option| ListItem::new(format!(" {}", option)).style(Styles::unselected()))
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).border_style(Styles::border()))
        .highlight_style(Styles::selected())
        .highlight_symbol(">> ");

    let mut state = ListState::default();
    state.select(Some(selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn render_input(f: &mut Frame, area: Rect, text: &str) {
    let widget = Paragraph::new(Line::from(vec![
        Span::styled(text, Styles::text()),
        Span::styled("_", Styles::muted()),
    ]))
    .block(Block::default().borders(Borders::ALL).border_style(Styles::border()));
    f.render_widget(widget, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{Terminal, backend::TestBackend};

    fn rendered(screen: &Screen) -> String {
        rendered_at(screen, 60, 20)
    }

    /// One string per terminal row.
    fn rendered_rows(screen: &Screen, width: u16, height: u16) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(f, screen)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content
            .chunks(width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect())
            .collect()
    }

    fn rendered_at(screen: &Screen, width: u16, height: u16) -> String {
        rendered_rows(screen, width, height).concat()
    }

    #[test]
    fn test_choices_are_drawn() {
        let options = vec!["linux".to_string(), "linux-lts".to_string()];
        let out = rendered(&Screen {
            title: "Kernel",
            summary: None,
            notice: Some("pick one"),
            body: Body::Choices {
                options: &options,
                selected: 1,
            },
        });
        assert!(out.contains("Kernel"));
        assert!(out.contains(">> "));
        assert!(out.contains("linux-lts"));
        assert!(out.contains("pick one"));
    }

    #[test]
    fn test_summary_and_masked_input() {
        let summary = PendingSummary {
            title: "Summary".into(),
            rows: vec![("Root password".into(), "********".into())],
        };
        let out = rendered(&Screen {
            title: "Confirm",
            summary: Some(&summary),
            notice: None,
            body: Body::Input {
                text: "***".into(),
            },
        });
        assert!(out.contains("Root password"));
        assert!(out.contains("********"));
        assert!(out.contains("***_"));
    }

    fn gate_summary() -> PendingSummary {
        let rows = [
            ("Target device", "/dev/sdx"),
            ("Root password", "********"),
            ("Create user", "Yes"),
            ("Username", "alice"),
            ("User password", "********"),
            ("Kernel", "linux"),
            ("GPU driver", "amd"),
            ("Desktop", "bspwm"),
            ("Bootloader", "grub"),
            ("Swap file", "Yes"),
            ("Locale", "en_US.UTF-8"),
            ("LANG", "en_US.UTF-8"),
            ("LC_TIME", "en_US.UTF-8"),
            ("LC_NUMERIC", "en_US.UTF-8"),
            ("LC_MONETARY", "en_US.UTF-8"),
            ("Hostname", "archlinux"),
            ("Timezone", "Europe/Berlin"),
        ];
        PendingSummary {
            title: "Installation summary".into(),
            rows: rows
                .iter()
                .map(|(label, value)| (label.to_string(), value.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_full_gate_fits_standard_console() {
        let summary = gate_summary();
        let options = vec!["Install".to_string(), "Cancel".to_string()];
        let out = rendered_at(
            &Screen {
                title: "Start installation?",
                summary: Some(&summary),
                notice: Some("All data on /dev/sdx will be erased"),
                body: Body::Choices {
                    options: &options,
                    selected: 0,
                },
            },
            80,
            24,
        );

        for (label, value) in &summary.rows {
            assert!(out.contains(label.as_str()), "{} not visible", label);
            assert!(out.contains(value.as_str()), "{} not visible", value);
        }
        assert!(out.contains("All data on /dev/sdx will be erased"));
        assert!(out.contains(">>  Install"));
        assert!(out.contains("Cancel"));
    }

    #[test]
    fn test_short_summary_stays_in_one_column() {
        let summary = PendingSummary {
            title: "Summary".into(),
            rows: vec![
                ("Kernel".into(), "linux".into()),
                ("Desktop".into(), "gnome".into()),
            ],
        };
        let options = vec!["Install".to_string(), "Cancel".to_string()];
        let rows = rendered_rows(
            &Screen {
                title: "Confirm",
                summary: Some(&summary),
                notice: None,
                body: Body::Choices {
                    options: &options,
                    selected: 0,
                },
            },
            80,
            24,
        );
        let kernel = rows.iter().position(|r| r.contains("Kernel")).unwrap();
        let desktop = rows.iter().position(|r| r.contains("Desktop")).unwrap();
        assert_eq!(desktop, kernel + 1);
        assert_eq!(summary_columns(17, 6), 2);
        assert_eq!(summary_columns(2, 15), 1);
    }
}
