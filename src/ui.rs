pub mod pokedex;

use catchdex::{
    clock::Clock,
    engine::{Feedback, Phase, QteEngine},
    ledger::capitalize,
    util::reaction_stats,
};
use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Widget, Wrap},
    Frame,
};

use crate::{ui::pokedex::render_pokedex, App, AppState};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

pub fn draw<C: Clock + Clone>(app: &mut App<C>, f: &mut Frame) {
    match app.state {
        AppState::Encounter | AppState::Catching | AppState::Results => {
            f.render_widget(&*app, f.area());
        }
        AppState::Pokedex => render_pokedex(app, f),
    }
}

/// Gauge colour for the percentage of time left on the current arrow
pub fn gauge_color(remaining: f64) -> Color {
    if remaining > 60.0 {
        Color::Green
    } else if remaining > 30.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

impl<C: Clock + Clone> Widget for &App<C> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(6),
                Constraint::Length(2),
            ])
            .split(area);

        let name = capitalize(&self.challenge.pokemon_name);
        let title = match self.challenge.pokemon_id {
            0 => name,
            id => format!("#{id:03} {name}"),
        };
        Paragraph::new(title)
            .block(Block::default().borders(Borders::ALL).title("catchdex"))
            .style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .alignment(Alignment::Center)
            .render(chunks[0], buf);

        let instructions = match (self.state, &self.engine) {
            (AppState::Encounter, _) => "(enter) throw ball  (n) new encounter  (p) pokédex  (esc) quit",
            (AppState::Catching, Some(engine)) if !engine.can_close() => "(←↑↓→) hit the arrow",
            (AppState::Catching, _) => "(esc) run away",
            _ => "(r) retry  (n) new encounter  (p) pokédex  (esc) back  (q) quit",
        };
        Paragraph::new(instructions)
            .style(Style::default().add_modifier(Modifier::ITALIC))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[2], buf);

        match (self.state, &self.engine) {
            (AppState::Catching, Some(engine)) => render_catching(engine, chunks[1], buf),
            (AppState::Results, _) => self.render_results(chunks[1], buf),
            _ => self.render_encounter(chunks[1], buf),
        }
    }
}

impl<C: Clock + Clone> App<C> {
    fn render_encounter(&self, area: Rect, buf: &mut Buffer) {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let dim = Style::default().add_modifier(Modifier::DIM);
        let sequence = &self.challenge.sequence;

        let mut lines = vec![
            Line::from(Span::styled(
                format!(
                    "A wild {} appeared!",
                    capitalize(&self.challenge.pokemon_name)
                ),
                bold,
            )),
            Line::default(),
        ];
        if let Some(habitat) = &self.challenge.habitat {
            lines.push(Line::from(Span::styled(format!("habitat: {habitat}"), dim)));
        }
        lines.push(Line::from(Span::styled(
            format!(
                "{} arrows · {:.1}s each",
                sequence.len(),
                sequence.time_per_symbol_secs()
            ),
            dim,
        )));
        if self.already_captured() {
            lines.push(Line::from(Span::styled(
                "already in your pokédex",
                Style::default().fg(Color::Magenta),
            )));
        }
        if let Some(notice) = &self.notice {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                notice.as_str(),
                Style::default().fg(Color::Red),
            )));
        }

        centered(lines, area, buf);
    }

    fn render_results(&self, area: Rect, buf: &mut Buffer) {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let dim = Style::default().add_modifier(Modifier::DIM);
        let name = capitalize(&self.challenge.pokemon_name);

        let mut lines = Vec::new();
        match &self.outcome {
            Some(outcome) => {
                let (headline, color) = if outcome.success {
                    (format!("Gotcha! {name} was caught!"), Color::Green)
                } else {
                    (format!("Oh no! {name} broke free!"), Color::Red)
                };
                lines.push(Line::from(Span::styled(
                    headline,
                    bold.fg(color),
                )));
                if outcome.perfect {
                    lines.push(Line::from(Span::styled(
                        "★ PERFECT ★",
                        bold.fg(Color::Yellow),
                    )));
                }
                lines.push(Line::default());
                lines.push(Line::from(vec![
                    Span::styled("accuracy ", dim),
                    Span::styled(
                        format!(
                            "{}/{} ({:.0}%)",
                            outcome.buttons_correct,
                            outcome.total_buttons,
                            outcome.accuracy()
                        ),
                        bold,
                    ),
                    Span::styled("   time ", dim),
                    Span::styled(format!("{:.2}s", outcome.time_taken_seconds), bold),
                ]));
                if let Some((mean, sd)) = reaction_stats(&self.samples) {
                    lines.push(Line::from(vec![
                        Span::styled("reaction ", dim),
                        Span::styled(format!("{mean:.0}ms"), bold),
                        Span::styled(" ± ", dim),
                        Span::styled(format!("{sd:.0}ms"), bold),
                    ]));
                }
            }
            None => lines.push(Line::from(Span::styled("no result", dim))),
        }

        if let Some(result) = &self.catch_result {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                result.message.as_str(),
                Style::default().fg(Color::Magenta),
            )));
            if !result.reward_message.is_empty() {
                lines.push(Line::from(Span::styled(
                    result.reward_message.as_str(),
                    Style::default().fg(Color::Yellow),
                )));
            }
        }
        if let Some(notice) = &self.notice {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                notice.as_str(),
                Style::default().fg(Color::Red),
            )));
        }

        centered(lines, area, buf);
    }
}

fn render_catching<C: Clock>(engine: &QteEngine<C>, area: Rect, buf: &mut Buffer) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().add_modifier(Modifier::DIM);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(area);

    let session = engine.session();
    let total = engine.sequence().len();

    let lines = match session.phase {
        Phase::Countdown(n) => vec![
            Line::from(Span::styled(n.to_string(), bold.fg(Color::Cyan))),
            Line::from(Span::styled("get ready...", dim)),
        ],
        Phase::Playing => {
            let style = match engine.feedback() {
                Feedback::Correct => bold.fg(Color::Green),
                Feedback::Wrong => bold.fg(Color::Red),
                Feedback::None => bold,
            };
            let current = engine
                .current_symbol()
                .map(|d| format!("{}  {}", d.glyph(), d.label()))
                .unwrap_or_default();
            let upcoming = engine.upcoming(2).iter().map(|d| d.glyph()).join(" ");
            vec![
                Line::from(Span::styled(current, style)),
                Line::from(vec![
                    Span::styled("next ", dim),
                    Span::styled(upcoming, dim),
                ]),
            ]
        }
        Phase::Succeeded => vec![Line::from(Span::styled(
            "Gotcha!",
            bold.fg(Color::Green),
        ))],
        Phase::Failed => vec![Line::from(Span::styled(
            "It broke free...",
            bold.fg(Color::Red),
        ))],
    };
    centered(lines, chunks[0], buf);

    let remaining = session.remaining_fraction.clamp(0.0, 100.0);
    let secs_left = engine.sequence().time_per_symbol_secs() * remaining / 100.0;
    Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(gauge_color(remaining)))
        .ratio(remaining / 100.0)
        .label(format!("{secs_left:.2}s"))
        .render(chunks[1], buf);

    Paragraph::new(format!(
        "{}/{}",
        session.current_index.min(total),
        total
    ))
    .style(dim)
    .alignment(Alignment::Right)
    .render(chunks[2], buf);
}

fn centered(lines: Vec<Line>, area: Rect, buf: &mut Buffer) {
    let height = (lines.len() as u16).min(area.height);
    let top = area.y + (area.height - height) / 2;
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(
            Rect {
                y: top,
                height,
                ..area
            },
            buf,
        );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_colour_bands() {
        assert_eq!(gauge_color(100.0), Color::Green);
        assert_eq!(gauge_color(61.0), Color::Green);
        assert_eq!(gauge_color(60.0), Color::Yellow);
        assert_eq!(gauge_color(31.0), Color::Yellow);
        assert_eq!(gauge_color(30.0), Color::Red);
        assert_eq!(gauge_color(0.0), Color::Red);
    }
}
