use catchdex::{clock::Clock, ledger::capitalize, ledger::CapturedPokemon};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::App;

const ID_HEADER: &str = "No.";
const NAME_HEADER: &str = "Name";

fn pokedex_number(id: u32) -> String {
    format!("#{id:03}")
}

/// Pure presenter for a single captured pokemon
pub fn present_row(entry: &CapturedPokemon) -> Row<'static> {
    let (star, star_style) = if entry.perfect {
        ("★", Style::default().fg(Color::Yellow))
    } else {
        ("", Style::default())
    };

    Row::new(vec![
        Cell::from(pokedex_number(entry.pokemon_id)).style(Style::default().add_modifier(Modifier::DIM)),
        Cell::from(capitalize(&entry.pokemon_name)).style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(star).style(star_style),
        Cell::from(entry.caught_at.format("%Y-%m-%d %H:%M").to_string()),
    ])
}

fn id_column_width(entries: &[CapturedPokemon]) -> u16 {
    entries
        .iter()
        .map(|e| pokedex_number(e.pokemon_id).width())
        .max()
        .unwrap_or(0)
        .max(ID_HEADER.width()) as u16
}

fn name_column_width(entries: &[CapturedPokemon]) -> u16 {
    entries
        .iter()
        .map(|e| e.pokemon_name.width())
        .max()
        .unwrap_or(0)
        .max(NAME_HEADER.width()) as u16
}

pub fn render_pokedex<C: Clock + Clone>(app: &mut App<C>, f: &mut Frame) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(0),    // Table
            Constraint::Length(2), // Instructions
        ])
        .split(area);

    let summary = app.pokedex_state.summary;
    let title_text = format!(
        "{} caught · {} attempts · {:.0}% success · {} perfect",
        summary.captured,
        summary.attempts,
        summary.success_rate(),
        summary.perfects
    );
    let title = Paragraph::new(title_text)
        .block(Block::default().borders(Borders::ALL).title("Pokédex"))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    let entries = &app.pokedex_state.entries;
    if entries.is_empty() {
        let text = app
            .notice
            .clone()
            .unwrap_or_else(|| "Nothing caught yet. Go find some wild pokemon!".to_string());
        let no_data = Paragraph::new(text)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray));
        f.render_widget(no_data, chunks[1]);
    } else {
        let table_height = chunks[1].height.saturating_sub(3) as usize; // borders + header
        let max_scroll = entries.len().saturating_sub(table_height);
        if app.pokedex_state.scroll_offset > max_scroll {
            app.pokedex_state.scroll_offset = max_scroll;
        }

        let header = Row::new(vec![
            Cell::from(ID_HEADER),
            Cell::from(NAME_HEADER),
            Cell::from("Perfect"),
            Cell::from("Caught"),
        ])
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

        let entries = &app.pokedex_state.entries;
        let rows: Vec<Row> = entries
            .iter()
            .skip(app.pokedex_state.scroll_offset)
            .take(table_height)
            .map(present_row)
            .collect();

        let widths = [
            Constraint::Length(id_column_width(entries)),
            Constraint::Length(name_column_width(entries)),
            Constraint::Length(7),
            Constraint::Min(16),
        ];

        let table = Table::new(rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title("Captured"))
            .column_spacing(2);

        f.render_widget(table, chunks[1]);
    }

    let instructions =
        Paragraph::new("(↑/↓) scroll  (PgUp/PgDn) page  (Home) top  (b/backspace) back  (q) quit")
            .alignment(Alignment::Center)
            .wrap(ratatui::widgets::Wrap { trim: true });
    f.render_widget(instructions, chunks[2]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn entry(id: u32, name: &str) -> CapturedPokemon {
        CapturedPokemon {
            pokemon_id: id,
            pokemon_name: name.to_string(),
            perfect: false,
            caught_at: Local::now(),
        }
    }

    #[test]
    fn id_column_fits_form_ids() {
        assert_eq!(id_column_width(&[]), 3);
        assert_eq!(id_column_width(&[entry(25, "pikachu")]), 4);
        assert_eq!(
            id_column_width(&[entry(25, "pikachu"), entry(10043, "mewtwo-mega-x")]),
            6
        );
    }

    #[test]
    fn name_column_fits_longest_name() {
        assert_eq!(name_column_width(&[]), 4);
        assert_eq!(
            name_column_width(&[entry(1, "mew"), entry(150, "mewtwo")]),
            6
        );
    }
}
