//! CSV and JSON renderings of the board.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};
use tracing::info;

use super::{Board, BoardCard, Category};
use crate::errors::{AppError, AppResult};

const EMPTY_SENTENCE: &str = "(empty)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// `pecsbrada_YYYYMMDD.<ext>`
    #[must_use]
    pub fn default_file_name(self, date: NaiveDate) -> String {
        format!("pecsbrada_{}.{}", date.format("%Y%m%d"), self.extension())
    }
}

/// Render the sentence `state` and every card of `board` in `format`.
pub fn render(format: ExportFormat, state: &[BoardCard], board: &Board) -> AppResult<String> {
    render_at(format, state, board, Utc::now())
}

fn render_at(
    format: ExportFormat,
    state: &[BoardCard],
    board: &Board,
    exported: DateTime<Utc>,
) -> AppResult<String> {
    match format {
        ExportFormat::Csv => render_csv(state, board),
        ExportFormat::Json => render_json(state, board, exported),
    }
}

/// Write `content` to `directory` under the default file name for today.
pub async fn write_export(
    directory: &Path,
    format: ExportFormat,
    content: &str,
) -> AppResult<PathBuf> {
    let path = directory.join(format.default_file_name(Local::now().date_naive()));
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| AppError::export(format!("Failed to write {}: {}", path.display(), e)))?;
    info!("Exported {} to {}", format.extension().to_uppercase(), path.display());
    Ok(path)
}

fn footer(board: &Board) -> String {
    let mut footer = format!("{} v{}", board.title(), env!("CARGO_PKG_VERSION"));
    if let Some(author) = board.author() {
        footer.push_str(" - ");
        footer.push_str(author);
    }
    footer
}

fn render_csv(state: &[BoardCard], board: &Board) -> AppResult<String> {
    let sentence = if state.is_empty() {
        EMPTY_SENTENCE.to_string()
    } else {
        sentence_words(state).join(" ")
    };

    let mut writer = csv_writer();
    write_row(&mut writer, &["Current Sentence"])?;
    write_row(&mut writer, &[sentence.as_str()])?;
    write_row(&mut writer, &[])?;
    write_row(&mut writer, &["Category", "Card", "Emoji"])?;
    for category in board.categories() {
        for card in category.cards {
            write_row(&mut writer, &[category.name, card.label, card.emoji])?;
        }
    }
    write_row(&mut writer, &[])?;
    write_row(&mut writer, &[footer(board).as_str()])?;
    finish_csv(writer)
}

fn csv_writer() -> csv::Writer<Vec<u8>> {
    csv_writer_with(Vec::new())
}

fn csv_writer_with(buf: Vec<u8>) -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::CRLF)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(buf)
}

/// Write one record. An empty record is a bare line break.
fn write_row(writer: &mut csv::Writer<Vec<u8>>, fields: &[&str]) -> AppResult<()> {
    if fields.is_empty() {
        writer.flush().map_err(csv_error)?;
        let mut buf = std::mem::replace(writer, csv_writer())
            .into_inner()
            .map_err(|e| csv_error(e.error()))?;
        buf.extend_from_slice(b"\r\n");
        *writer = csv_writer_with(buf);
        return Ok(());
    }
    writer.write_record(fields).map_err(csv_error)
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> AppResult<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::export(format!("CSV flush failed: {}", e.error())))?;
    String::from_utf8(bytes).map_err(csv_error)
}

fn csv_error(e: impl std::fmt::Display) -> AppError {
    AppError::export(format!("CSV rendering failed: {e}"))
}

fn sentence_words(state: &[BoardCard]) -> Vec<&str> {
    state.iter().map(|card| card.label.as_str()).collect()
}

#[derive(Serialize)]
struct JsonExport<'a> {
    app: &'a str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<&'a str>,
    exported: String,
    current_sentence: Vec<&'a str>,
    sentence_cards: &'a [BoardCard],
    categories: CategoryMap,
}

/// Categories as a JSON object in board order.
struct CategoryMap(&'static [Category]);

impl Serialize for CategoryMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.0
                .iter()
                .map(|category| (category.name, category.cards)),
        )
    }
}

fn render_json(state: &[BoardCard], board: &Board, exported: DateTime<Utc>) -> AppResult<String> {
    let document = JsonExport {
        app: board.title(),
        version: env!("CARGO_PKG_VERSION"),
        author: board.author(),
        exported: exported.to_rfc3339(),
        current_sentence: sentence_words(state),
        sentence_cards: state,
        categories: CategoryMap(board.categories()),
    };
    serde_json::to_string_pretty(&document).map_err(|e| AppError::export(e.to_string()))
}
