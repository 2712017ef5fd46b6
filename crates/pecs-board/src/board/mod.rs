//! The picture board: categories of cards and the sentence strip built by tapping them.

pub mod categories;
pub mod export;

pub use categories::{CARD_LOCALE, CATEGORIES, Card, Category, all_cards, find_card, find_category};
pub use export::{ExportFormat, render};

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::config::BoardConfig;
use crate::errors::{AppError, AppResult};
use crate::fetch::PlaceholderCatalog;
use crate::keyword_index::KeywordIndex;
use crate::models::{PictogramId, Placeholder};

/// A card on the sentence strip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardCard {
    /// `None` when the keyword index has no pictogram for the card's term
    pub pictogram_id: Option<PictogramId>,
    pub label: String,
}

pub struct Board {
    title: String,
    author: Option<String>,
    pictograms: HashMap<&'static str, PictogramId>,
    sentence: Vec<BoardCard>,
}

impl Board {
    /// Resolve every card's term against `index`.
    pub fn new(index: &KeywordIndex, config: &BoardConfig) -> Self {
        let pictograms: HashMap<&'static str, PictogramId> = all_cards()
            .filter_map(|(_, card)| {
                index
                    .exact(card.term, CARD_LOCALE)
                    .map(|id| (card.term, id.clone()))
            })
            .collect();
        debug!(
            "Resolved {} of {} board cards to pictograms",
            pictograms.len(),
            all_cards().count()
        );

        Self {
            title: config.title.clone(),
            author: config.author.clone(),
            pictograms,
            sentence: Vec::new(),
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    #[must_use]
    pub fn categories(&self) -> &'static [Category] {
        CATEGORIES
    }

    #[must_use]
    pub fn pictogram_for(&self, card: &Card) -> Option<&PictogramId> {
        self.pictograms.get(card.term)
    }

    /// Append `card` to the sentence strip.
    pub fn tap(&mut self, card: &Card) -> &BoardCard {
        let entry = BoardCard {
            pictogram_id: self.pictogram_for(card).cloned(),
            label: card.label.to_string(),
        };
        let index = self.sentence.len();
        self.sentence.push(entry);
        &self.sentence[index]
    }

    /// Append the card with this label or term.
    pub fn tap_named(&mut self, name: &str) -> AppResult<&BoardCard> {
        let card = find_card(name)
            .ok_or_else(|| AppError::validation(format!("No card named '{name}'")))?;
        Ok(self.tap(card))
    }

    pub fn clear(&mut self) {
        self.sentence.clear();
    }

    /// The sentence as one line of text, as spoken.
    #[must_use]
    pub fn sentence_text(&self) -> String {
        self.sentence
            .iter()
            .map(|card| card.label.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[must_use]
    pub fn current_board_state(&self) -> Vec<BoardCard> {
        self.sentence.clone()
    }

    /// Pictograms of every resolved card.
    #[must_use]
    pub fn card_pictograms(&self) -> Vec<PictogramId> {
        all_cards()
            .filter_map(|(_, card)| self.pictogram_for(card).cloned())
            .collect()
    }

    /// Card emoji as offline stand-ins for their pictograms.
    #[must_use]
    pub fn placeholder_catalog(&self) -> PlaceholderCatalog {
        all_cards()
            .filter_map(|(_, card)| {
                self.pictogram_for(card).map(|id| {
                    (
                        id.clone(),
                        Placeholder::new(card.emoji, Some(card.label.to_string())),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = r#"{
        "version": 1,
        "entry_count": 3,
        "entries": [
            {"term": "milk", "pictogram_id": "2445", "locale": "en"},
            {"term": "more", "pictogram_id": "5508", "locale": "en"},
            {"term": "mjölk", "pictogram_id": "2445", "locale": "sv"}
        ]
    }"#;

    fn board() -> Board {
        let index = KeywordIndex::build(DATASET.as_bytes()).unwrap();
        Board::new(&index, &BoardConfig::default())
    }

    #[test]
    fn test_tap_builds_sentence() {
        let mut board = board();
        assert_eq!(board.sentence_text(), "");

        board.tap_named("Milk").unwrap();
        board.tap_named("more").unwrap();
        board.tap_named("Hug").unwrap();

        assert_eq!(board.sentence_text(), "Milk More Hug");
        let state = board.current_board_state();
        assert_eq!(state.len(), 3);
        assert_eq!(state[0].pictogram_id.as_ref().map(|id| id.as_str()), Some("2445"));
        assert_eq!(state[2].pictogram_id, None);

        board.clear();
        assert!(board.current_board_state().is_empty());
    }

    #[test]
    fn test_unknown_card_is_rejected() {
        let mut board = board();
        assert!(matches!(
            board.tap_named("giraffe"),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn test_placeholder_catalog_uses_card_emoji() {
        let board = board();
        let catalog = board.placeholder_catalog();
        assert_eq!(catalog.len(), 2);

        let milk = PictogramId::new("2445").unwrap();
        assert_eq!(catalog.for_id(&milk).glyph, "🥛");
        assert_eq!(catalog.for_id(&milk).label.as_deref(), Some("Milk"));
        assert_eq!(board.card_pictograms().len(), 2);
    }

    #[test]
    fn test_bundled_dataset_covers_every_card() {
        let index = crate::keyword_index::load_or_empty(&crate::dataset::DatasetSource::Bundled);
        let board = Board::new(&index, &BoardConfig::default());
        for (_, card) in all_cards() {
            assert!(board.pictogram_for(card).is_some(), "no pictogram for '{}'", card.term);
        }
    }
}
