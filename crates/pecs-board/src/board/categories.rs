use serde::Serialize;

/// A picture card: fallback emoji, label shown and spoken, and the English term used to find
/// its pictogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Card {
    pub emoji: &'static str,
    pub label: &'static str,
    pub term: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub name: &'static str,
    pub cards: &'static [Card],
}

/// Locale of the card terms.
pub const CARD_LOCALE: &str = "en";

const fn card(emoji: &'static str, label: &'static str, term: &'static str) -> Card {
    Card { emoji, label, term }
}

pub const CATEGORIES: &[Category] = &[
    Category {
        name: "Food",
        cards: &[
            card("🍎", "Apple", "apple"),
            card("🍌", "Banana", "banana"),
            card("🥛", "Milk", "milk"),
            card("🍞", "Bread", "bread"),
            card("💧", "Water", "water"),
            card("🧃", "Juice", "juice"),
            card("🍪", "Cookie", "cookie"),
            card("🧀", "Cheese", "cheese"),
            card("🍕", "Pizza", "pizza"),
        ],
    },
    Category {
        name: "Activities",
        cards: &[
            card("🎮", "Play", "play"),
            card("📖", "Read", "read"),
            card("🎨", "Draw", "draw"),
            card("🎵", "Music", "music"),
            card("🏃", "Run", "run"),
            card("🧩", "Puzzle", "puzzle"),
            card("📺", "TV", "television"),
            card("🛝", "Playground", "playground"),
            card("🚗", "Car ride", "car"),
        ],
    },
    Category {
        name: "Feelings",
        cards: &[
            card("😊", "Happy", "happy"),
            card("😢", "Sad", "sad"),
            card("😠", "Angry", "angry"),
            card("😰", "Worried", "worried"),
            card("😴", "Tired", "tired"),
            card("🤗", "Hug", "hug"),
            card("😋", "Hungry", "hungry"),
            card("🥵", "Hot", "hot"),
            card("🥶", "Cold", "cold"),
        ],
    },
    Category {
        name: "Actions",
        cards: &[
            card("🚽", "Toilet", "toilet"),
            card("🖐️", "Help", "help"),
            card("✋", "Stop", "stop"),
            card("👋", "Hello", "hello"),
            card("🙏", "Please", "please"),
            card("❤️", "Thank you", "thank you"),
            card("➡️", "More", "more"),
            card("🚫", "No", "no"),
            card("✅", "Yes", "yes"),
        ],
    },
];

/// Every card with its category, in board order.
pub fn all_cards() -> impl Iterator<Item = (&'static Category, &'static Card)> {
    CATEGORIES
        .iter()
        .flat_map(|category| category.cards.iter().map(move |card| (category, card)))
}

/// Find a card by label or term, ignoring case.
#[must_use]
pub fn find_card(name: &str) -> Option<&'static Card> {
    let name = name.trim();
    all_cards()
        .map(|(_, card)| card)
        .find(|card| card.label.eq_ignore_ascii_case(name) || card.term.eq_ignore_ascii_case(name))
}

#[must_use]
pub fn find_category(name: &str) -> Option<&'static Category> {
    CATEGORIES
        .iter()
        .find(|category| category.name.eq_ignore_ascii_case(name.trim()))
}
