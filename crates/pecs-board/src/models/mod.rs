pub mod pictogram;

pub use pictogram::*;
