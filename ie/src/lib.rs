//! Grimoire image extraction.
//!
//! Finds role tokens in photographs of a grimoire, numbers them in reading
//! order, reads the player name under each one and identifies the role by
//! comparing the token against a library of reference icons.

mod image;
pub use image::*;
mod config;
pub use config::*;
mod detect;
pub use detect::*;
mod order;
pub use order::*;
mod crop;
pub use crop::*;
mod overlay;
pub use overlay::*;

pub mod features;
pub mod matcher;
pub mod ocr;
pub mod store;
pub mod pipeline;

pub use matcher::{Candidate, ReferenceIndex, ReferenceMatcher, TokenMatch};
pub use ocr::{NameExtractor, NoOcr, TextRecognizer, TextSpan};
pub use pipeline::{
	Extraction, FileLoader, Ie, ImageLoader, MatchResult, ParseError, ParsedGrimoire, SeatRecord,
	extract_tokens, match_tokens, merge,
};
pub use store::{DirStore, MemoryStore, TokenStore};
