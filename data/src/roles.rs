use std::collections::HashMap;
use std::sync::LazyLock;

/// Team a role belongs to.
///
/// Anything not on the roster maps to [`Category::Unknown`] instead of failing,
/// so a reference library can carry icons from other editions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Category {
	Townsfolk,
	Outsider,
	Minion,
	Demon,
	Unknown,
}

impl Category {
	/// Category of a role identity (case and punctuation insensitive).
	pub fn of(identity: &str) -> Self {
		ROLE_MAP
			.get(&role_id(identity))
			.copied()
			.unwrap_or(Category::Unknown)
	}
}

impl std::fmt::Display for Category {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Category::Townsfolk => write!(f, "Townsfolk"),
			Category::Outsider => write!(f, "Outsider"),
			Category::Minion => write!(f, "Minion"),
			Category::Demon => write!(f, "Demon"),
			Category::Unknown => write!(f, "Unknown"),
		}
	}
}

/// Id of the edition the roster describes, as Town Square spells it.
pub const EDITION_ID: &str = "bmr";

// Bad Moon Rising.
const ROSTER: &[(Category, &[&str])] = &[
	(
		Category::Townsfolk,
		&[
			"Grandmother", "Sailor", "Chambermaid", "Exorcist", "Innkeeper",
			"Gambler", "Gossip", "Courtier", "Professor", "Minstrel",
			"Tea Lady", "Pacifist", "Fool",
		],
	),
	(Category::Outsider, &["Tinker", "Moonchild", "Goon", "Lunatic"]),
	(Category::Minion, &["Godfather", "Devil's Advocate", "Assassin", "Mastermind"]),
	(Category::Demon, &["Zombuul", "Pukka", "Shabaloth", "Po"]),
];

static ROLE_MAP: LazyLock<HashMap<String, Category>> = LazyLock::new(|| {
	ROSTER
		.iter()
		.flat_map(|(category, names)| names.iter().map(move |name| (role_id(name), *category)))
		.collect()
});

/// Normalizes a role name into the id form used for lookups and by Town Square.
///
/// `"Devil's Advocate"`, `"devils_advocate"` and `"DevilsAdvocate"` all become
/// `"devilsadvocate"`.
pub fn role_id(name: &str) -> String {
	name.chars()
		.filter(|c| c.is_ascii_alphanumeric())
		.map(|c| c.to_ascii_lowercase())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn categories_follow_the_roster() {
		assert_eq!(Category::of("Pukka"), Category::Demon);
		assert_eq!(Category::of("pukka"), Category::Demon);
		assert_eq!(Category::of("Tea Lady"), Category::Townsfolk);
		assert_eq!(Category::of("tea_lady"), Category::Townsfolk);
		assert_eq!(Category::of("devils-advocate"), Category::Minion);
		assert_eq!(Category::of("Moonchild"), Category::Outsider);
	}

	#[test]
	fn unknown_identity_is_not_an_error() {
		assert_eq!(Category::of("Imp"), Category::Unknown);
		assert_eq!(Category::of(""), Category::Unknown);
	}

	#[test]
	fn role_ids_drop_punctuation_and_case() {
		assert_eq!(role_id("Devil's Advocate"), "devilsadvocate");
		assert_eq!(role_id("Tea Lady"), "tealady");
		assert_eq!(role_id("po"), "po");
	}

	#[test]
	fn roster_has_every_role_once() {
		let listed = ROSTER.iter().map(|(_, names)| names.len()).sum::<usize>();
		assert_eq!(listed, 25);
		assert_eq!(ROLE_MAP.len(), 25);
		assert_eq!(ROLE_MAP.values().filter(|c| matches!(c, Category::Minion | Category::Demon)).count(), 8);
		assert_eq!(Category::of("shabaloth"), Category::Demon);
	}
}
