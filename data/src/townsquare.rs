//! Town Square "Load State" JSON schema.
//!
//! Field names follow the online grimoire's export format, which is camelCase.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edition {
	pub id: String,
}

impl Default for Edition {
	fn default() -> Self {
		Self { id: crate::EDITION_ID.to_string() }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
	pub name: String,
	pub id: String,
	/// Role id (see [`crate::role_id`]); empty when the token was not recognized.
	pub role: String,
	pub reminders: Vec<String>,
	pub is_voteless: bool,
	pub is_dead: bool,
	pub pronouns: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
	pub bluffs: Vec<String>,
	pub edition: Edition,
	pub roles: String,
	pub fabled: Vec<serde_json::Value>,
	pub players: Vec<Player>,
}

impl GameState {
	pub fn to_json_pretty(&self) -> serde_json::Result<String> {
		serde_json::to_string_pretty(self)
	}
}
