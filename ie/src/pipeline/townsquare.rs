//! Conversion of parsed seats into a Town Square game state.
//!
//! A token without a name label under it is a demon bluff shown to the
//! storyteller, not a player.

use data::townsquare::{GameState, Player};
use data::role_id;

use super::SeatRecord;

fn has_name(record: &SeatRecord) -> bool {
    record.player_name.as_deref().is_some_and(|n| !n.trim().is_empty())
}

/// Split records into players and bluffs.
///
/// Unnamed records without an identity carry no information and are dropped.
pub fn to_game_state(records: &[SeatRecord]) -> GameState {
    let mut state = GameState::default();

    for record in records {
        if has_name(record) {
            state.players.push(Player {
                name: record.player_name.as_deref().unwrap_or_default().trim().to_string(),
                role: record.identity.as_deref().map(role_id).unwrap_or_default(),
                is_dead: record.is_dead.unwrap_or(false),
                ..Default::default()
            });
        } else if let Some(identity) = &record.identity {
            state.bluffs.push(role_id(identity));
        } else {
            tracing::debug!(seat = record.seat, "dropping seat with neither name nor identity");
        }
    }

    state
}

#[cfg(test)]
mod tests {
    use data::Category;

    use super::*;

    fn record(seat: u32, name: Option<&str>, identity: Option<&str>, is_dead: Option<bool>) -> SeatRecord {
        SeatRecord {
            seat,
            player_name: name.map(str::to_string),
            identity: identity.map(str::to_string),
            category: identity.map(Category::of),
            confidence: if identity.is_some() { 0.9 } else { 0.0 },
            is_dead,
        }
    }

    #[test]
    fn unnamed_tokens_become_bluffs() {
        let records = [
            record(1, Some("Ann"), Some("Devil's Advocate"), Some(true)),
            record(2, Some("   "), Some("Tea Lady"), Some(false)),
            record(3, None, Some("goon"), Some(false)),
            record(4, Some(" Bob "), None, None),
            record(5, None, None, None),
        ];
        let state = to_game_state(&records);

        assert_eq!(state.bluffs, vec!["tealady", "goon"]);
        assert_eq!(state.edition.id, "bmr");
        assert_eq!(state.players.len(), 2);

        assert_eq!(state.players[0].name, "Ann");
        assert_eq!(state.players[0].role, "devilsadvocate");
        assert!(state.players[0].is_dead);

        assert_eq!(state.players[1].name, "Bob");
        assert_eq!(state.players[1].role, "");
        assert!(!state.players[1].is_dead);
    }
}
