//! Game data for the grimoire parser: the role roster, the dead-token naming
//! convention used by the reference library, and the Town Square export schema.

mod roles;
pub use roles::*;

pub mod townsquare;

/// Filename suffix marking the "dead" (shrouded) variant of a reference icon.
pub const DEAD_SUFFIX: &str = "-dead";

/// Splits a reference name into its display identity and whether it is the
/// dead variant, e.g. `"pukka-dead"` -> `("pukka", true)`.
pub fn split_dead_variant(name: &str) -> (&str, bool) {
	match name.strip_suffix(DEAD_SUFFIX) {
		Some(identity) => (identity, true),
		None => (name, false),
	}
}
