//! Picks one side per match across a pool of matches, holding an exact
//! favorite/underdog split, never repeating a combination within a session
//! and never exceeding a payout cap.
//!
//! raw matches → [`grouper`] → [`engine`] → [`selector`] → caller.

pub mod config;
pub mod engine;
pub mod error;
pub mod grouper;
pub mod persist;
pub mod selector;
pub mod state;

pub use config::PickerConfig;
pub use engine::{CombinationEngine, EngineConfig, GenerateRequest, Generation, GenerationStatus};
pub use error::{ErrorKind, PickerError};
pub use grouper::{GroupedMatches, group_matches};
pub use selector::{Selection, SessionHandle, SessionSelector};
pub use state::{Combination, ExhaustedReason, MatchUnit, Pick, RawMatch, SessionState, Side};
