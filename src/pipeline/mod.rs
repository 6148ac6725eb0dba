//! Turn-taking core: utterance intake, reply units, playback and lifecycle.

pub mod ledger;
pub mod messages;
pub mod ordering;
pub mod playback;
pub mod reply;
pub mod session;
pub mod state;
pub mod utterance;
