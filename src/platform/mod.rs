//! Platform abstraction layer
//!
//! Handles browser/native differences for:
//! - Monotonic time in milliseconds
//! - Driving a session's clock (tokio timer natively, frame loop on the web)

#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(target_arch = "wasm32")]
pub mod web;

use crate::session::{GameSession, SessionStatus};
use crate::sim::{Direction, GameState};

/// Handle everything a session needs besides ticking: the hard-mode prompt
/// is acknowledged and the gated resume gets a direction.
///
/// Used by unattended drivers; an interactive front end shows the prompt
/// and waits for the player instead.
pub fn auto_continue(
    session: &mut GameSession,
    now_ms: u64,
    steer: &mut impl FnMut(&GameState) -> Option<Direction>,
) {
    if session.status() == SessionStatus::PausedTransition {
        session.acknowledge_transition(now_ms);
    }
    if session.status() == SessionStatus::AwaitingInput {
        let heading = session.state().heading;
        let wanted = steer(session.state()).unwrap_or(heading);
        if !session.queue_direction(wanted, now_ms) {
            session.queue_direction(heading, now_ms);
        }
    }
}
