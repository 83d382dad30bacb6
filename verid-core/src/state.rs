//! Session state machine.
//!
//! The only component allowed to mutate session status. Transitions are a
//! pure table; [`transition`] applies one atomically to a session, updating
//! progress alongside. Terminal states admit nothing, including themselves,
//! which is what lets an expiry sweep race a completion safely: whichever
//! transition lands first wins and the loser gets an error.

use crate::error::{Result, VeridError};
use crate::model::{Session, SessionStatus};

/// Whether a transition between two states is legal.
pub fn allowed(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    if from.is_terminal() || from == to {
        return false;
    }
    match to {
        // First progress update only.
        InProgress => from == Initiated,
        // Document fusion passing mid-workflow.
        DocumentVerified => from == InProgress,
        // Review, verdicts and abort paths reach from any live state.
        PendingReview | Completed | Approved | Rejected | Failed | Expired | Cancelled => true,
        Initiated => false,
    }
}

/// Workflow progress reported for a state.
pub fn progress_for(status: SessionStatus) -> u8 {
    use SessionStatus::*;
    match status {
        Initiated => 10,
        InProgress => 50,
        DocumentVerified => 60,
        PendingReview => 75,
        Completed | Approved => 100,
        Rejected | Failed | Expired | Cancelled => 0,
    }
}

/// Apply a transition, or fail without touching the session.
pub fn transition(session: &mut Session, to: SessionStatus) -> Result<()> {
    if !allowed(session.status, to) {
        return Err(VeridError::InvalidTransition {
            from: session.status,
            to,
        });
    }
    session.status = to;
    session.set_progress(progress_for(to));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VerificationType;
    use chrono::{Duration, Utc};

    fn session() -> Session {
        Session::new(
            "hash".into(),
            VerificationType::Full,
            Utc::now() + Duration::hours(24),
        )
    }

    #[test]
    fn test_happy_path() {
        let mut s = session();
        transition(&mut s, SessionStatus::InProgress).unwrap();
        assert_eq!(s.progress, 50);
        transition(&mut s, SessionStatus::DocumentVerified).unwrap();
        assert_eq!(s.progress, 60);
        transition(&mut s, SessionStatus::Approved).unwrap();
        assert_eq!(s.progress, 100);
    }

    #[test]
    fn test_illegal_transition_leaves_session_untouched() {
        let mut s = session();
        let err = transition(&mut s, SessionStatus::DocumentVerified).unwrap_err();
        assert!(matches!(
            err,
            VeridError::InvalidTransition {
                from: SessionStatus::Initiated,
                to: SessionStatus::DocumentVerified,
            }
        ));
        assert_eq!(s.status, SessionStatus::Initiated);
        assert_eq!(s.progress, 10);
    }

    #[test]
    fn test_new_sessions_start_at_initiated_progress() {
        assert_eq!(session().progress, progress_for(SessionStatus::Initiated));
    }

    #[test]
    fn test_terminal_states_admit_nothing() {
        for terminal in [
            SessionStatus::Completed,
            SessionStatus::Approved,
            SessionStatus::Rejected,
            SessionStatus::Failed,
            SessionStatus::Expired,
            SessionStatus::Cancelled,
        ] {
            let mut s = session();
            s.status = terminal;
            assert!(transition(&mut s, SessionStatus::Expired).is_err());
            assert!(transition(&mut s, SessionStatus::InProgress).is_err());
        }
    }

    #[test]
    fn test_expiry_races_lose_to_completion() {
        let mut s = session();
        transition(&mut s, SessionStatus::InProgress).unwrap();
        transition(&mut s, SessionStatus::Approved).unwrap();
        // The sweep arriving second must not overwrite the verdict.
        assert!(transition(&mut s, SessionStatus::Expired).is_err());
        assert_eq!(s.status, SessionStatus::Approved);
    }

    #[test]
    fn test_any_live_state_can_reach_review_and_cancel() {
        for live in [
            SessionStatus::Initiated,
            SessionStatus::InProgress,
            SessionStatus::DocumentVerified,
        ] {
            assert!(allowed(live, SessionStatus::PendingReview));
            assert!(allowed(live, SessionStatus::Cancelled));
        }
        assert!(allowed(SessionStatus::PendingReview, SessionStatus::Approved));
        assert!(allowed(SessionStatus::PendingReview, SessionStatus::Rejected));
    }
}
