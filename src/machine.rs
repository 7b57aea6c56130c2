//! Pure negotiation decision logic
//!
//! `decide` looks at the current record, the acting role and the requested
//! action and either produces the transition to commit or rejects the call.
//! It touches no storage and has no side effects, which is what makes the
//! dispatcher's reload-and-retry safe: re-deciding against fresher state is
//! just another function call.
use super::error::NegotiationError;
use super::history::ActionKind;
use super::request::{ActorRole, AdRequest, RequestStatus, Terms};

/// A role-facing action. `Negotiate` is the only carrier of terms, so the
/// other actions structurally cannot smuggle a payload in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Accept,
    Reject,
    Negotiate(Terms),
    Cancel,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Accept => ActionKind::Accept,
            Action::Reject => ActionKind::Reject,
            Action::Negotiate(_) => ActionKind::Negotiate,
            Action::Cancel => ActionKind::Cancel,
        }
    }
}

/// What the store should commit for one accepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub new_status: RequestStatus,
    pub new_terms: Terms,
    pub kind: ActionKind,
    pub note: &'static str,
}

/// Compute the transition for `action` by `actor` against `current`.
///
/// Legality table:
///
/// | status      | action    | actor                           | next        |
/// |-------------|-----------|---------------------------------|-------------|
/// | Pending     | Accept    | Influencer                      | Accepted    |
/// | Pending     | Reject    | Influencer                      | Rejected    |
/// | Pending     | Negotiate | Influencer                      | Negotiating |
/// | Pending     | Cancel    | Sponsor                         | Cancelled   |
/// | Negotiating | Accept    | whoever did not propose last    | Accepted    |
/// | Negotiating | Reject    | either party                    | Rejected    |
/// | Negotiating | Negotiate | whoever did not propose last    | Negotiating |
/// | Negotiating | Cancel    | Sponsor                         | Cancelled   |
///
/// Terminal states absorb everything. Accept/Reject/Cancel operate on the
/// terms already on record; Negotiate replaces them wholesale.
pub fn decide(
    current: &AdRequest,
    actor: ActorRole,
    action: &Action,
) -> Result<Decision, NegotiationError> {
    if current.status.is_terminal() {
        return Err(NegotiationError::TerminalState(current.status));
    }
    // Only the two parties drive negotiation.
    if actor == ActorRole::System {
        return Err(NegotiationError::IllegalAction {
            status: current.status,
            action: action.kind(),
        });
    }

    match (current.status, action) {
        (RequestStatus::Pending, Action::Accept) if actor == ActorRole::Influencer => {
            Ok(accept(current))
        }
        (RequestStatus::Pending, Action::Reject) if actor == ActorRole::Influencer => {
            Ok(reject(current))
        }
        (RequestStatus::Pending, Action::Negotiate(terms)) if actor == ActorRole::Influencer => {
            counter_offer(terms)
        }
        (RequestStatus::Pending, Action::Cancel) if actor == ActorRole::Sponsor => {
            Ok(cancel(current))
        }

        (RequestStatus::Negotiating, Action::Accept) => {
            if current.last_actor == actor {
                return Err(NegotiationError::NotYourTurn { actor });
            }
            Ok(accept(current))
        }
        (RequestStatus::Negotiating, Action::Reject) => Ok(reject(current)),
        (RequestStatus::Negotiating, Action::Negotiate(terms)) => {
            if current.last_actor == actor {
                return Err(NegotiationError::NotYourTurn { actor });
            }
            counter_offer(terms)
        }
        (RequestStatus::Negotiating, Action::Cancel) if actor == ActorRole::Sponsor => {
            Ok(cancel(current))
        }

        _ => Err(NegotiationError::IllegalAction {
            status: current.status,
            action: action.kind(),
        }),
    }
}

fn accept(current: &AdRequest) -> Decision {
    Decision {
        new_status: RequestStatus::Accepted,
        new_terms: current.terms.clone(),
        kind: ActionKind::Accept,
        note: "Offer accepted",
    }
}

fn reject(current: &AdRequest) -> Decision {
    Decision {
        new_status: RequestStatus::Rejected,
        new_terms: current.terms.clone(),
        kind: ActionKind::Reject,
        note: "Offer rejected",
    }
}

fn cancel(current: &AdRequest) -> Decision {
    Decision {
        new_status: RequestStatus::Cancelled,
        new_terms: current.terms.clone(),
        kind: ActionKind::Cancel,
        note: "Request cancelled",
    }
}

fn counter_offer(terms: &Terms) -> Result<Decision, NegotiationError> {
    if !terms.is_well_formed() {
        return Err(NegotiationError::Validation(
            "a counter-offer needs a non-zero payment amount and requirements".into(),
        ));
    }
    Ok(Decision {
        new_status: RequestStatus::Negotiating,
        new_terms: terms.clone(),
        kind: ActionKind::Negotiate,
        note: "Counter-offer sent",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::TimeStamp;

    fn pending() -> AdRequest {
        AdRequest::new_offer(
            "adreq1".into(),
            "camp1".into(),
            "user_sponsor".into(),
            "user_influencer".into(),
            Terms::new(100, "2 posts"),
        )
    }

    fn negotiating(last_actor: ActorRole) -> AdRequest {
        pending().transitioned(
            RequestStatus::Negotiating,
            Terms::new(150, "2 posts"),
            last_actor,
            TimeStamp::new(),
        )
    }

    #[test]
    fn influencer_accepts_pending_offer() {
        let d = decide(&pending(), ActorRole::Influencer, &Action::Accept).unwrap();
        assert_eq!(d.new_status, RequestStatus::Accepted);
        // accept keeps the terms on record
        assert_eq!(d.new_terms, Terms::new(100, "2 posts"));
    }

    #[test]
    fn sponsor_cannot_accept_own_pending_offer() {
        let err = decide(&pending(), ActorRole::Sponsor, &Action::Accept).unwrap_err();
        assert!(matches!(err, NegotiationError::IllegalAction { .. }));
    }

    #[test]
    fn cancel_is_sponsor_only() {
        assert!(decide(&pending(), ActorRole::Sponsor, &Action::Cancel).is_ok());

        let err = decide(&pending(), ActorRole::Influencer, &Action::Cancel).unwrap_err();
        assert!(matches!(err, NegotiationError::IllegalAction { .. }));

        let err = decide(
            &negotiating(ActorRole::Influencer),
            ActorRole::Influencer,
            &Action::Cancel,
        )
        .unwrap_err();
        assert!(matches!(err, NegotiationError::IllegalAction { .. }));
    }

    #[test]
    fn turn_taking_blocks_back_to_back_proposals() {
        let current = negotiating(ActorRole::Influencer);

        let err = decide(
            &current,
            ActorRole::Influencer,
            &Action::Negotiate(Terms::new(200, "2 posts")),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::NotYourTurn {
                actor: ActorRole::Influencer
            }
        ));

        // the counterparty is free to respond
        assert!(
            decide(
                &current,
                ActorRole::Sponsor,
                &Action::Negotiate(Terms::new(120, "2 posts")),
            )
            .is_ok()
        );
    }

    #[test]
    fn accept_follows_the_same_turn_rule() {
        let current = negotiating(ActorRole::Sponsor);

        assert!(decide(&current, ActorRole::Influencer, &Action::Accept).is_ok());
        let err = decide(&current, ActorRole::Sponsor, &Action::Accept).unwrap_err();
        assert!(matches!(err, NegotiationError::NotYourTurn { .. }));
    }

    #[test]
    fn either_party_may_reject_mid_negotiation() {
        let current = negotiating(ActorRole::Influencer);
        assert!(decide(&current, ActorRole::Influencer, &Action::Reject).is_ok());
        assert!(decide(&current, ActorRole::Sponsor, &Action::Reject).is_ok());
    }

    #[test]
    fn terminal_states_absorb_everything() {
        for status in [
            RequestStatus::Accepted,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
        ] {
            let current = pending().transitioned(
                status,
                Terms::new(100, "2 posts"),
                ActorRole::Influencer,
                TimeStamp::new(),
            );
            for action in [
                Action::Accept,
                Action::Reject,
                Action::Negotiate(Terms::new(1, "x")),
                Action::Cancel,
            ] {
                let err = decide(&current, ActorRole::Sponsor, &action).unwrap_err();
                assert!(matches!(err, NegotiationError::TerminalState(s) if s == status));
            }
        }
    }

    #[test]
    fn malformed_counter_offer_is_rejected() {
        let err = decide(
            &pending(),
            ActorRole::Influencer,
            &Action::Negotiate(Terms::new(0, "2 posts")),
        )
        .unwrap_err();
        assert!(matches!(err, NegotiationError::Validation(_)));
    }

    #[test]
    fn system_role_never_acts() {
        let err = decide(&pending(), ActorRole::System, &Action::Accept).unwrap_err();
        assert!(matches!(err, NegotiationError::IllegalAction { .. }));
    }
}
