//! Error taxonomy for the negotiation core
//!
//! Every user-visible failure maps onto exactly one variant; nothing is
//! folded into a catch-all. `VersionConflict` is the only variant handled
//! internally (single bounded retry in the dispatcher); everything else is
//! terminal for the call that raised it.
use super::history::ActionKind;
use super::request::{ActorRole, RequestStatus};

#[derive(thiserror::Error, Debug)]
pub enum NegotiationError {
    #[error("invalid proposal: {0}")]
    Validation(String),

    #[error("ad request '{0}' not found")]
    NotFound(String),

    #[error("caller '{caller_id}' is not a party to '{subject}'")]
    Forbidden { caller_id: String, subject: String },

    #[error("action {action:?} is not legal while the request is {status:?}")]
    IllegalAction {
        status: RequestStatus,
        action: ActionKind,
    },

    #[error("{actor:?} proposed last and must wait for the counterparty to respond")]
    NotYourTurn { actor: ActorRole },

    #[error("request already concluded as {0:?}")]
    TerminalState(RequestStatus),

    #[error("stale version: expected {expected}, store holds {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("ad request '{0}' was modified concurrently; reload before retrying")]
    ConcurrentModification(String),

    #[error("an active ad request already exists for campaign '{campaign_id}' and influencer '{influencer_id}'")]
    Conflict {
        campaign_id: String,
        influencer_id: String,
    },

    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),

    #[error("codec failure: {0}")]
    Codec(String),
}
