//! Ad request negotiation core for a sponsorship marketplace
//!
//! A Sponsor opens an offer toward an Influencer on one of their campaigns;
//! the two sides then accept, reject, counter-offer or cancel under strict
//! turn-taking until the request reaches a terminal status. Every committed
//! transition is appended to a digest-chained ledger.

pub mod error;
pub mod history;
pub mod machine;
pub mod request;
pub mod service;
pub mod store;
pub mod utils;

pub use error::NegotiationError;
pub use machine::Action;
pub use request::{ActorRole, AdRequest, RequestStatus, Terms};
pub use service::{Caller, NegotiationService, Outcome};
