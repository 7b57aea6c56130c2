//! Role-facing dispatcher for the negotiation workflow
//!
//! Callers arrive with an explicit identity context, never ambient session
//! state. The dispatcher authorizes the caller against the record's parties,
//! asks the state machine for a decision and commits it at the version it
//! loaded. A lost race shows up as a version conflict and is retried exactly
//! once against the fresh state; a second conflict is surfaced as
//! `ConcurrentModification` so failure behaviour stays deterministic.
use super::error::NegotiationError;
use super::history::HistoryEntry;
use super::machine::{self, Action};
use super::request::{ActorRole, AdRequest, RequestStatus, Terms};
use super::store::RequestStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Campaign collaborator contract: who owns a campaign. The core validates
/// offer submission against it and nothing more; campaign lifecycle lives
/// elsewhere.
pub trait CampaignDirectory: Send + Sync {
    fn sponsor_of(&self, campaign_id: &str) -> Option<String>;
}

/// Plain keyed map of campaign to owning sponsor, for tests and embedders
/// that resolve ownership up front.
#[derive(Debug, Default)]
pub struct InMemoryCampaigns {
    owners: HashMap<String, String>,
}

impl InMemoryCampaigns {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, campaign_id: impl Into<String>, sponsor_id: impl Into<String>) {
        self.owners.insert(campaign_id.into(), sponsor_id.into());
    }
}

impl CampaignDirectory for InMemoryCampaigns {
    fn sponsor_of(&self, campaign_id: &str) -> Option<String> {
        self.owners.get(campaign_id).cloned()
    }
}

/// The identity context supplied by the session collaborator, passed in per
/// call. The core trusts it; credential verification happened upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: ActorRole,
}

impl Caller {
    pub fn sponsor(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Sponsor,
        }
    }
    pub fn influencer(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Influencer,
        }
    }
}

/// What a successful mutation hands to the notification collaborator:
/// the fresh record, its ledger entry, and the outcome line to show the user.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub request: AdRequest,
    pub entry: HistoryEntry,
    pub note: &'static str,
}

pub struct NegotiationService {
    store: RequestStore,
    campaigns: Arc<dyn CampaignDirectory>,
}

impl NegotiationService {
    pub fn new(
        db: Arc<sled::Db>,
        campaigns: Arc<dyn CampaignDirectory>,
    ) -> Result<Self, NegotiationError> {
        Ok(Self {
            store: RequestStore::new(db)?,
            campaigns,
        })
    }

    /// Sponsor opens a negotiation: creates the Pending request with its
    /// Propose ledger entry.
    pub fn submit_offer(
        &self,
        caller: &Caller,
        campaign_id: &str,
        influencer_id: &str,
        terms: Terms,
    ) -> Result<Outcome, NegotiationError> {
        if caller.role != ActorRole::Sponsor {
            return Err(NegotiationError::Forbidden {
                caller_id: caller.id.clone(),
                subject: campaign_id.to_string(),
            });
        }
        let owner = self
            .campaigns
            .sponsor_of(campaign_id)
            .ok_or_else(|| NegotiationError::NotFound(campaign_id.to_string()))?;
        if owner != caller.id {
            return Err(NegotiationError::Forbidden {
                caller_id: caller.id.clone(),
                subject: campaign_id.to_string(),
            });
        }

        let (request, entry) = self
            .store
            .create(campaign_id, &caller.id, influencer_id, terms)?;
        Ok(Outcome {
            request,
            entry,
            note: "Ad request created",
        })
    }

    /// Single entry point for both roles: Accept, Reject, Negotiate or
    /// Cancel the given request.
    pub fn respond(
        &self,
        caller: &Caller,
        request_id: &str,
        action: Action,
    ) -> Result<Outcome, NegotiationError> {
        let current = self.store.get(request_id)?;
        let role = authorize(caller, &current)?;

        match self.decide_and_commit(&current, role, &action) {
            Err(NegotiationError::VersionConflict { expected, actual }) => {
                tracing::warn!(
                    request_id,
                    expected,
                    actual,
                    "lost a commit race, retrying once against fresh state"
                );
                let current = self.store.get(request_id)?;
                self.decide_and_commit(&current, role, &action)
                    .map_err(|e| match e {
                        // bounded retry: a second lost race goes back to the caller
                        NegotiationError::VersionConflict { .. } => {
                            NegotiationError::ConcurrentModification(request_id.to_string())
                        }
                        other => other,
                    })
            }
            other => other,
        }
    }

    pub fn get_request(&self, request_id: &str) -> Result<AdRequest, NegotiationError> {
        self.store.get(request_id)
    }

    pub fn get_history(&self, request_id: &str) -> Result<Vec<HistoryEntry>, NegotiationError> {
        self.store.get(request_id)?;
        self.store.list_history(request_id)
    }

    pub fn list_for_sponsor(
        &self,
        sponsor_id: &str,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AdRequest>, NegotiationError> {
        self.store.list_for_sponsor(sponsor_id, status)
    }

    pub fn list_for_influencer(
        &self,
        influencer_id: &str,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AdRequest>, NegotiationError> {
        self.store.list_for_influencer(influencer_id, status)
    }

    pub fn status_counts(&self) -> Result<HashMap<RequestStatus, u64>, NegotiationError> {
        self.store.status_counts()
    }

    fn decide_and_commit(
        &self,
        current: &AdRequest,
        role: ActorRole,
        action: &Action,
    ) -> Result<Outcome, NegotiationError> {
        let decision = machine::decide(current, role, action)?;
        let (request, entry) = self
            .store
            .commit(&current.id, current.version, &decision, role)?;
        Ok(Outcome {
            request,
            entry,
            note: decision.note,
        })
    }
}

/// The caller must match one of the record's parties in both id and claimed
/// role.
fn authorize(caller: &Caller, request: &AdRequest) -> Result<ActorRole, NegotiationError> {
    match request.role_of(&caller.id) {
        Some(role) if role == caller.role => Ok(role),
        _ => Err(NegotiationError::Forbidden {
            caller_id: caller.id.clone(),
            subject: request.id.clone(),
        }),
    }
}
