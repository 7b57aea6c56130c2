//! Durable ad request store over sled
//!
//! Two trees: `ad_requests` holds the records plus an active-pair index used
//! for the duplicate-offer check, `negotiation_history` holds the ledger.
//! Every mutation runs as a cross-tree sled transaction so a record update
//! and its ledger entry land atomically; the version check inside the
//! transaction gives compare-and-swap semantics at record granularity.
use super::error::NegotiationError;
use super::history::{ActionKind, HistoryEntry};
use super::machine::Decision;
use super::request::{ActorRole, AdRequest, RequestStatus, Terms, TimeStamp};
use super::utils;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::collections::HashMap;
use std::sync::Arc;

const REQUEST_HRP: &str = "adreq";
const RECORD_PREFIX: &[u8] = b"request/";
const ACTIVE_PREFIX: &[u8] = b"active/";

fn record_key(request_id: &str) -> Vec<u8> {
    [RECORD_PREFIX, request_id.as_bytes()].concat()
}

// present iff a non-terminal request exists for the (campaign, influencer) pair
fn active_pair_key(campaign_id: &str, influencer_id: &str) -> Vec<u8> {
    [
        ACTIVE_PREFIX,
        campaign_id.as_bytes(),
        b"/",
        influencer_id.as_bytes(),
    ]
    .concat()
}

// big-endian sequence suffix keeps scan_prefix in ledger order
fn history_key(request_id: &str, sequence: u64) -> Vec<u8> {
    [request_id.as_bytes(), b"/", &sequence.to_be_bytes()[..]].concat()
}

fn history_prefix(request_id: &str) -> Vec<u8> {
    [request_id.as_bytes(), b"/"].concat()
}

fn decode_request(bytes: &[u8]) -> Result<AdRequest, NegotiationError> {
    minicbor::decode(bytes).map_err(|e| NegotiationError::Codec(e.to_string()))
}

fn decode_entry(bytes: &[u8]) -> Result<HistoryEntry, NegotiationError> {
    minicbor::decode(bytes).map_err(|e| NegotiationError::Codec(e.to_string()))
}

fn unwrap_txn_error(err: TransactionError<NegotiationError>) -> NegotiationError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => NegotiationError::Storage(e),
    }
}

pub struct RequestStore {
    requests: sled::Tree,
    history: sled::Tree,
}

impl RequestStore {
    pub fn new(db: Arc<sled::Db>) -> Result<Self, NegotiationError> {
        let requests = db.open_tree("ad_requests")?;
        let history = db.open_tree("negotiation_history")?;
        Ok(Self { requests, history })
    }

    /// Persist a fresh Pending offer together with its Propose ledger entry.
    ///
    /// Fails with `Conflict` if a non-terminal request already exists for the
    /// same (campaign, influencer) pair.
    pub fn create(
        &self,
        campaign_id: &str,
        sponsor_id: &str,
        influencer_id: &str,
        terms: Terms,
    ) -> Result<(AdRequest, HistoryEntry), NegotiationError> {
        if !terms.is_well_formed() {
            return Err(NegotiationError::Validation(
                "an offer needs a non-zero payment amount and requirements".into(),
            ));
        }

        let id = utils::new_uuid_to_bech32(REQUEST_HRP)
            .map_err(|e| NegotiationError::Codec(e.to_string()))?;
        let request = AdRequest::new_offer(
            id,
            campaign_id.to_string(),
            sponsor_id.to_string(),
            influencer_id.to_string(),
            terms,
        );
        let entry = HistoryEntry {
            request_id: request.id.clone(),
            sequence: 1,
            actor_role: ActorRole::Sponsor,
            action: ActionKind::Propose,
            terms: request.terms.clone(),
            resulting_status: RequestStatus::Pending,
            recorded_at: request.created_at.clone(),
            prev_digest: None,
        };

        let request_cbor =
            minicbor::to_vec(&request).map_err(|e| NegotiationError::Codec(e.to_string()))?;
        let (_, entry_cbor) = entry
            .build()
            .map_err(|e| NegotiationError::Codec(e.to_string()))?;

        let pair_key = active_pair_key(campaign_id, influencer_id);

        (&self.requests, &self.history)
            .transaction(|(requests, history)| {
                if requests.get(pair_key.as_slice())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        NegotiationError::Conflict {
                            campaign_id: campaign_id.to_string(),
                            influencer_id: influencer_id.to_string(),
                        },
                    ));
                }

                requests.insert(record_key(&request.id).as_slice(), request_cbor.as_slice())?;
                requests.insert(pair_key.as_slice(), request.id.as_bytes())?;
                history.insert(
                    history_key(&request.id, 1).as_slice(),
                    entry_cbor.as_slice(),
                )?;
                Ok(())
            })
            .map_err(unwrap_txn_error)?;

        tracing::info!(
            request_id = %request.id,
            campaign_id,
            influencer_id,
            "ad request created"
        );

        Ok((request, entry))
    }

    pub fn get(&self, request_id: &str) -> Result<AdRequest, NegotiationError> {
        match self.requests.get(record_key(request_id))? {
            Some(bytes) => decode_request(bytes.as_ref()),
            None => Err(NegotiationError::NotFound(request_id.to_string())),
        }
    }

    /// Apply one decided transition, conditioned on `expected_version`.
    ///
    /// The version check, the record write, the ledger append and the
    /// active-pair index maintenance run as one transaction: a reader sees
    /// either none of it or all of it. A stale `expected_version` aborts with
    /// `VersionConflict` and leaves the record exactly as it was.
    pub fn commit(
        &self,
        request_id: &str,
        expected_version: u64,
        decision: &Decision,
        actor: ActorRole,
    ) -> Result<(AdRequest, HistoryEntry), NegotiationError> {
        let now = TimeStamp::new();

        let (updated, entry) = (&self.requests, &self.history)
            .transaction(|(requests, history)| {
                let key = record_key(request_id);
                let bytes = requests.get(key.as_slice())?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(NegotiationError::NotFound(
                        request_id.to_string(),
                    ))
                })?;
                let stored = decode_request(bytes.as_ref())
                    .map_err(ConflictableTransactionError::Abort)?;

                if stored.version != expected_version {
                    return Err(ConflictableTransactionError::Abort(
                        NegotiationError::VersionConflict {
                            expected: expected_version,
                            actual: stored.version,
                        },
                    ));
                }

                let updated = stored.transitioned(
                    decision.new_status,
                    decision.new_terms.clone(),
                    actor,
                    now.clone(),
                );
                let sequence = updated.version;

                // chain the new entry onto the digest of the previous one
                let prev = history
                    .get(history_key(request_id, sequence - 1).as_slice())?
                    .ok_or_else(|| {
                        ConflictableTransactionError::Abort(NegotiationError::Codec(format!(
                            "ledger entry {} missing for '{}'",
                            sequence - 1,
                            request_id
                        )))
                    })?;
                let entry = HistoryEntry {
                    request_id: request_id.to_string(),
                    sequence,
                    actor_role: actor,
                    action: decision.kind,
                    terms: decision.new_terms.clone(),
                    resulting_status: decision.new_status,
                    recorded_at: now.clone(),
                    prev_digest: Some(sha256::digest(&prev.to_vec())),
                };

                let updated_cbor = minicbor::to_vec(&updated).map_err(|e| {
                    ConflictableTransactionError::Abort(NegotiationError::Codec(e.to_string()))
                })?;
                let (_, entry_cbor) = entry.build().map_err(|e| {
                    ConflictableTransactionError::Abort(NegotiationError::Codec(e.to_string()))
                })?;

                requests.insert(key.as_slice(), updated_cbor.as_slice())?;
                history.insert(
                    history_key(request_id, sequence).as_slice(),
                    entry_cbor.as_slice(),
                )?;

                if updated.status.is_terminal() {
                    requests
                        .remove(active_pair_key(&updated.campaign_id, &updated.influencer_id))?;
                }

                Ok((updated, entry))
            })
            .map_err(unwrap_txn_error)?;

        tracing::debug!(
            request_id,
            version = updated.version,
            status = ?updated.status,
            action = ?entry.action,
            "transition committed"
        );

        Ok((updated, entry))
    }

    /// The ledger for one request, in commit order.
    pub fn list_history(&self, request_id: &str) -> Result<Vec<HistoryEntry>, NegotiationError> {
        let mut entries = Vec::new();
        for item in self.history.scan_prefix(history_prefix(request_id)) {
            let (_, bytes) = item?;
            entries.push(decode_entry(bytes.as_ref())?);
        }
        Ok(entries)
    }

    /// All requests where the given sponsor is a party, newest activity first.
    pub fn list_for_sponsor(
        &self,
        sponsor_id: &str,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AdRequest>, NegotiationError> {
        self.list_where(|r| {
            r.sponsor_id == sponsor_id && status.is_none_or(|s| r.status == s)
        })
    }

    /// All requests where the given influencer is a party, newest activity first.
    pub fn list_for_influencer(
        &self,
        influencer_id: &str,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AdRequest>, NegotiationError> {
        self.list_where(|r| {
            r.influencer_id == influencer_id && status.is_none_or(|s| r.status == s)
        })
    }

    /// Requests-by-status aggregate for dashboards.
    pub fn status_counts(&self) -> Result<HashMap<RequestStatus, u64>, NegotiationError> {
        let mut counts = HashMap::new();
        for item in self.requests.scan_prefix(RECORD_PREFIX) {
            let (_, bytes) = item?;
            let request = decode_request(bytes.as_ref())?;
            *counts.entry(request.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn list_where(
        &self,
        keep: impl Fn(&AdRequest) -> bool,
    ) -> Result<Vec<AdRequest>, NegotiationError> {
        let mut matches = Vec::new();
        for item in self.requests.scan_prefix(RECORD_PREFIX) {
            let (_, bytes) = item?;
            let request = decode_request(bytes.as_ref())?;
            if keep(&request) {
                matches.push(request);
            }
        }
        matches.sort_by(|a, b| {
            b.updated_at
                .to_datetime_utc()
                .cmp(&a.updated_at.to_datetime_utc())
        });
        Ok(matches)
    }
}
