//! Append-only negotiation ledger entries
//!
//! Every committed transition appends exactly one entry. Entries are
//! immutable once written and chained by the sha256 of the previous entry's
//! CBOR encoding, so a rewritten or dropped entry breaks the chain.
use super::request::{ActorRole, RequestStatus, Terms, TimeStamp};
use chrono::Utc;

/// What was done, as recorded in the ledger. `Propose` is the create-time
/// entry; the rest mirror the respond actions.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    #[n(0)]
    Propose,
    #[n(1)]
    Accept,
    #[n(2)]
    Reject,
    #[n(3)]
    Negotiate,
    #[n(4)]
    Cancel,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    #[n(0)]
    pub request_id: String,
    #[n(1)]
    pub sequence: u64, // strictly 1..N per request, no gaps
    #[n(2)]
    pub actor_role: ActorRole,
    #[n(3)]
    pub action: ActionKind,
    #[n(4)]
    pub terms: Terms, // the snapshot that became authoritative
    #[n(5)]
    pub resulting_status: RequestStatus,
    #[n(6)]
    pub recorded_at: TimeStamp<Utc>,
    #[n(7)]
    pub prev_digest: Option<String>, // sha256 of the previous entry's CBOR; None for sequence 1
}

impl HistoryEntry {
    /// Serialise to CBOR and return `(digest, bytes)`. The digest is what the
    /// next entry in the chain records as `prev_digest`.
    pub fn build(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

/// Check a ledger read back from the store: sequences must run 1..N with no
/// gaps and every `prev_digest` must match the digest of the entry before it.
pub fn verify_chain(entries: &[HistoryEntry]) -> bool {
    let mut prev: Option<&HistoryEntry> = None;

    for (i, entry) in entries.iter().enumerate() {
        if entry.sequence != (i as u64) + 1 {
            return false;
        }
        let expected = match prev {
            None => None,
            Some(p) => match p.build() {
                Ok((digest, _)) => Some(digest),
                Err(_) => return false,
            },
        };
        if entry.prev_digest != expected {
            return false;
        }
        prev = Some(entry);
    }

    true
}
