//! Core ad request record and terms types
use chrono::{DateTime, TimeZone, Utc};

/// The two negotiating parties, plus `System` for transitions not driven by
/// either side (reserved; the state machine never accepts it as an actor).
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActorRole {
    #[n(0)]
    Sponsor,
    #[n(1)]
    Influencer,
    #[n(2)]
    System,
}

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum RequestStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Negotiating,
    #[n(2)]
    Accepted,
    #[n(3)]
    Rejected,
    #[n(4)]
    Cancelled,
}

impl RequestStatus {
    /// Terminal statuses are a strict sink: no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Accepted | RequestStatus::Rejected | RequestStatus::Cancelled
        )
    }
}

/// The negotiable payload. Replaced wholesale on every accepted step, never
/// merged field-by-field.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Terms {
    #[n(0)]
    pub payment_amount: u64, // minor currency units, integers for currency
    #[n(1)]
    pub requirements: String,
    #[n(2)]
    pub message: Option<String>,
}

impl Terms {
    pub fn new(payment_amount: u64, requirements: impl Into<String>) -> Self {
        Self {
            payment_amount,
            requirements: requirements.into(),
            message: None,
        }
    }
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
    /// A proposal must carry a non-zero payment and concrete requirements.
    pub fn is_well_formed(&self) -> bool {
        self.payment_amount > 0 && !self.requirements.trim().is_empty()
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

/// The negotiable unit between one Sponsor and one Influencer, tied to a
/// campaign. Mutated only through the state machine via the store's commit.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct AdRequest {
    #[n(0)]
    pub id: String, // bech32-encoded uuid7, "adreq..."
    #[n(1)]
    pub campaign_id: String,
    #[n(2)]
    pub sponsor_id: String,
    #[n(3)]
    pub influencer_id: String,
    #[n(4)]
    pub status: RequestStatus,
    #[n(5)]
    pub terms: Terms,
    #[n(6)]
    pub last_actor: ActorRole,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
    #[n(8)]
    pub updated_at: TimeStamp<Utc>,
    #[n(9)]
    pub version: u64,
}

impl AdRequest {
    /// A freshly submitted offer. The Sponsor proposed, so the Influencer
    /// holds the next turn.
    pub fn new_offer(
        id: String,
        campaign_id: String,
        sponsor_id: String,
        influencer_id: String,
        terms: Terms,
    ) -> Self {
        let now = TimeStamp::new();
        Self {
            id,
            campaign_id,
            sponsor_id,
            influencer_id,
            status: RequestStatus::Pending,
            terms,
            last_actor: ActorRole::Sponsor,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        }
    }

    /// Which party the given caller id is, if any.
    pub fn role_of(&self, caller_id: &str) -> Option<ActorRole> {
        if caller_id == self.sponsor_id {
            Some(ActorRole::Sponsor)
        } else if caller_id == self.influencer_id {
            Some(ActorRole::Influencer)
        } else {
            None
        }
    }

    /// The record after one committed transition. Identity fields carry over
    /// untouched; `version` advances by exactly 1.
    pub fn transitioned(
        &self,
        status: RequestStatus,
        terms: Terms,
        actor: ActorRole,
        at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            status,
            terms,
            last_actor: actor,
            updated_at: at,
            version: self.version + 1,
            ..self.clone()
        }
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}
