//! XP Rule Table
//!
//! Fixed mapping from event type to points. Points are copied onto each
//! `XpEvent` when it is recorded and never re-derived afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XpEventType {
    RfqPosted,
    QuoteSubmittedFast,
    QuoteAccepted,
    DealCompletedOnTime,
    DisputeFreeDeal,
    KycCompleted,
    CredentialsUpToDate,
    SavedSearchHitResponse,
    FallthroughRecovered,
    CommunityHelpful,
}

impl XpEventType {
    pub const ALL: [XpEventType; 10] = [
        XpEventType::RfqPosted,
        XpEventType::QuoteSubmittedFast,
        XpEventType::QuoteAccepted,
        XpEventType::DealCompletedOnTime,
        XpEventType::DisputeFreeDeal,
        XpEventType::KycCompleted,
        XpEventType::CredentialsUpToDate,
        XpEventType::SavedSearchHitResponse,
        XpEventType::FallthroughRecovered,
        XpEventType::CommunityHelpful,
    ];

    pub fn points(self) -> i64 {
        match self {
            XpEventType::RfqPosted => 5,
            XpEventType::QuoteSubmittedFast => 15,
            XpEventType::QuoteAccepted => 25,
            XpEventType::DealCompletedOnTime => 40,
            XpEventType::DisputeFreeDeal => 20,
            XpEventType::KycCompleted => 10,
            XpEventType::CredentialsUpToDate => 10,
            XpEventType::SavedSearchHitResponse => 10,
            XpEventType::FallthroughRecovered => 30,
            XpEventType::CommunityHelpful => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            XpEventType::RfqPosted => "rfq_posted",
            XpEventType::QuoteSubmittedFast => "quote_submitted_fast",
            XpEventType::QuoteAccepted => "quote_accepted",
            XpEventType::DealCompletedOnTime => "deal_completed_on_time",
            XpEventType::DisputeFreeDeal => "dispute_free_deal",
            XpEventType::KycCompleted => "kyc_completed",
            XpEventType::CredentialsUpToDate => "credentials_up_to_date",
            XpEventType::SavedSearchHitResponse => "saved_search_hit_response",
            XpEventType::FallthroughRecovered => "fallthrough_recovered",
            XpEventType::CommunityHelpful => "community_helpful",
        }
    }

    /// Short description of the marketplace action that earns it
    pub fn description(self) -> &'static str {
        match self {
            XpEventType::RfqPosted => "Posted a request for quote",
            XpEventType::QuoteSubmittedFast => "Submitted a quote within 5 minutes",
            XpEventType::QuoteAccepted => "Quote accepted by the requester",
            XpEventType::DealCompletedOnTime => "Completed a deal on schedule",
            XpEventType::DisputeFreeDeal => "Closed a deal without disputes",
            XpEventType::KycCompleted => "Completed identity verification",
            XpEventType::CredentialsUpToDate => "Updated operating credentials",
            XpEventType::SavedSearchHitResponse => "Answered a saved-search alert quickly",
            XpEventType::FallthroughRecovered => "Recovered a fallen-through trip",
            XpEventType::CommunityHelpful => "Recognised as helpful by an admin",
        }
    }
}

impl fmt::Display for XpEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for XpEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown xp event type: {}", s))
    }
}

/// Look up the rule-table value for a raw event type name
pub fn points_for(event_type: &str) -> Option<i64> {
    event_type.parse::<XpEventType>().ok().map(XpEventType::points)
}
