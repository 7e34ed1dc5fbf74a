//! Verification Gate
//!
//! Pure checks over compliance facts owned by the KYC subsystem. Nothing
//! here touches storage or fails; a rejection is described by a reason.

use serde::{Deserialize, Serialize};

use super::rules::XpEventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    NotStarted,
    Pending,
    Completed,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsStatus {
    Missing,
    Pending,
    Valid,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Clean,
    UnderReview,
    Flagged,
}

/// Compliance facts for one user, as reported by the compliance subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStatus {
    pub is_verified: bool,
    pub kyc_status: KycStatus,
    pub credentials_status: CredentialsStatus,
    pub compliance_status: ComplianceStatus,
}

impl VerificationStatus {
    /// A fully verified, clean user
    pub fn verified() -> Self {
        Self {
            is_verified: true,
            kyc_status: KycStatus::Completed,
            credentials_status: CredentialsStatus::Valid,
            compliance_status: ComplianceStatus::Clean,
        }
    }
}

/// Result of an eligibility check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: Option<String>,
}

impl Eligibility {
    fn allowed() -> Self {
        Self { eligible: true, reason: None }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self { eligible: false, reason: Some(reason.into()) }
    }
}

pub fn can_earn_points(status: &VerificationStatus) -> bool {
    status.is_verified
        && status.kyc_status == KycStatus::Completed
        && status.credentials_status == CredentialsStatus::Valid
        && status.compliance_status == ComplianceStatus::Clean
}

pub fn check_eligibility(status: &VerificationStatus, event_type: XpEventType) -> Eligibility {
    if !status.is_verified {
        return Eligibility::denied("account is not verified");
    }
    if status.kyc_status != KycStatus::Completed {
        return Eligibility::denied(format!("kyc is {:?}, must be completed", status.kyc_status));
    }
    if status.credentials_status != CredentialsStatus::Valid {
        return Eligibility::denied(format!(
            "credentials are {:?}, must be valid",
            status.credentials_status
        ));
    }
    if status.compliance_status != ComplianceStatus::Clean {
        return Eligibility::denied(format!(
            "compliance is {:?}, must be clean",
            status.compliance_status
        ));
    }

    // Event-specific checks, kept explicit even where the base gate covers them
    match event_type {
        XpEventType::CredentialsUpToDate
            if status.credentials_status != CredentialsStatus::Valid =>
        {
            Eligibility::denied("credentials_up_to_date requires valid credentials")
        }
        XpEventType::KycCompleted if status.kyc_status != KycStatus::Completed => {
            Eligibility::denied("kyc_completed requires completed kyc")
        }
        _ => Eligibility::allowed(),
    }
}
