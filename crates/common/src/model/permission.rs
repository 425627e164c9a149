use serde::{Deserialize, Serialize};

use crate::{model::blocked::BlockedReason, time::EpochMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    AppGracePeriod,
    OrgGracePeriod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub code: WarningCode,
    #[serde(rename = "timeRemaining", skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<EpochMs>,
    #[serde(rename = "gitEmail", skip_serializing_if = "Option::is_none")]
    pub git_email: Option<String>,
}

impl Warning {
    pub fn app_grace_period(time_remaining: EpochMs) -> Self {
        Self { code: WarningCode::AppGracePeriod, time_remaining: Some(time_remaining), git_email: None }
    }

    pub fn org_grace_period(time_remaining: EpochMs) -> Self {
        Self { code: WarningCode::OrgGracePeriod, time_remaining: Some(time_remaining), git_email: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    GitEmailRequired,
    UserNotAuthorized,
    OrgFlagged,
    SubscriptionCancelled,
    PaymentFailed,
    NoSubscription,
    GraceExpired,
    OrgGraceExpired,
}

impl ErrorCode {
    /// Maps a `BlockedEntry.reason` to the error code returned for a blocked
    /// organization, regardless of the app's owner type.
    pub fn from_blocked_reason(reason: BlockedReason) -> Self {
        match reason {
            BlockedReason::Flagged => ErrorCode::OrgFlagged,
            BlockedReason::SubscriptionCancelled => ErrorCode::SubscriptionCancelled,
            BlockedReason::PaymentFailed => ErrorCode::PaymentFailed,
            BlockedReason::NoSubscription => ErrorCode::NoSubscription,
        }
    }

    /// The wire representation used as the `403` response body (see
    /// "body is the error code string").
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::GitEmailRequired => "GIT_EMAIL_REQUIRED",
            ErrorCode::UserNotAuthorized => "USER_NOT_AUTHORIZED",
            ErrorCode::OrgFlagged => "ORG_FLAGGED",
            ErrorCode::SubscriptionCancelled => "SUBSCRIPTION_CANCELLED",
            ErrorCode::PaymentFailed => "PAYMENT_FAILED",
            ErrorCode::NoSubscription => "NO_SUBSCRIPTION",
            ErrorCode::GraceExpired => "GRACE_EXPIRED",
            ErrorCode::OrgGraceExpired => "ORG_GRACE_EXPIRED",
        }
    }
}

/// The decision returned by the permission evaluator: a discriminated union,
/// never a bare boolean plus side-channel fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "allowed")]
pub enum PermissionResult {
    #[serde(rename = "true")]
    Allowed {
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<Warning>,
    },
    #[serde(rename = "false")]
    Denied { error: ErrorCode },
}

impl PermissionResult {
    pub fn allowed(warning: Option<Warning>) -> Self {
        PermissionResult::Allowed { warning }
    }

    pub fn denied(error: ErrorCode) -> Self {
        PermissionResult::Denied { error }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionResult::Allowed { .. })
    }

    pub fn warning(&self) -> Option<&Warning> {
        match self {
            PermissionResult::Allowed { warning } => warning.as_ref(),
            PermissionResult::Denied { .. } => None,
        }
    }

    pub fn error(&self) -> Option<ErrorCode> {
        match self {
            PermissionResult::Denied { error } => Some(*error),
            PermissionResult::Allowed { .. } => None,
        }
    }
}

/// The writeback intent computed for a newly classified organization user
/// (set by the permission evaluator, consumed by writeback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewUserWriteback {
    Allow,
    Deny,
    Unknown,
}
