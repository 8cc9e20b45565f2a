use crate::codec::CodecError;
use crate::domain::{AmountError, IdentifierError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Terminal status of a write that was submitted but did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// The ledger refused the submission outright.
    Rejected,
    Reverted,
    Timeout,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Rejected => write!(f, "rejected"),
            TxStatus::Reverted => write!(f, "reverted"),
            TxStatus::Timeout => write!(f, "timeout"),
        }
    }
}

fn hash_suffix(tx_hash: &Option<String>) -> String {
    tx_hash
        .as_deref()
        .map(|h| format!(" ({})", h))
        .unwrap_or_default()
}

/// Errors surfaced by the gateways, the lifecycle workflow and the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("malformed amount: {0}")]
    MalformedAmount(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("a valuation already exists for this company")]
    ValuationAlreadyExists,
    #[error("no valuation found for this company")]
    ValuationNotFound,
    #[error("signer is not the evaluator recorded on the valuation")]
    NotAuthorizedEvaluator,
    #[error("asset valuation is not set")]
    ValuationNotSet,
    #[error("trading is already active")]
    TradingAlreadyActive,
    #[error("trading is not active")]
    TradingNotActive,
    #[error("asset is already paused")]
    AlreadyPaused,
    #[error("asset is not paused")]
    NotPaused,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("insufficient allowance")]
    InsufficientAllowance,
    #[error("maximum supply reached")]
    MaxSupplyReached,
    #[error("no fees to withdraw")]
    NoFeesToWithdraw,
    #[error("transaction {status}{}", hash_suffix(.tx_hash))]
    TransactionFailed {
        status: TxStatus,
        tx_hash: Option<String>,
    },
    #[error("unclassified revert: {raw}")]
    UnclassifiedRevert { raw: String },
    #[error("query failed: {reason}")]
    QueryFailed { reason: String },
    #[error("{operation} is already in flight as {tx_hash}; reconcile first")]
    WriteInFlight { operation: String, tx_hash: String },
    #[error("journal error: {0}")]
    Journal(String),
}

impl DomainError {
    /// Stable tag naming the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::InvalidIdentifier(_) => "InvalidIdentifier",
            DomainError::MalformedAmount(_) => "MalformedAmount",
            DomainError::OutOfRange(_) => "OutOfRange",
            DomainError::ValuationAlreadyExists => "ValuationAlreadyExists",
            DomainError::ValuationNotFound => "ValuationNotFound",
            DomainError::NotAuthorizedEvaluator => "NotAuthorizedEvaluator",
            DomainError::ValuationNotSet => "ValuationNotSet",
            DomainError::TradingAlreadyActive => "TradingAlreadyActive",
            DomainError::TradingNotActive => "TradingNotActive",
            DomainError::AlreadyPaused => "AlreadyPaused",
            DomainError::NotPaused => "NotPaused",
            DomainError::InsufficientBalance => "InsufficientBalance",
            DomainError::InsufficientAllowance => "InsufficientAllowance",
            DomainError::MaxSupplyReached => "MaxSupplyReached",
            DomainError::NoFeesToWithdraw => "NoFeesToWithdraw",
            DomainError::TransactionFailed { .. } => "TransactionFailed",
            DomainError::UnclassifiedRevert { .. } => "UnclassifiedRevert",
            DomainError::QueryFailed { .. } => "QueryFailed",
            DomainError::WriteInFlight { .. } => "WriteInFlight",
            DomainError::Journal(_) => "Journal",
        }
    }

    pub fn query_failed(reason: impl fmt::Display) -> Self {
        DomainError::QueryFailed {
            reason: reason.to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            DomainError::InvalidIdentifier(_)
            | DomainError::MalformedAmount(_)
            | DomainError::OutOfRange(_) => StatusCode::BAD_REQUEST,
            DomainError::ValuationNotFound => StatusCode::NOT_FOUND,
            DomainError::NotAuthorizedEvaluator => StatusCode::FORBIDDEN,
            DomainError::ValuationAlreadyExists
            | DomainError::ValuationNotSet
            | DomainError::TradingAlreadyActive
            | DomainError::TradingNotActive
            | DomainError::AlreadyPaused
            | DomainError::NotPaused
            | DomainError::InsufficientBalance
            | DomainError::InsufficientAllowance
            | DomainError::MaxSupplyReached
            | DomainError::NoFeesToWithdraw
            | DomainError::WriteInFlight { .. } => StatusCode::CONFLICT,
            DomainError::TransactionFailed { .. }
            | DomainError::UnclassifiedRevert { .. }
            | DomainError::QueryFailed { .. } => StatusCode::BAD_GATEWAY,
            DomainError::Journal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CodecError> for DomainError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MalformedAmount(msg) => DomainError::MalformedAmount(msg),
            CodecError::OutOfRange(msg) => DomainError::OutOfRange(msg),
        }
    }
}

impl From<IdentifierError> for DomainError {
    fn from(err: IdentifierError) -> Self {
        DomainError::InvalidIdentifier(err.to_string())
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        DomainError::OutOfRange(err.to_string())
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Journal(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal", msg),
            AppError::Domain(err) => (err.status_code(), err.kind(), err.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(DomainError::ValuationNotFound.kind(), "ValuationNotFound");
        assert_eq!(
            DomainError::query_failed("connection refused").kind(),
            "QueryFailed"
        );
    }

    #[test]
    fn test_transaction_failed_display() {
        let err = DomainError::TransactionFailed {
            status: TxStatus::Timeout,
            tx_hash: Some("0xabc".to_string()),
        };
        assert_eq!(err.to_string(), "transaction timeout (0xabc)");
        let err = DomainError::TransactionFailed {
            status: TxStatus::Reverted,
            tx_hash: None,
        };
        assert_eq!(err.to_string(), "transaction reverted");
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (DomainError::InvalidIdentifier("x".into()), StatusCode::BAD_REQUEST),
            (DomainError::ValuationNotFound, StatusCode::NOT_FOUND),
            (DomainError::NotAuthorizedEvaluator, StatusCode::FORBIDDEN),
            (DomainError::AlreadyPaused, StatusCode::CONFLICT),
            (
                DomainError::UnclassifiedRevert { raw: "0x".into() },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_journal_failure_is_internal() {
        let err = AppError::from(sqlx::Error::PoolClosed);
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_codec_error_conversion() {
        let err: DomainError = CodecError::MalformedAmount("1e5".into()).into();
        assert_eq!(err.kind(), "MalformedAmount");
    }
}
