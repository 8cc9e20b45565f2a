//! Revert payload classification.
//!
//! Contracts revert with a 4-byte custom-error selector followed by the
//! ABI-encoded error arguments. Known selectors map onto domain errors; the
//! generic `Error(string)` and anything unrecognised stay unclassified.

use crate::error::DomainError;
use crate::ledger::abi::selector;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, U256};

const VALUATION_ALREADY_EXISTS: &str = "ValuationAlreadyExists()";
const VALUATION_NOT_FOUND: &str = "ValuationNotFound()";
const NOT_AUTHORIZED_EVALUATOR: &str = "NotAuthorizedEvaluator()";
const VALUATION_NOT_SET: &str = "ValuationNotSet()";
const TRADING_ALREADY_ACTIVE: &str = "TradingAlreadyActive()";
const TRADING_NOT_ACTIVE: &str = "TradingNotActive()";
const ENFORCED_PAUSE: &str = "EnforcedPause()";
const EXPECTED_PAUSE: &str = "ExpectedPause()";
const ERC20_INSUFFICIENT_BALANCE: &str = "ERC20InsufficientBalance(address,uint256,uint256)";
const INSUFFICIENT_BALANCE: &str = "InsufficientBalance()";
const ERC20_INSUFFICIENT_ALLOWANCE: &str = "ERC20InsufficientAllowance(address,uint256,uint256)";
const MAX_SUPPLY_REACHED: &str = "MaxSupplyReached()";
const NO_FEES_TO_WITHDRAW: &str = "NoFeesToWithdraw()";
const FEE_RATE_TOO_HIGH: &str = "FeeRateTooHigh()";
const INVALID_AMOUNT: &str = "InvalidAmount()";
const ERROR_STRING: &str = "Error(string)";
const PANIC: &str = "Panic(uint256)";

/// Decoded reason carried by a revert payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    ValuationAlreadyExists,
    ValuationNotFound,
    NotAuthorizedEvaluator,
    ValuationNotSet,
    TradingAlreadyActive,
    TradingNotActive,
    EnforcedPause,
    ExpectedPause,
    Erc20InsufficientBalance {
        sender: Address,
        balance: U256,
        needed: U256,
    },
    InsufficientBalance,
    Erc20InsufficientAllowance {
        spender: Address,
        allowance: U256,
        needed: U256,
    },
    MaxSupplyReached,
    NoFeesToWithdraw,
    FeeRateTooHigh,
    InvalidAmount,
    /// `Error(string)` with its message.
    Message(String),
    /// `Panic(uint256)` with its code.
    Panic(U256),
    /// Empty payload or an unrecognised selector.
    Unknown,
}

impl RevertReason {
    fn signature(&self) -> Option<&'static str> {
        let sig = match self {
            RevertReason::ValuationAlreadyExists => VALUATION_ALREADY_EXISTS,
            RevertReason::ValuationNotFound => VALUATION_NOT_FOUND,
            RevertReason::NotAuthorizedEvaluator => NOT_AUTHORIZED_EVALUATOR,
            RevertReason::ValuationNotSet => VALUATION_NOT_SET,
            RevertReason::TradingAlreadyActive => TRADING_ALREADY_ACTIVE,
            RevertReason::TradingNotActive => TRADING_NOT_ACTIVE,
            RevertReason::EnforcedPause => ENFORCED_PAUSE,
            RevertReason::ExpectedPause => EXPECTED_PAUSE,
            RevertReason::Erc20InsufficientBalance { .. } => ERC20_INSUFFICIENT_BALANCE,
            RevertReason::InsufficientBalance => INSUFFICIENT_BALANCE,
            RevertReason::Erc20InsufficientAllowance { .. } => ERC20_INSUFFICIENT_ALLOWANCE,
            RevertReason::MaxSupplyReached => MAX_SUPPLY_REACHED,
            RevertReason::NoFeesToWithdraw => NO_FEES_TO_WITHDRAW,
            RevertReason::FeeRateTooHigh => FEE_RATE_TOO_HIGH,
            RevertReason::InvalidAmount => INVALID_AMOUNT,
            RevertReason::Message(_) => ERROR_STRING,
            RevertReason::Panic(_) => PANIC,
            RevertReason::Unknown => return None,
        };
        Some(sig)
    }

    /// ABI-encodes the reason as a revert payload.
    pub fn encode(&self) -> Bytes {
        let Some(sig) = self.signature() else {
            return Bytes::default();
        };
        let tokens = match self {
            RevertReason::Erc20InsufficientBalance {
                sender,
                balance,
                needed,
            } => vec![
                Token::Address(*sender),
                Token::Uint(*balance),
                Token::Uint(*needed),
            ],
            RevertReason::Erc20InsufficientAllowance {
                spender,
                allowance,
                needed,
            } => vec![
                Token::Address(*spender),
                Token::Uint(*allowance),
                Token::Uint(*needed),
            ],
            RevertReason::Message(msg) => vec![Token::String(msg.clone())],
            RevertReason::Panic(code) => vec![Token::Uint(*code)],
            _ => vec![],
        };
        let mut out = selector(sig).to_vec();
        out.extend(abi::encode(&tokens));
        Bytes::from(out)
    }
}

fn decode_triple(args: &[u8]) -> Option<(Address, U256, U256)> {
    let tokens = abi::decode(
        &[ParamType::Address, ParamType::Uint(256), ParamType::Uint(256)],
        args,
    )
    .ok()?;
    let mut it = tokens.into_iter();
    let a = it.next()?.into_address()?;
    let b = it.next()?.into_uint()?;
    let c = it.next()?.into_uint()?;
    Some((a, b, c))
}

/// Classifies a raw revert payload by its selector.
pub fn classify_revert(data: &[u8]) -> RevertReason {
    if data.len() < 4 {
        return RevertReason::Unknown;
    }
    let (sel, args) = data.split_at(4);
    let matches = |sig: &str| selector(sig) == sel;

    if matches(VALUATION_ALREADY_EXISTS) {
        RevertReason::ValuationAlreadyExists
    } else if matches(VALUATION_NOT_FOUND) {
        RevertReason::ValuationNotFound
    } else if matches(NOT_AUTHORIZED_EVALUATOR) {
        RevertReason::NotAuthorizedEvaluator
    } else if matches(VALUATION_NOT_SET) {
        RevertReason::ValuationNotSet
    } else if matches(TRADING_ALREADY_ACTIVE) {
        RevertReason::TradingAlreadyActive
    } else if matches(TRADING_NOT_ACTIVE) {
        RevertReason::TradingNotActive
    } else if matches(ENFORCED_PAUSE) {
        RevertReason::EnforcedPause
    } else if matches(EXPECTED_PAUSE) {
        RevertReason::ExpectedPause
    } else if matches(INSUFFICIENT_BALANCE) {
        RevertReason::InsufficientBalance
    } else if matches(MAX_SUPPLY_REACHED) {
        RevertReason::MaxSupplyReached
    } else if matches(NO_FEES_TO_WITHDRAW) {
        RevertReason::NoFeesToWithdraw
    } else if matches(FEE_RATE_TOO_HIGH) {
        RevertReason::FeeRateTooHigh
    } else if matches(INVALID_AMOUNT) {
        RevertReason::InvalidAmount
    } else if matches(ERC20_INSUFFICIENT_BALANCE) {
        match decode_triple(args) {
            Some((sender, balance, needed)) => RevertReason::Erc20InsufficientBalance {
                sender,
                balance,
                needed,
            },
            None => RevertReason::Unknown,
        }
    } else if matches(ERC20_INSUFFICIENT_ALLOWANCE) {
        match decode_triple(args) {
            Some((spender, allowance, needed)) => RevertReason::Erc20InsufficientAllowance {
                spender,
                allowance,
                needed,
            },
            None => RevertReason::Unknown,
        }
    } else if matches(ERROR_STRING) {
        abi::decode(&[ParamType::String], args)
            .ok()
            .and_then(|t| t.into_iter().next())
            .and_then(|t| t.into_string())
            .map(RevertReason::Message)
            .unwrap_or(RevertReason::Unknown)
    } else if matches(PANIC) {
        abi::decode(&[ParamType::Uint(256)], args)
            .ok()
            .and_then(|t| t.into_iter().next())
            .and_then(|t| t.into_uint())
            .map(RevertReason::Panic)
            .unwrap_or(RevertReason::Unknown)
    } else {
        RevertReason::Unknown
    }
}

/// Maps a revert payload onto the domain error taxonomy.
pub fn revert_to_domain_error(data: &[u8]) -> DomainError {
    match classify_revert(data) {
        RevertReason::ValuationAlreadyExists => DomainError::ValuationAlreadyExists,
        RevertReason::ValuationNotFound => DomainError::ValuationNotFound,
        RevertReason::NotAuthorizedEvaluator => DomainError::NotAuthorizedEvaluator,
        RevertReason::ValuationNotSet => DomainError::ValuationNotSet,
        RevertReason::TradingAlreadyActive => DomainError::TradingAlreadyActive,
        RevertReason::TradingNotActive => DomainError::TradingNotActive,
        RevertReason::EnforcedPause => DomainError::AlreadyPaused,
        RevertReason::ExpectedPause => DomainError::NotPaused,
        RevertReason::Erc20InsufficientBalance { .. } | RevertReason::InsufficientBalance => {
            DomainError::InsufficientBalance
        }
        RevertReason::Erc20InsufficientAllowance { .. } => DomainError::InsufficientAllowance,
        RevertReason::MaxSupplyReached => DomainError::MaxSupplyReached,
        RevertReason::NoFeesToWithdraw => DomainError::NoFeesToWithdraw,
        RevertReason::FeeRateTooHigh => {
            DomainError::OutOfRange("fee rate rejected by the ledger".to_string())
        }
        RevertReason::InvalidAmount => {
            DomainError::OutOfRange("amount rejected by the ledger".to_string())
        }
        RevertReason::Message(_) | RevertReason::Panic(_) | RevertReason::Unknown => {
            DomainError::UnclassifiedRevert {
                raw: format!("0x{}", hex::encode(data)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_string_selector() {
        assert_eq!(hex::encode(selector(ERROR_STRING)), "08c379a0");
        assert_eq!(hex::encode(selector(PANIC)), "4e487b71");
    }

    #[test]
    fn test_classify_round_trips_custom_errors() {
        let reasons = [
            RevertReason::ValuationAlreadyExists,
            RevertReason::ValuationNotFound,
            RevertReason::NotAuthorizedEvaluator,
            RevertReason::TradingAlreadyActive,
            RevertReason::EnforcedPause,
            RevertReason::ExpectedPause,
            RevertReason::MaxSupplyReached,
            RevertReason::Erc20InsufficientBalance {
                sender: Address::repeat_byte(3),
                balance: U256::from(5u64),
                needed: U256::from(9u64),
            },
        ];
        for reason in reasons {
            assert_eq!(classify_revert(&reason.encode()), reason);
        }
    }

    #[test]
    fn test_pause_errors_map_to_state_conflicts() {
        assert_eq!(
            revert_to_domain_error(&RevertReason::EnforcedPause.encode()),
            DomainError::AlreadyPaused
        );
        assert_eq!(
            revert_to_domain_error(&RevertReason::ExpectedPause.encode()),
            DomainError::NotPaused
        );
    }

    #[test]
    fn test_error_string_is_unclassified() {
        let payload = RevertReason::Message("Ownable: caller is not the owner".into()).encode();
        assert_eq!(
            classify_revert(&payload),
            RevertReason::Message("Ownable: caller is not the owner".into())
        );
        match revert_to_domain_error(&payload) {
            DomainError::UnclassifiedRevert { raw } => assert!(raw.starts_with("0x08c379a0")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_and_empty_payloads() {
        assert_eq!(classify_revert(&[]), RevertReason::Unknown);
        assert_eq!(classify_revert(&[0xde, 0xad, 0xbe, 0xef]), RevertReason::Unknown);
        assert!(matches!(
            revert_to_domain_error(&[]),
            DomainError::UnclassifiedRevert { .. }
        ));
    }

    #[test]
    fn test_fee_rate_too_high_is_out_of_range() {
        assert!(matches!(
            revert_to_domain_error(&RevertReason::FeeRateTooHigh.encode()),
            DomainError::OutOfRange(_)
        ));
    }
}
