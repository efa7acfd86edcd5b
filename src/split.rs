//! Split-payment validation against the configured revenue-share policy.
//!
//! Fee enforcement is computed from the authoritative expected total and the
//! injected [`FeePolicy`], never from client-supplied per-recipient figures: a
//! malicious client that under-pays the platform share would still pass a
//! naive sum check, so the expected shares are recomputed here and compared
//! with a one-minimal-unit rounding tolerance.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::config::FeePolicy;
use crate::types::{Address, SplitPayment, TokenAmount};

/// Integer-division rounding slack, in minimal currency units.
const ROUNDING_TOLERANCE: u64 = 1;

/// One distinct reason per rejected split spec, checked in order with
/// short-circuit semantics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SplitMismatch {
    /// The spec's declared total disagrees with the authorized amount.
    #[error("declared total {declared} does not match authorized amount {expected}")]
    DeclaredTotalMismatch {
        expected: TokenAmount,
        declared: TokenAmount,
    },
    /// Enabled split with nothing to pay out.
    #[error("split payment enabled with no recipients")]
    EmptyRecipients,
    /// Recipient amounts do not add up to the total.
    #[error("recipient amounts sum to {actual}, expected {expected}")]
    RecipientSumMismatch {
        expected: TokenAmount,
        actual: TokenAmount,
    },
    /// No recipient pays the configured platform address.
    #[error("no recipient matches the platform fee address")]
    MissingFeeRecipient,
    /// The platform share is off by more than the rounding tolerance.
    #[error("platform fee is {actual}, expected {expected} (±{ROUNDING_TOLERANCE})")]
    FeeAmountMismatch {
        expected: TokenAmount,
        actual: TokenAmount,
    },
    /// No recipient pays the primary (merchant) address.
    #[error("no recipient matches the primary recipient address")]
    MissingPrimaryRecipient,
    /// The primary share is off by more than the rounding tolerance.
    #[error("primary share is {actual}, expected {expected} (±{ROUNDING_TOLERANCE})")]
    PrimaryAmountMismatch {
        expected: TokenAmount,
        actual: TokenAmount,
    },
}

/// Validates split specs for one deployment's fee policy.
#[derive(Debug, Clone)]
pub struct SplitValidator {
    platform_address: Address,
    fee_policy: FeePolicy,
}

impl SplitValidator {
    pub fn new(platform_address: Address, fee_policy: FeePolicy) -> Self {
        Self {
            platform_address,
            fee_policy,
        }
    }

    /// The platform share owed on `total` under this policy, floored to
    /// minimal units.
    pub fn expected_fee(&self, total: TokenAmount) -> TokenAmount {
        match &self.fee_policy {
            FeePolicy::Percent { percent } => {
                let fee = (Decimal::from(total) * *percent).floor();
                // Within u64 range: total is u64 and percent <= 1.
                TokenAmount::new(fee.to_u64().unwrap_or(0))
            }
            FeePolicy::Fixed { amount } => *amount,
        }
    }

    /// Checks `split` against the authorized `expected_total` and the
    /// expected `primary` (merchant) recipient.
    ///
    /// A disabled split always passes. Checks short-circuit on the first
    /// failure, each with its own [`SplitMismatch`] reason.
    pub fn validate(
        &self,
        split: &SplitPayment,
        expected_total: TokenAmount,
        primary: &Address,
    ) -> Result<(), SplitMismatch> {
        let SplitPayment::Enabled {
            total_amount,
            recipients,
        } = split
        else {
            return Ok(());
        };

        if *total_amount != expected_total {
            return Err(SplitMismatch::DeclaredTotalMismatch {
                expected: expected_total,
                declared: *total_amount,
            });
        }

        if recipients.is_empty() {
            return Err(SplitMismatch::EmptyRecipients);
        }

        let sum = recipients
            .iter()
            .try_fold(TokenAmount::new(0), |acc, r| acc.checked_add(r.amount))
            .ok_or(SplitMismatch::RecipientSumMismatch {
                expected: expected_total,
                actual: TokenAmount::new(u64::MAX),
            })?;
        if sum != expected_total {
            return Err(SplitMismatch::RecipientSumMismatch {
                expected: expected_total,
                actual: sum,
            });
        }

        let fee_recipient = recipients
            .iter()
            .find(|r| r.address == self.platform_address)
            .ok_or(SplitMismatch::MissingFeeRecipient)?;
        let expected_fee = self.expected_fee(expected_total);
        if fee_recipient.amount.abs_diff(expected_fee) > ROUNDING_TOLERANCE {
            return Err(SplitMismatch::FeeAmountMismatch {
                expected: expected_fee,
                actual: fee_recipient.amount,
            });
        }

        // Platform-only splits carry no separate merchant share.
        if primary == &self.platform_address {
            return Ok(());
        }
        let primary_recipient = recipients
            .iter()
            .find(|r| r.address == *primary)
            .ok_or(SplitMismatch::MissingPrimaryRecipient)?;
        let expected_primary = expected_total.saturating_sub(expected_fee);
        if primary_recipient.amount.abs_diff(expected_primary) > ROUNDING_TOLERANCE {
            return Err(SplitMismatch::PrimaryAmountMismatch {
                expected: expected_primary,
                actual: primary_recipient.amount,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SplitRecipient;
    use rust_decimal::Decimal;
    use solana_pubkey::Pubkey;
    use std::str::FromStr;

    fn address(byte: u8) -> Address {
        Address::new(Pubkey::new_from_array([byte; 32]))
    }

    fn percent_validator(percent: &str) -> SplitValidator {
        SplitValidator::new(
            address(0xFE),
            FeePolicy::Percent {
                percent: Decimal::from_str(percent).unwrap(),
            },
        )
    }

    fn recipient(addr: Address, amount: u64, description: &str) -> SplitRecipient {
        SplitRecipient {
            address: addr,
            amount: TokenAmount::new(amount),
            percentage: None,
            description: description.to_string(),
        }
    }

    fn enabled(total: u64, recipients: Vec<SplitRecipient>) -> SplitPayment {
        SplitPayment::Enabled {
            total_amount: TokenAmount::new(total),
            recipients,
        }
    }

    #[test]
    fn test_disabled_split_passes() {
        let validator = percent_validator("0.4");
        assert_eq!(
            validator.validate(&SplitPayment::Disabled, TokenAmount::new(1), &address(1)),
            Ok(())
        );
    }

    #[test]
    fn test_forty_percent_scenario_accepts() {
        // 100000 @ 0.4 -> fee 40000, merchant 60000.
        let validator = percent_validator("0.4");
        let split = enabled(
            100_000,
            vec![
                recipient(address(0xFE), 40_000, "platform fee"),
                recipient(address(0x01), 60_000, "merchant share"),
            ],
        );
        assert_eq!(
            validator.validate(&split, TokenAmount::new(100_000), &address(0x01)),
            Ok(())
        );
    }

    #[test]
    fn test_underpaid_fee_rejected_with_fee_reason() {
        let validator = percent_validator("0.4");
        let split = enabled(
            100_000,
            vec![
                recipient(address(0xFE), 39_000, "platform fee"),
                recipient(address(0x01), 61_000, "merchant share"),
            ],
        );
        let err = validator
            .validate(&split, TokenAmount::new(100_000), &address(0x01))
            .unwrap_err();
        assert_eq!(
            err,
            SplitMismatch::FeeAmountMismatch {
                expected: TokenAmount::new(40_000),
                actual: TokenAmount::new(39_000),
            }
        );
    }

    #[test]
    fn test_one_unit_rounding_tolerance() {
        // 99999 @ 0.4 -> floor = 39999; 40000 is within tolerance, 40001 is not.
        let validator = percent_validator("0.4");
        for (fee, merchant, ok) in [
            (39_999u64, 60_000u64, true),
            (40_000, 59_999, true),
            (40_001, 59_998, false),
        ] {
            let split = enabled(
                99_999,
                vec![
                    recipient(address(0xFE), fee, "platform fee"),
                    recipient(address(0x01), merchant, "merchant share"),
                ],
            );
            let result = validator.validate(&split, TokenAmount::new(99_999), &address(0x01));
            assert_eq!(result.is_ok(), ok, "fee {fee} merchant {merchant}");
        }
    }

    #[test]
    fn test_declared_total_checked_before_sum() {
        let validator = percent_validator("0.4");
        let split = enabled(90_000, vec![recipient(address(0xFE), 90_000, "fee")]);
        let err = validator
            .validate(&split, TokenAmount::new(100_000), &address(0x01))
            .unwrap_err();
        assert!(matches!(err, SplitMismatch::DeclaredTotalMismatch { .. }));
    }

    #[test]
    fn test_sum_mismatch_rejected() {
        let validator = percent_validator("0.4");
        let split = enabled(
            100_000,
            vec![
                recipient(address(0xFE), 40_000, "platform fee"),
                recipient(address(0x01), 50_000, "merchant share"),
            ],
        );
        let err = validator
            .validate(&split, TokenAmount::new(100_000), &address(0x01))
            .unwrap_err();
        assert_eq!(
            err,
            SplitMismatch::RecipientSumMismatch {
                expected: TokenAmount::new(100_000),
                actual: TokenAmount::new(90_000),
            }
        );
    }

    #[test]
    fn test_empty_recipients_rejected() {
        let validator = percent_validator("0.4");
        let split = enabled(100_000, vec![]);
        let err = validator
            .validate(&split, TokenAmount::new(100_000), &address(0x01))
            .unwrap_err();
        assert_eq!(err, SplitMismatch::EmptyRecipients);
    }

    #[test]
    fn test_missing_fee_recipient_rejected() {
        let validator = percent_validator("0.4");
        let split = enabled(
            100_000,
            vec![
                recipient(address(0x02), 40_000, "someone else"),
                recipient(address(0x01), 60_000, "merchant share"),
            ],
        );
        let err = validator
            .validate(&split, TokenAmount::new(100_000), &address(0x01))
            .unwrap_err();
        assert_eq!(err, SplitMismatch::MissingFeeRecipient);
    }

    #[test]
    fn test_fixed_fee_policy() {
        let validator = SplitValidator::new(
            address(0xFE),
            FeePolicy::Fixed {
                amount: TokenAmount::new(2_500),
            },
        );
        let split = enabled(
            100_000,
            vec![
                recipient(address(0xFE), 2_500, "platform fee"),
                recipient(address(0x01), 97_500, "merchant share"),
            ],
        );
        assert_eq!(
            validator.validate(&split, TokenAmount::new(100_000), &address(0x01)),
            Ok(())
        );
    }
}
