use core::str::FromStr;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use farmstand_core::{MarketError, MarketResult, PrincipalId, ValueObject};

/// Settlement currency a buyer pays with.
///
/// The charged amount is currency-agnostic: an item's single price is debited
/// in whichever currency is selected. No rate conversion happens inside the
/// ledger; a per-currency price would be a second stored field, never a
/// multiplier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// The chain-native settlement asset.
    Native,
    /// The stable settlement asset.
    Stable,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Native, Currency::Stable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Native => "native",
            Currency::Stable => "stable",
        }
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(Currency::Native),
            "stable" => Ok(Currency::Stable),
            other => Err(MarketError::validation(format!(
                "unknown currency '{other}'"
            ))),
        }
    }
}

impl ValueObject for Currency {}

/// Per-seller, per-currency accrued earnings.
///
/// Balances are created implicitly at zero on first read and persist across
/// zero-balance periods: withdrawal resets a balance, it never removes the
/// key. Distinct `(seller, currency)` pairs are fully independent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EarningsBook {
    balances: HashMap<(PrincipalId, Currency), u64>,
}

impl EarningsBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance; zero if never credited.
    pub fn balance(&self, seller: PrincipalId, currency: Currency) -> u64 {
        self.balances.get(&(seller, currency)).copied().unwrap_or(0)
    }

    /// Withdrawal precondition: the balance must be strictly positive.
    ///
    /// Returns the amount the withdrawal will transfer.
    pub fn check_withdraw(&self, seller: PrincipalId, currency: Currency) -> MarketResult<u64> {
        match self.balance(seller, currency) {
            0 => Err(MarketError::NoEarnings),
            amount => Ok(amount),
        }
    }

    /// Credit a completed sale.
    pub fn apply_credited(&mut self, seller: PrincipalId, currency: Currency, amount: u64) {
        *self.balances.entry((seller, currency)).or_insert(0) += amount;
    }

    /// Reset the balance to zero; the key persists.
    pub fn apply_withdrawn(&mut self, seller: PrincipalId, currency: Currency) {
        self.balances.insert((seller, currency), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn balance_defaults_to_zero() {
        let book = EarningsBook::new();
        assert_eq!(book.balance(PrincipalId::new(), Currency::Native), 0);
    }

    #[test]
    fn credits_accumulate_per_key() {
        let mut book = EarningsBook::new();
        let seller = PrincipalId::new();

        book.apply_credited(seller, Currency::Native, 1000);
        book.apply_credited(seller, Currency::Native, 500);
        book.apply_credited(seller, Currency::Stable, 900);

        assert_eq!(book.balance(seller, Currency::Native), 1500);
        assert_eq!(book.balance(seller, Currency::Stable), 900);
    }

    #[test]
    fn balances_of_distinct_sellers_are_independent() {
        let mut book = EarningsBook::new();
        let alice = PrincipalId::new();
        let bob = PrincipalId::new();

        book.apply_credited(alice, Currency::Native, 700);

        assert_eq!(book.balance(alice, Currency::Native), 700);
        assert_eq!(book.balance(bob, Currency::Native), 0);
    }

    #[test]
    fn withdraw_requires_positive_balance() {
        let book = EarningsBook::new();
        assert_eq!(
            book.check_withdraw(PrincipalId::new(), Currency::Stable)
                .unwrap_err(),
            MarketError::NoEarnings
        );
    }

    #[test]
    fn withdraw_reads_then_zeroes_exactly_once() {
        let mut book = EarningsBook::new();
        let seller = PrincipalId::new();
        book.apply_credited(seller, Currency::Native, 1000);

        let amount = book.check_withdraw(seller, Currency::Native).unwrap();
        assert_eq!(amount, 1000);
        book.apply_withdrawn(seller, Currency::Native);

        assert_eq!(book.balance(seller, Currency::Native), 0);
        assert_eq!(
            book.check_withdraw(seller, Currency::Native).unwrap_err(),
            MarketError::NoEarnings
        );
    }

    #[test]
    fn key_persists_across_zero_periods() {
        let mut book = EarningsBook::new();
        let seller = PrincipalId::new();

        book.apply_credited(seller, Currency::Stable, 300);
        book.apply_withdrawn(seller, Currency::Stable);
        book.apply_credited(seller, Currency::Stable, 200);

        assert_eq!(book.balance(seller, Currency::Stable), 200);
    }

    #[test]
    fn currency_round_trips_through_str() {
        for currency in Currency::ALL {
            assert_eq!(currency.as_str().parse::<Currency>().unwrap(), currency);
        }
        assert!("gold".parse::<Currency>().is_err());
    }

    proptest! {
        /// Property: after any interleaving of credits and withdrawals, each
        /// balance equals the credits since its last withdrawal, and a
        /// withdrawal always transfers exactly the balance read.
        #[test]
        fn withdrawals_transfer_exactly_the_accrued_amount(
            ops in prop::collection::vec((0u8..4, 1u64..10_000), 1..50)
        ) {
            let sellers = [PrincipalId::new(), PrincipalId::new()];
            let mut book = EarningsBook::new();
            let mut expected: HashMap<(usize, Currency), u64> = HashMap::new();

            for (op, amount) in ops {
                let seller_idx = (op % 2) as usize;
                let currency = if op < 2 { Currency::Native } else { Currency::Stable };
                let seller = sellers[seller_idx];

                if amount % 3 == 0 {
                    // Withdraw path.
                    let tracked = expected.get(&(seller_idx, currency)).copied().unwrap_or(0);
                    match book.check_withdraw(seller, currency) {
                        Ok(read) => {
                            prop_assert_eq!(read, tracked);
                            book.apply_withdrawn(seller, currency);
                            expected.insert((seller_idx, currency), 0);
                        }
                        Err(e) => {
                            prop_assert_eq!(e, MarketError::NoEarnings);
                            prop_assert_eq!(tracked, 0);
                        }
                    }
                } else {
                    book.apply_credited(seller, currency, amount);
                    *expected.entry((seller_idx, currency)).or_insert(0) += amount;
                }
            }

            for (idx, seller) in sellers.iter().enumerate() {
                for currency in Currency::ALL {
                    let tracked = expected.get(&(idx, currency)).copied().unwrap_or(0);
                    prop_assert_eq!(book.balance(*seller, currency), tracked);
                }
            }
        }
    }
}
