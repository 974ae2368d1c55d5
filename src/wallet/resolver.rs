//! Account resolution from seed hierarchies
//!
//! Validators are self-bound: their operator key is always index 0 of
//! the account-level path. Delegators may sit at any index, so each seed is
//! scanned over `0..MAX_DERIVATION_INDEX` and the first hit wins.
//!
//! Every seed is scanned even after a hit in an earlier one. An address
//! found in two seeds is reported as [`Error::AmbiguousAddress`] instead of
//! picking one.

use tracing::{info, warn};

use crate::error::{Error, Result};

use super::address::AddressPrefixes;
use super::types::Account;
use super::vault::SeedVault;

/// Size of the delegator index search space
pub const MAX_DERIVATION_INDEX: u32 = 512;

/// Lowest index in `0..limit` accepted by `matches`
pub fn first_matching_index<F>(limit: u32, mut matches: F) -> Result<Option<u32>>
where
    F: FnMut(u32) -> Result<bool>,
{
    for index in 0..limit {
        if matches(index)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// Resolves configured addresses against the vault's seeds
pub struct AccountResolver<'a> {
    vault: &'a mut SeedVault,
    prefixes: &'a AddressPrefixes,
    search_limit: u32,
}

impl<'a> AccountResolver<'a> {
    pub fn new(vault: &'a mut SeedVault, prefixes: &'a AddressPrefixes) -> Self {
        Self {
            vault,
            prefixes,
            search_limit: MAX_DERIVATION_INDEX,
        }
    }

    /// Narrow the delegator index search space
    pub fn with_search_limit(mut self, limit: u32) -> Self {
        self.search_limit = limit.min(MAX_DERIVATION_INDEX);
        self
    }

    /// Resolve a self-bound validator from the index-0 key of each seed
    pub fn resolve_validator(&mut self, expected: &str) -> Result<Account> {
        let expected = expected.trim().to_lowercase();
        let mut matches = Vec::new();
        let mut derived = Vec::new();

        for (seed, unit) in self.vault.units().iter().enumerate() {
            let key = unit.derive(0)?;
            let validator = self.prefixes.validator_address(&key)?;
            if validator == expected {
                matches.push((seed, key));
            } else {
                derived.push(validator);
            }
        }

        if matches.len() > 1 {
            return Err(Error::AmbiguousAddress {
                address: expected,
                seeds: matches.iter().map(|(seed, _)| *seed).collect(),
            });
        }

        let (seed, key) = matches.pop().ok_or_else(|| Error::AddressMismatch {
            expected: expected.clone(),
            derived: derived.join(", "),
        })?;

        let delegator = self.prefixes.delegator_address(&key)?;
        Ok(Account::validator(delegator, expected, key, seed))
    }

    /// Resolve a delegator by scanning every seed's index range
    pub fn resolve_delegator(&mut self, address: &str) -> Result<Account> {
        let target = address.trim().to_lowercase();
        let prefixes = self.prefixes;
        let limit = self.search_limit;
        let mut found = Vec::new();

        for (seed, unit) in self.vault.units_mut().iter_mut().enumerate() {
            let index = first_matching_index(limit, |i| {
                let key = unit.derive(i)?;
                Ok(prefixes.delegator_address(&key)? == target)
            })?;

            unit.set_resolved_index(index);
            if let Some(index) = index {
                found.push((seed, index));
            }
        }

        match found.as_slice() {
            [] => Err(Error::AddressNotFound {
                address: target,
                searched: limit,
            }),
            [(seed, index)] => {
                let key = self.vault.units()[*seed].derive(*index)?;
                let derived = prefixes.delegator_address(&key)?;
                if derived != target {
                    return Err(Error::AddressMismatch {
                        expected: target,
                        derived,
                    });
                }
                Ok(Account::delegator(derived, key, *seed, *index))
            }
            _ => Err(Error::AmbiguousAddress {
                address: target,
                seeds: found.iter().map(|(seed, _)| *seed).collect(),
            }),
        }
    }
}

/// Resolve the whole configured account set, validators first
///
/// Duplicate delegator addresses (including a validator's self-bound
/// address listed again as a delegator) are skipped with a warning.
pub fn resolve_accounts(
    vault: &mut SeedVault,
    prefixes: &AddressPrefixes,
    validators: &[String],
    delegators: &[String],
) -> Result<Vec<Account>> {
    let mut resolver = AccountResolver::new(vault, prefixes);
    let mut accounts: Vec<Account> = Vec::new();

    for validator in validators {
        let account = resolver.resolve_validator(validator)?;
        if accounts.iter().any(|a| a.has_address(account.delegator_address())) {
            warn!("Validator '{}' already in the list of accounts", validator);
            continue;
        }

        info!(
            "Validator '{}' added for commission withdrawals",
            account.validator_address().unwrap_or_default()
        );
        info!(
            "Validator self-bound address '{}' added for rewards withdrawals",
            account.delegator_address()
        );
        accounts.push(account);
    }

    for delegator in delegators {
        let account = resolver.resolve_delegator(delegator)?;
        if accounts.iter().any(|a| a.has_address(account.delegator_address())) {
            warn!(
                "Address '{}' (index {}) already in the list of accounts",
                account.delegator_address(),
                account.index()
            );
            continue;
        }

        info!(
            "Address '{}' (seed #{}, index {}) added to the list of accounts",
            account.delegator_address(),
            account.seed(),
            account.index()
        );
        accounts.push(account);
    }

    if accounts.is_empty() {
        return Err(Error::NoAccounts);
    }

    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::vault::tests::{OTHER_MNEMONIC, TEST_MNEMONIC};
    use crate::wallet::vault::SeedUnit;

    fn prefixes() -> AddressPrefixes {
        AddressPrefixes::new("fx", "fxvaloper")
    }

    fn vault(mnemonics: &[&str]) -> SeedVault {
        SeedVault::from_units(
            mnemonics
                .iter()
                .map(|m| SeedUnit::from_mnemonic(m).unwrap())
                .collect(),
        )
    }

    fn delegator_at(mnemonic: &str, index: u32) -> String {
        let key = SeedUnit::from_mnemonic(mnemonic).unwrap().derive(index).unwrap();
        prefixes().delegator_address(&key).unwrap()
    }

    fn validator_of(mnemonic: &str) -> String {
        let key = SeedUnit::from_mnemonic(mnemonic).unwrap().derive(0).unwrap();
        prefixes().validator_address(&key).unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let index = first_matching_index(512, |i| Ok(i == 7 || i == 130)).unwrap();
        assert_eq!(index, Some(7));
    }

    #[test]
    fn test_no_match_in_range() {
        let mut probed = 0;
        let index = first_matching_index(512, |_| {
            probed += 1;
            Ok(false)
        })
        .unwrap();
        assert_eq!(index, None);
        assert_eq!(probed, 512);
    }

    #[test]
    fn test_resolve_delegator_in_second_seed() {
        let mut vault = vault(&[TEST_MNEMONIC, OTHER_MNEMONIC]);
        let prefixes = prefixes();
        let target = delegator_at(OTHER_MNEMONIC, 5);

        let account = AccountResolver::new(&mut vault, &prefixes)
            .with_search_limit(16)
            .resolve_delegator(&target.to_uppercase())
            .unwrap();

        assert_eq!(account.delegator_address(), target);
        assert_eq!(account.seed(), 1);
        assert_eq!(account.index(), 5);
        assert!(!account.is_validator());
        assert_eq!(vault.units()[0].resolved_index(), None);
        assert_eq!(vault.units()[1].resolved_index(), Some(5));
    }

    #[test]
    fn test_delegator_not_found() {
        let mut vault = vault(&[TEST_MNEMONIC]);
        let prefixes = prefixes();
        let target = delegator_at(TEST_MNEMONIC, 10);

        let result = AccountResolver::new(&mut vault, &prefixes)
            .with_search_limit(8)
            .resolve_delegator(&target);

        assert!(matches!(result, Err(Error::AddressNotFound { searched: 8, .. })));
    }

    #[test]
    fn test_same_address_in_two_seeds_is_ambiguous() {
        let mut vault = vault(&[TEST_MNEMONIC, TEST_MNEMONIC]);
        let prefixes = prefixes();
        let target = delegator_at(TEST_MNEMONIC, 1);

        let result = AccountResolver::new(&mut vault, &prefixes)
            .with_search_limit(4)
            .resolve_delegator(&target);

        match result {
            Err(Error::AmbiguousAddress { seeds, .. }) => assert_eq!(seeds, vec![0, 1]),
            other => panic!("expected ambiguous address, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_validator() {
        let mut vault = vault(&[TEST_MNEMONIC, OTHER_MNEMONIC]);
        let prefixes = prefixes();
        let expected = validator_of(OTHER_MNEMONIC);

        let account = AccountResolver::new(&mut vault, &prefixes)
            .resolve_validator(&expected)
            .unwrap();

        assert!(account.is_validator());
        assert_eq!(account.validator_address(), Some(expected.as_str()));
        assert_eq!(account.delegator_address(), delegator_at(OTHER_MNEMONIC, 0));
        assert_eq!(account.seed(), 1);
    }

    #[test]
    fn test_validator_mismatch() {
        let mut vault = vault(&[TEST_MNEMONIC]);
        let prefixes = prefixes();
        let foreign = validator_of(OTHER_MNEMONIC);

        let result = AccountResolver::new(&mut vault, &prefixes).resolve_validator(&foreign);
        match result {
            Err(Error::AddressMismatch { expected, derived }) => {
                assert_eq!(expected, foreign);
                assert_eq!(derived, validator_of(TEST_MNEMONIC));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_accounts_deduplicates() {
        let mut vault = vault(&[TEST_MNEMONIC]);
        let self_bound = delegator_at(TEST_MNEMONIC, 0);

        let accounts = resolve_accounts(
            &mut vault,
            &prefixes(),
            &[validator_of(TEST_MNEMONIC)],
            &[self_bound.to_uppercase(), self_bound.clone()],
        )
        .unwrap();

        assert_eq!(accounts.len(), 1);
        assert!(accounts[0].is_validator());
        assert_eq!(accounts[0].delegator_address(), self_bound);
    }

    #[test]
    fn test_resolve_accounts_requires_one() {
        let mut vault = vault(&[TEST_MNEMONIC]);
        let result = resolve_accounts(&mut vault, &prefixes(), &[], &[]);
        assert!(matches!(result, Err(Error::NoAccounts)));
    }
}
