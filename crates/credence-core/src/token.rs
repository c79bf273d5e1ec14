use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type AccountId = String;
pub type Amount = u64;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("account {caller} is not the token owner")]
    NotOwner { caller: AccountId },
    #[error("insufficient balance in account {account}")]
    InsufficientBalance { account: AccountId },
    #[error("allowance from {owner} to {spender} is too small")]
    InsufficientAllowance { owner: AccountId, spender: AccountId },
    #[error("minting {amount} would overflow the total supply")]
    SupplyOverflow { amount: Amount },
}

/// Fungible balance ledger used as the registry's fee currency.
///
/// Balances and allowances of absent accounts read as zero. Every mutation
/// either fully applies or fails without touching state, so
/// `sum(balances) == total_supply` holds at all times.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    name: String,
    symbol: String,
    decimals: u8,
    owner: AccountId,
    total_supply: Amount,
    balances: BTreeMap<AccountId, Amount>,
    allowances: BTreeMap<AccountId, BTreeMap<AccountId, Amount>>,
}

impl Token {
    pub fn new(name: String, symbol: String, decimals: u8, owner: AccountId) -> Self {
        Self {
            name,
            symbol,
            decimals,
            owner,
            total_supply: 0,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn balances(&self) -> &BTreeMap<AccountId, Amount> {
        &self.balances
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Create new supply in `to`'s account. Only the token owner may mint.
    pub fn mint(
        &mut self,
        caller: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if caller != &self.owner {
            return Err(TokenError::NotOwner {
                caller: caller.clone(),
            });
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        self.total_supply = supply;
        self.credit(to, amount);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.debit(from, amount)?;
        self.credit(to, amount);
        Ok(())
    }

    /// Set (not add to) the amount `spender` may move out of `owner`'s
    /// account. Approving zero clears the allowance.
    pub fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount) {
        if amount == 0 {
            if let Some(spenders) = self.allowances.get_mut(owner) {
                spenders.remove(spender);
                if spenders.is_empty() {
                    self.allowances.remove(owner);
                }
            }
            return;
        }
        self.allowances
            .entry(owner.clone())
            .or_default()
            .insert(spender.clone(), amount);
    }

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming
    /// that much of the granted allowance.
    pub fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.ensure_allowance(from, spender, amount)?;
        self.debit(from, amount)?;
        self.spend_allowance(from, spender, amount);
        self.credit(to, amount);
        Ok(())
    }

    /// Destroy `amount` from `from`'s balance, shrinking the total supply.
    pub fn burn(&mut self, from: &AccountId, amount: Amount) -> Result<(), TokenError> {
        self.debit(from, amount)?;
        self.total_supply -= amount;
        Ok(())
    }

    /// Burn out of `from`'s balance on behalf of `spender`, consuming
    /// allowance like [`Token::transfer_from`].
    pub fn burn_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.ensure_allowance(from, spender, amount)?;
        self.burn(from, amount)?;
        self.spend_allowance(from, spender, amount);
        Ok(())
    }

    fn ensure_allowance(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if self.allowance(owner, spender) < amount {
            return Err(TokenError::InsufficientAllowance {
                owner: owner.clone(),
                spender: spender.clone(),
            });
        }
        Ok(())
    }

    // Callers verify the allowance covers `amount` first.
    fn spend_allowance(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount) {
        if amount == 0 {
            return;
        }
        let remaining = self.allowance(owner, spender) - amount;
        self.approve(owner, spender, remaining);
    }

    fn credit(&mut self, account: &AccountId, amount: Amount) {
        if amount == 0 {
            return;
        }
        let balance = self.balances.entry(account.clone()).or_insert(0);
        *balance += amount;
    }

    fn debit(&mut self, account: &AccountId, amount: Amount) -> Result<(), TokenError> {
        if self.balance_of(account) < amount {
            return Err(TokenError::InsufficientBalance {
                account: account.clone(),
            });
        }
        if amount == 0 {
            return Ok(());
        }
        let balance = self.balances.entry(account.clone()).or_insert(0);
        *balance -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Token {
        Token::new(
            "Credence Token".into(),
            "CRD".into(),
            18,
            "issuer".to_string(),
        )
    }

    fn supply_is_conserved(token: &Token) -> bool {
        token.balances().values().sum::<Amount>() == token.total_supply()
    }

    #[test]
    fn only_the_owner_mints() {
        let mut token = token();
        let err = token
            .mint(&"mallory".to_string(), &"mallory".to_string(), 100)
            .unwrap_err();
        match err {
            TokenError::NotOwner { caller } => assert_eq!(caller, "mallory"),
            other => panic!("unexpected error: {other}"),
        }
        token
            .mint(&"issuer".to_string(), &"alice".to_string(), 100)
            .unwrap();
        assert_eq!(token.balance_of(&"alice".to_string()), 100);
        assert_eq!(token.total_supply(), 100);
        assert!(supply_is_conserved(&token));
    }

    #[test]
    fn minting_cannot_overflow_the_supply() {
        let mut token = token();
        token
            .mint(&"issuer".to_string(), &"alice".to_string(), u64::MAX)
            .unwrap();
        let err = token
            .mint(&"issuer".to_string(), &"bob".to_string(), 1)
            .unwrap_err();
        assert!(matches!(err, TokenError::SupplyOverflow { amount: 1 }));
        assert_eq!(token.total_supply(), u64::MAX);
    }

    #[test]
    fn transfers_move_balances_atomically() {
        let mut token = token();
        token
            .mint(&"issuer".to_string(), &"alice".to_string(), 50)
            .unwrap();
        token
            .transfer(&"alice".to_string(), &"bob".to_string(), 20)
            .unwrap();
        assert_eq!(token.balance_of(&"alice".to_string()), 30);
        assert_eq!(token.balance_of(&"bob".to_string()), 20);

        let err = token
            .transfer(&"alice".to_string(), &"bob".to_string(), 31)
            .unwrap_err();
        assert!(matches!(err, TokenError::InsufficientBalance { .. }));
        assert_eq!(token.balance_of(&"alice".to_string()), 30);
        assert_eq!(token.balance_of(&"bob".to_string()), 20);
        assert!(supply_is_conserved(&token));
    }

    #[test]
    fn transfer_from_spends_the_allowance() {
        let mut token = token();
        token
            .mint(&"issuer".to_string(), &"alice".to_string(), 100)
            .unwrap();
        token.approve(&"alice".to_string(), &"spender".to_string(), 60);
        assert_eq!(
            token.allowance(&"alice".to_string(), &"spender".to_string()),
            60
        );

        token
            .transfer_from(
                &"spender".to_string(),
                &"alice".to_string(),
                &"carol".to_string(),
                45,
            )
            .unwrap();
        assert_eq!(token.balance_of(&"carol".to_string()), 45);
        assert_eq!(
            token.allowance(&"alice".to_string(), &"spender".to_string()),
            15
        );

        let err = token
            .transfer_from(
                &"spender".to_string(),
                &"alice".to_string(),
                &"carol".to_string(),
                16,
            )
            .unwrap_err();
        assert!(matches!(err, TokenError::InsufficientAllowance { .. }));
        assert_eq!(token.balance_of(&"carol".to_string()), 45);
        assert!(supply_is_conserved(&token));
    }

    #[test]
    fn failed_pull_leaves_the_allowance_intact() {
        let mut token = token();
        token
            .mint(&"issuer".to_string(), &"alice".to_string(), 10)
            .unwrap();
        token.approve(&"alice".to_string(), &"spender".to_string(), 40);
        let err = token
            .transfer_from(
                &"spender".to_string(),
                &"alice".to_string(),
                &"carol".to_string(),
                25,
            )
            .unwrap_err();
        assert!(matches!(err, TokenError::InsufficientBalance { .. }));
        assert_eq!(
            token.allowance(&"alice".to_string(), &"spender".to_string()),
            40
        );
    }

    #[test]
    fn burning_shrinks_the_supply() {
        let mut token = token();
        token
            .mint(&"issuer".to_string(), &"alice".to_string(), 100)
            .unwrap();
        token.burn(&"alice".to_string(), 30).unwrap();
        assert_eq!(token.balance_of(&"alice".to_string()), 70);
        assert_eq!(token.total_supply(), 70);

        token.approve(&"alice".to_string(), &"burner".to_string(), 50);
        token
            .burn_from(&"burner".to_string(), &"alice".to_string(), 20)
            .unwrap();
        assert_eq!(token.balance_of(&"alice".to_string()), 50);
        assert_eq!(token.total_supply(), 50);
        assert_eq!(
            token.allowance(&"alice".to_string(), &"burner".to_string()),
            30
        );
        assert!(supply_is_conserved(&token));
    }

    #[test]
    fn approving_zero_clears_the_allowance() {
        let mut token = token();
        token.approve(&"alice".to_string(), &"spender".to_string(), 10);
        token.approve(&"alice".to_string(), &"spender".to_string(), 0);
        assert_eq!(
            token.allowance(&"alice".to_string(), &"spender".to_string()),
            0
        );
    }
}
