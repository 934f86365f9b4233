//! The encrypted token ledger.
//!
//! Balances and allowances are sealed. Transfers never fail on insufficient
//! funds: the amount actually moved is `mux(ok, amount, 0)`, so a transfer
//! that cannot be covered commits with both balances unchanged and the
//! caller learns the outcome only from the sealed success bit.
//!
//! Only the total supply is clear, since minting and burning take clear
//! amounts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use veilgate_core::{
    ConfidentialBackend, EncryptedInput, Principal, SealedValue, UserCiphertext,
};
use veilgate_policy::{DataPrivacyFramework, PermissionRule};

use crate::config::TokenConfig;
use crate::context::{encrypt_for_party, CallContext};
use crate::error::{PrincipalRole, Result, VeilError};
use crate::events::Event;

pub const OP_MINT: &str = "op_mint";
pub const OP_BURN: &str = "op_burn";

pub const TRANSFER_SIGNATURE: &str = "transfer(address,(uint256,bytes))";
pub const APPROVE_SIGNATURE: &str = "approve(address,(uint256,bytes))";
pub const TRANSFER_FROM_SIGNATURE: &str = "transferFrom(address,address,(uint256,bytes))";

/// An allowance as seen by its two parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceView {
    pub value: SealedValue,
    pub owner_value: Option<UserCiphertext>,
    pub spender_value: Option<UserCiphertext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateToken {
    address: Principal,
    owner: Principal,
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: u64,
    policy: DataPrivacyFramework,
    balances: BTreeMap<Principal, SealedValue>,
    allowances: BTreeMap<(Principal, Principal), SealedValue>,
}

impl PrivateToken {
    /// Deploy a token. The owner may mint and burn.
    pub fn new(owner: Principal, address: Principal, config: TokenConfig) -> Result<Self> {
        let mut policy = DataPrivacyFramework::with_owner(owner)?;
        policy.seed(PermissionRule::allow(owner, OP_MINT))?;
        policy.seed(PermissionRule::allow(owner, OP_BURN))?;
        Ok(Self {
            address,
            owner,
            name: config.name,
            symbol: config.symbol,
            decimals: config.decimals,
            total_supply: 0,
            policy,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        })
    }

    pub fn address(&self) -> Principal {
        self.address
    }

    pub fn owner(&self) -> Principal {
        self.owner
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

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn policy(&self) -> &DataPrivacyFramework {
        &self.policy
    }

    pub fn set_permission(&mut self, ctx: &CallContext<'_>, rule: PermissionRule) -> Result<()> {
        self.policy.set_permission(&ctx.caller(), ctx.now(), rule)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Supply
    // ─────────────────────────────────────────────────────────────────────────

    pub fn mint(&mut self, ctx: &mut CallContext<'_>, to: Principal, amount: u64) -> Result<()> {
        self.policy.require(&ctx.caller(), OP_MINT, ctx.now())?;
        if to.is_zero() {
            return Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Receiver,
                principal: to,
            });
        }
        let total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(VeilError::SupplyOverflow)?;

        let backend = ctx.backend();
        let sealed = backend.seal(amount)?;
        let balance = self.balance_or_zero(backend, &to)?;
        self.balances.insert(to, backend.add(&balance, &sealed)?);
        self.total_supply = total_supply;

        let receiver_value = ctx.encrypt_for_party(&sealed, &to)?;
        ctx.emit(
            self.address,
            Event::Transfer {
                from: Principal::ZERO,
                to,
                sender_value: None,
                receiver_value,
            },
        );
        Ok(())
    }

    /// Destroy `amount` of `from`'s tokens. Returns whether the balance
    /// covered it; an uncovered burn changes nothing.
    pub fn burn(&mut self, ctx: &mut CallContext<'_>, from: Principal, amount: u64) -> Result<bool> {
        self.policy.require(&ctx.caller(), OP_BURN, ctx.now())?;
        if from.is_zero() {
            return Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Sender,
                principal: from,
            });
        }

        let backend = ctx.backend();
        let sealed = backend.seal(amount)?;
        let balance = self.balance_or_zero(backend, &from)?;
        let covered = backend.reveal(&backend.ge(&balance, &sealed)?)? != 0;
        if !covered {
            return Ok(false);
        }

        self.balances.insert(from, backend.sub(&balance, &sealed)?);
        self.total_supply -= amount;

        let sender_value = ctx.encrypt_for_party(&sealed, &from)?;
        ctx.emit(
            self.address,
            Event::Transfer {
                from,
                to: Principal::ZERO,
                sender_value,
                receiver_value: None,
            },
        );
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transfers
    // ─────────────────────────────────────────────────────────────────────────

    /// Move an encrypted amount from the caller to `to`. Returns the sealed
    /// success bit.
    pub fn transfer(
        &mut self,
        ctx: &mut CallContext<'_>,
        to: Principal,
        input: &EncryptedInput,
    ) -> Result<SealedValue> {
        let amount = ctx.accept_input(input, self.address, TRANSFER_SIGNATURE)?;
        self.transfer_sealed(ctx, to, &amount)
    }

    /// Like [`PrivateToken::transfer`], for contracts holding a sealed amount.
    pub fn transfer_sealed(
        &mut self,
        ctx: &mut CallContext<'_>,
        to: Principal,
        amount: &SealedValue,
    ) -> Result<SealedValue> {
        if to.is_zero() {
            return Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Receiver,
                principal: to,
            });
        }
        let from = ctx.caller();
        let backend = ctx.backend();
        let balance = self.balance_or_zero(backend, &from)?;
        let ok = backend.ge(&balance, amount)?;
        self.move_tokens(ctx, from, to, amount, &ok)?;
        Ok(ok)
    }

    /// Replace the caller's allowance for `spender`.
    pub fn approve(
        &mut self,
        ctx: &mut CallContext<'_>,
        spender: Principal,
        input: &EncryptedInput,
    ) -> Result<()> {
        let amount = ctx.accept_input(input, self.address, APPROVE_SIGNATURE)?;
        self.approve_sealed(ctx, spender, amount)
    }

    pub fn approve_sealed(
        &mut self,
        ctx: &mut CallContext<'_>,
        spender: Principal,
        amount: SealedValue,
    ) -> Result<()> {
        if spender.is_zero() {
            return Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Spender,
                principal: spender,
            });
        }
        let owner = ctx.caller();
        let owner_value = ctx.encrypt_for_party(&amount, &owner)?;
        let spender_value = ctx.encrypt_for_party(&amount, &spender)?;
        self.allowances.insert((owner, spender), amount);
        ctx.emit(
            self.address,
            Event::Approval {
                owner,
                spender,
                owner_value,
                spender_value,
            },
        );
        Ok(())
    }

    /// Move an encrypted amount from `from` to `to` on the caller's allowance.
    pub fn transfer_from(
        &mut self,
        ctx: &mut CallContext<'_>,
        from: Principal,
        to: Principal,
        input: &EncryptedInput,
    ) -> Result<SealedValue> {
        let amount = ctx.accept_input(input, self.address, TRANSFER_FROM_SIGNATURE)?;
        self.transfer_from_sealed(ctx, from, to, &amount)
    }

    /// Moves iff both the allowance and the balance cover `amount`. A
    /// `u64::MAX` allowance is never decremented.
    pub fn transfer_from_sealed(
        &mut self,
        ctx: &mut CallContext<'_>,
        from: Principal,
        to: Principal,
        amount: &SealedValue,
    ) -> Result<SealedValue> {
        if from.is_zero() {
            return Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Sender,
                principal: from,
            });
        }
        if to.is_zero() {
            return Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Receiver,
                principal: to,
            });
        }
        let spender = ctx.caller();
        let backend = ctx.backend();
        let allowance = match self.allowances.get(&(from, spender)) {
            Some(value) => value.clone(),
            None => backend.seal(0)?,
        };
        let balance = self.balance_or_zero(backend, &from)?;
        let ok = backend.and(
            &backend.ge(&allowance, amount)?,
            &backend.ge(&balance, amount)?,
        )?;

        let moved = self.move_tokens(ctx, from, to, amount, &ok)?;

        let unlimited = backend.eq(&allowance, &backend.seal(u64::MAX)?)?;
        let decremented = backend.sub(&allowance, &moved)?;
        self.allowances.insert(
            (from, spender),
            backend.mux(&unlimited, &allowance, &decremented)?,
        );
        Ok(ok)
    }

    /// Move `mux(ok, amount, 0)` and emit the transfer. Returns what moved.
    fn move_tokens(
        &mut self,
        ctx: &mut CallContext<'_>,
        from: Principal,
        to: Principal,
        amount: &SealedValue,
        ok: &SealedValue,
    ) -> Result<SealedValue> {
        let backend = ctx.backend();
        let moved = backend.mux(ok, amount, &backend.seal(0)?)?;

        let from_balance = self.balance_or_zero(backend, &from)?;
        self.balances
            .insert(from, backend.sub(&from_balance, &moved)?);
        // Read after the debit so a self-transfer nets to zero.
        let to_balance = self.balance_or_zero(backend, &to)?;
        self.balances.insert(to, backend.add(&to_balance, &moved)?);

        let sender_value = ctx.encrypt_for_party(&moved, &from)?;
        let receiver_value = ctx.encrypt_for_party(&moved, &to)?;
        ctx.emit(
            self.address,
            Event::Transfer {
                from,
                to,
                sender_value,
                receiver_value,
            },
        );
        Ok(moved)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────────

    /// `account`'s balance, readable only by `account`.
    pub fn balance_of(
        &self,
        backend: &dyn ConfidentialBackend,
        account: &Principal,
    ) -> Result<UserCiphertext> {
        let balance = self.balance_or_zero(backend, account)?;
        Ok(backend.encrypt_for(&balance, account)?)
    }

    pub fn sealed_balance(&self, account: &Principal) -> Option<&SealedValue> {
        self.balances.get(account)
    }

    pub fn allowance(
        &self,
        backend: &dyn ConfidentialBackend,
        owner: &Principal,
        spender: &Principal,
    ) -> Result<AllowanceView> {
        let value = match self.allowances.get(&(*owner, *spender)) {
            Some(value) => value.clone(),
            None => backend.seal(0)?,
        };
        Ok(AllowanceView {
            owner_value: encrypt_for_party(backend, &value, owner)?,
            spender_value: encrypt_for_party(backend, &value, spender)?,
            value,
        })
    }

    /// Accounts that have ever held a balance.
    pub fn holders(&self) -> impl Iterator<Item = &Principal> {
        self.balances.keys()
    }

    fn balance_or_zero(
        &self,
        backend: &dyn ConfidentialBackend,
        account: &Principal,
    ) -> Result<SealedValue> {
        match self.balances.get(account) {
            Some(balance) => Ok(balance.clone()),
            None => Ok(backend.seal(0)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilgate_core::{Account, ClearBackend, InputBinding, Timestamp};

    struct Setup {
        backend: ClearBackend,
        owner: Account,
        alice: Account,
        token: PrivateToken,
    }

    fn now() -> Timestamp {
        Timestamp::from_secs(1_700_000_000)
    }

    fn setup() -> Setup {
        let owner = Account::from_seed([1; 32]);
        let alice = Account::from_seed([2; 32]);
        let address = Principal::derive_contract(&owner.principal(), "PrivateToken", 0);
        let token = PrivateToken::new(owner.principal(), address, TokenConfig::default()).unwrap();
        Setup {
            backend: ClearBackend::new(),
            owner,
            alice,
            token,
        }
    }

    fn input(s: &Setup, from: &Account, signature: &str, value: u64) -> EncryptedInput {
        let binding = InputBinding::new(from.principal(), s.token.address(), signature);
        s.backend.encrypt_input(from, value, &binding).unwrap()
    }

    fn balance(s: &Setup, account: &Account) -> u64 {
        let ct = s.token.balance_of(&s.backend, &account.principal()).unwrap();
        s.backend.decrypt_output(account, &ct).unwrap()
    }

    fn mint(s: &mut Setup, to: Principal, amount: u64) {
        let mut events = Vec::new();
        let mut ctx = CallContext::new(s.owner.principal(), now(), &s.backend, &mut events);
        s.token.mint(&mut ctx, to, amount).unwrap();
    }

    #[test]
    fn test_mint_and_metadata() {
        let mut s = setup();
        let owner = s.owner.principal();
        mint(&mut s, owner, 500);
        assert_eq!(s.token.total_supply(), 500);
        assert_eq!(balance(&s, &s.owner), 500);
        assert_eq!(s.token.decimals(), 6);
        assert_eq!(s.token.symbol(), "PTOK");
    }

    #[test]
    fn test_mint_is_owner_only() {
        let mut s = setup();
        let mut events = Vec::new();
        let mut ctx = CallContext::new(s.alice.principal(), now(), &s.backend, &mut events);
        assert!(matches!(
            s.token.mint(&mut ctx, s.alice.principal(), 1),
            Err(VeilError::PolicyDenied { .. })
        ));
    }

    #[test]
    fn test_mint_to_zero_and_overflow() {
        let mut s = setup();
        let owner = s.owner.principal();
        let mut events = Vec::new();
        let mut ctx = CallContext::new(owner, now(), &s.backend, &mut events);
        assert!(matches!(
            s.token.mint(&mut ctx, Principal::ZERO, 1),
            Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Receiver,
                ..
            })
        ));
        s.token.mint(&mut ctx, owner, u64::MAX).unwrap();
        assert!(matches!(
            s.token.mint(&mut ctx, owner, 1),
            Err(VeilError::SupplyOverflow)
        ));
        assert_eq!(s.token.total_supply(), u64::MAX);
    }

    #[test]
    fn test_burn_covered_and_uncovered() {
        let mut s = setup();
        let owner = s.owner.principal();
        mint(&mut s, owner, 100);

        let mut events = Vec::new();
        let mut ctx = CallContext::new(owner, now(), &s.backend, &mut events);
        assert!(s.token.burn(&mut ctx, owner, 40).unwrap());
        assert!(!s.token.burn(&mut ctx, owner, 61).unwrap());
        drop(ctx);

        assert_eq!(s.token.total_supply(), 60);
        assert_eq!(balance(&s, &s.owner), 60);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_transfer_moves_when_covered() {
        let mut s = setup();
        let owner = s.owner.principal();
        mint(&mut s, owner, 100);

        let amount = input(&s, &s.owner, TRANSFER_SIGNATURE, 30);
        let mut events = Vec::new();
        let mut ctx = CallContext::new(owner, now(), &s.backend, &mut events);
        let ok = s
            .token
            .transfer(&mut ctx, s.alice.principal(), &amount)
            .unwrap();
        assert_eq!(s.backend.reveal(&ok).unwrap(), 1);
        drop(ctx);

        assert_eq!(balance(&s, &s.owner), 70);
        assert_eq!(balance(&s, &s.alice), 30);
        match &events[0].event {
            Event::Transfer { sender_value, .. } => {
                let ct = sender_value.as_ref().unwrap();
                assert_eq!(s.backend.decrypt_output(&s.owner, ct).unwrap(), 30);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_uncovered_transfer_changes_nothing() {
        let mut s = setup();
        let owner = s.owner.principal();
        mint(&mut s, owner, 10);

        let amount = input(&s, &s.owner, TRANSFER_SIGNATURE, 11);
        let mut events = Vec::new();
        let mut ctx = CallContext::new(owner, now(), &s.backend, &mut events);
        let ok = s
            .token
            .transfer(&mut ctx, s.alice.principal(), &amount)
            .unwrap();
        assert_eq!(s.backend.reveal(&ok).unwrap(), 0);
        drop(ctx);

        assert_eq!(balance(&s, &s.owner), 10);
        assert_eq!(balance(&s, &s.alice), 0);
    }

    #[test]
    fn test_self_transfer_keeps_balance() {
        let mut s = setup();
        let owner = s.owner.principal();
        mint(&mut s, owner, 10);
        let amount = input(&s, &s.owner, TRANSFER_SIGNATURE, 4);
        let mut events = Vec::new();
        let mut ctx = CallContext::new(owner, now(), &s.backend, &mut events);
        s.token.transfer(&mut ctx, owner, &amount).unwrap();
        drop(ctx);
        assert_eq!(balance(&s, &s.owner), 10);
    }

    #[test]
    fn test_transfer_input_bound_to_selector() {
        let mut s = setup();
        let owner = s.owner.principal();
        mint(&mut s, owner, 10);
        let wrong = input(&s, &s.owner, APPROVE_SIGNATURE, 4);
        let mut events = Vec::new();
        let mut ctx = CallContext::new(owner, now(), &s.backend, &mut events);
        assert!(matches!(
            s.token.transfer(&mut ctx, s.alice.principal(), &wrong),
            Err(VeilError::Core(_))
        ));
    }

    #[test]
    fn test_transfer_from_decrements_allowance() {
        let mut s = setup();
        let owner = s.owner.principal();
        let alice = s.alice.principal();
        mint(&mut s, owner, 100);

        let approval = input(&s, &s.owner, APPROVE_SIGNATURE, 50);
        let mut events = Vec::new();
        let mut ctx = CallContext::new(owner, now(), &s.backend, &mut events);
        s.token.approve(&mut ctx, alice, &approval).unwrap();

        let amount = input(&s, &s.alice, TRANSFER_FROM_SIGNATURE, 20);
        let mut ctx = CallContext::new(alice, now(), &s.backend, &mut events);
        let ok = s.token.transfer_from(&mut ctx, owner, alice, &amount).unwrap();
        assert_eq!(s.backend.reveal(&ok).unwrap(), 1);

        let view = s.token.allowance(&s.backend, &owner, &alice).unwrap();
        assert_eq!(s.backend.reveal(&view.value).unwrap(), 30);
        let ct = view.spender_value.unwrap();
        assert_eq!(s.backend.decrypt_output(&s.alice, &ct).unwrap(), 30);

        // Over the remaining allowance: nothing moves.
        let amount = input(&s, &s.alice, TRANSFER_FROM_SIGNATURE, 31);
        let mut ctx = CallContext::new(alice, now(), &s.backend, &mut events);
        let ok = s.token.transfer_from(&mut ctx, owner, alice, &amount).unwrap();
        assert_eq!(s.backend.reveal(&ok).unwrap(), 0);
        assert_eq!(balance(&s, &s.alice), 20);
        assert_eq!(balance(&s, &s.owner), 80);
    }

    #[test]
    fn test_max_allowance_is_not_decremented() {
        let mut s = setup();
        let owner = s.owner.principal();
        let alice = s.alice.principal();
        mint(&mut s, owner, 100);

        let approval = input(&s, &s.owner, APPROVE_SIGNATURE, u64::MAX);
        let mut events = Vec::new();
        let mut ctx = CallContext::new(owner, now(), &s.backend, &mut events);
        s.token.approve(&mut ctx, alice, &approval).unwrap();

        let amount = input(&s, &s.alice, TRANSFER_FROM_SIGNATURE, 60);
        let mut ctx = CallContext::new(alice, now(), &s.backend, &mut events);
        s.token.transfer_from(&mut ctx, owner, alice, &amount).unwrap();

        let view = s.token.allowance(&s.backend, &owner, &alice).unwrap();
        assert_eq!(s.backend.reveal(&view.value).unwrap(), u64::MAX);
        assert_eq!(balance(&s, &s.alice), 60);
    }

    #[test]
    fn test_approve_zero_spender() {
        let mut s = setup();
        let mut events = Vec::new();
        let mut ctx = CallContext::new(s.owner.principal(), now(), &s.backend, &mut events);
        let amount = s.backend.seal(1).unwrap();
        assert!(matches!(
            s.token.approve_sealed(&mut ctx, Principal::ZERO, amount),
            Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Spender,
                ..
            })
        ));
    }
}
