//! The sealed-bid auction.
//!
//! Bids are sealed token amounts escrowed with the auction through the
//! token's allowance mechanism. Nobody learns a bid in clear; the highest
//! bid is tracked with an encrypted max. After bidding ends the highest
//! bidder claims, the owner side settles to the beneficiary, and losing
//! bidders withdraw.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use veilgate_core::{EncryptedInput, Principal, SealedValue, Timestamp, UserCiphertext};
use veilgate_policy::{DataPrivacyFramework, PermissionRule};

use crate::config::{AuctionConfig, TokenConfig};
use crate::context::CallContext;
use crate::error::{PrincipalRole, Result, VeilError};
use crate::events::Event;
use crate::token::PrivateToken;

pub const OP_BID: &str = "op_bid";
pub const OP_GET_BID: &str = "op_get_bid";
pub const OP_STOP: &str = "op_stop";
pub const OP_DO_I_HAVE_HIGHEST_BID: &str = "op_do_i_have_highest_bid";
pub const OP_CLAIM: &str = "op_claim";
pub const OP_AUCTION_END: &str = "op_auction_end";
pub const OP_WITHDRAW: &str = "op_withdraw";

pub const BID_SIGNATURE: &str = "bid((uint256,bytes))";

/// Operations every principal may call.
const PUBLIC_OPERATIONS: [&str; 6] = [
    OP_BID,
    OP_GET_BID,
    OP_DO_I_HAVE_HIGHEST_BID,
    OP_CLAIM,
    OP_AUCTION_END,
    OP_WITHDRAW,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateAuction {
    address: Principal,
    owner: Principal,
    beneficiary: Principal,
    token: Principal,
    end_time: Timestamp,
    bid_counter: u64,
    bids: BTreeMap<Principal, SealedValue>,
    highest_bid: Option<SealedValue>,
    stoppable: bool,
    manually_stopped: bool,
    claimed: bool,
    winner: Option<Principal>,
    settled: bool,
    policy: DataPrivacyFramework,
}

impl PrivateAuction {
    /// Open an auction settled in `token`, accepting bids until
    /// `now + bidding_time_secs`.
    pub fn new(
        owner: Principal,
        address: Principal,
        beneficiary: Principal,
        token: Principal,
        config: &AuctionConfig,
        now: Timestamp,
    ) -> Result<Self> {
        if beneficiary.is_zero() {
            return Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Beneficiary,
                principal: beneficiary,
            });
        }
        let mut policy = DataPrivacyFramework::with_owner(owner)?;
        for op in PUBLIC_OPERATIONS {
            policy.seed(PermissionRule::allow(Principal::ALL, op))?;
        }
        policy.seed(PermissionRule::allow(owner, OP_STOP))?;

        Ok(Self {
            address,
            owner,
            beneficiary,
            token,
            end_time: now.saturating_add_secs(config.bidding_time_secs),
            bid_counter: 0,
            bids: BTreeMap::new(),
            highest_bid: None,
            stoppable: config.stoppable,
            manually_stopped: false,
            claimed: false,
            winner: None,
            settled: false,
            policy,
        })
    }

    pub fn address(&self) -> Principal {
        self.address
    }

    pub fn owner(&self) -> Principal {
        self.owner
    }

    pub fn beneficiary(&self) -> Principal {
        self.beneficiary
    }

    pub fn token(&self) -> Principal {
        self.token
    }

    pub fn end_time(&self) -> Timestamp {
        self.end_time
    }

    /// Number of distinct bidders.
    pub fn bid_counter(&self) -> u64 {
        self.bid_counter
    }

    pub fn winner(&self) -> Option<Principal> {
        self.winner
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn policy(&self) -> &DataPrivacyFramework {
        &self.policy
    }

    /// Bidding is open until the end time or a manual stop.
    pub fn is_open(&self, now: Timestamp) -> bool {
        now < self.end_time && !self.manually_stopped
    }

    pub fn set_permission(&mut self, ctx: &CallContext<'_>, rule: PermissionRule) -> Result<()> {
        self.policy.set_permission(&ctx.caller(), ctx.now(), rule)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bidding
    // ─────────────────────────────────────────────────────────────────────────

    /// Place or raise a bid. The bidder must have approved the auction on
    /// `token`. A repeat bid pulls only the increase over the existing bid;
    /// a lower repeat bid pulls nothing.
    pub fn bid(
        &mut self,
        ctx: &mut CallContext<'_>,
        token: &mut PrivateToken,
        input: &EncryptedInput,
    ) -> Result<()> {
        self.policy.require(&ctx.caller(), OP_BID, ctx.now())?;
        self.require_token(token)?;
        if !self.is_open(ctx.now()) {
            return Err(VeilError::AuctionEnded);
        }
        let bidder = ctx.caller();
        let amount = ctx.accept_input(input, self.address, BID_SIGNATURE)?;
        let backend = ctx.backend();
        let zero = backend.seal(0)?;

        let (existing, wanted) = match self.bids.get(&bidder) {
            Some(existing) => {
                let raises = backend.gt(&amount, existing)?;
                let increase = backend.sub(&amount, existing)?;
                (existing.clone(), backend.mux(&raises, &increase, &zero)?)
            }
            None => (zero.clone(), amount),
        };

        let ok = {
            let mut escrow = ctx.as_caller(self.address);
            token.transfer_from_sealed(&mut escrow, bidder, self.address, &wanted)?
        };
        let moved = backend.mux(&ok, &wanted, &zero)?;
        let bid = backend.add(&existing, &moved)?;

        let highest = match &self.highest_bid {
            Some(highest) => backend.max(highest, &bid)?,
            None => bid.clone(),
        };
        self.highest_bid = Some(highest);
        if self.bids.insert(bidder, bid).is_none() {
            self.bid_counter += 1;
        }
        Ok(())
    }

    /// The caller's bid, readable only by the caller.
    pub fn get_bid(&self, ctx: &CallContext<'_>) -> Result<UserCiphertext> {
        self.policy.require(&ctx.caller(), OP_GET_BID, ctx.now())?;
        let bidder = ctx.caller();
        let bid = self.bids.get(&bidder).ok_or(VeilError::NoBid(bidder))?;
        Ok(ctx.backend().encrypt_for(bid, &bidder)?)
    }

    /// End bidding early.
    pub fn stop(&mut self, ctx: &CallContext<'_>) -> Result<()> {
        self.policy.require(&ctx.caller(), OP_STOP, ctx.now())?;
        if !self.stoppable {
            return Err(VeilError::NotStoppable);
        }
        self.manually_stopped = true;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // After bidding
    // ─────────────────────────────────────────────────────────────────────────

    /// An encrypted 0/1 telling the caller whether their bid is the highest.
    /// Callers without a bid get an encrypted 0.
    pub fn do_i_have_highest_bid(&self, ctx: &mut CallContext<'_>) -> Result<UserCiphertext> {
        self.policy
            .require(&ctx.caller(), OP_DO_I_HAVE_HIGHEST_BID, ctx.now())?;
        self.require_ended(ctx.now())?;
        let caller = ctx.caller();
        let backend = ctx.backend();

        let answer = match (self.bids.get(&caller), &self.highest_bid) {
            (Some(bid), Some(highest)) => backend.eq(bid, highest)?,
            _ => backend.seal(0)?,
        };
        let value = backend.encrypt_for(&answer, &caller)?;
        ctx.emit(
            self.address,
            Event::HighestBidChecked {
                caller,
                value: value.clone(),
            },
        );
        Ok(value)
    }

    /// The highest bidder claims the auction. Only one claim succeeds.
    pub fn claim(&mut self, ctx: &mut CallContext<'_>) -> Result<()> {
        self.policy.require(&ctx.caller(), OP_CLAIM, ctx.now())?;
        self.require_ended(ctx.now())?;
        if self.claimed {
            return Err(VeilError::AlreadyClaimed);
        }
        let caller = ctx.caller();
        if !self.holds_highest_bid(ctx, &caller)? {
            return Err(VeilError::NotHighestBidder(caller));
        }
        self.claimed = true;
        self.winner = Some(caller);
        ctx.emit(self.address, Event::Winner { who: caller });
        Ok(())
    }

    /// Pay the highest bid to the beneficiary, once, after a claim.
    pub fn auction_end(&mut self, ctx: &mut CallContext<'_>, token: &mut PrivateToken) -> Result<()> {
        self.policy.require(&ctx.caller(), OP_AUCTION_END, ctx.now())?;
        self.require_token(token)?;
        self.require_ended(ctx.now())?;
        if !self.claimed {
            return Err(VeilError::NotClaimed);
        }
        if self.settled {
            return Err(VeilError::AlreadySettled);
        }
        if let Some(highest) = &self.highest_bid {
            let mut payer = ctx.as_caller(self.address);
            token.transfer_sealed(&mut payer, self.beneficiary, highest)?;
        }
        self.settled = true;
        Ok(())
    }

    /// Refund a losing bid. The highest-bid holder must wait for a claim.
    pub fn withdraw(&mut self, ctx: &mut CallContext<'_>, token: &mut PrivateToken) -> Result<()> {
        self.policy.require(&ctx.caller(), OP_WITHDRAW, ctx.now())?;
        self.require_token(token)?;
        self.require_ended(ctx.now())?;
        let caller = ctx.caller();
        if self.winner == Some(caller) {
            return Err(VeilError::WinnerCannotWithdraw);
        }
        let bid = self
            .bids
            .get(&caller)
            .cloned()
            .ok_or(VeilError::NoBid(caller))?;
        if !self.claimed && self.holds_highest_bid(ctx, &caller)? {
            return Err(VeilError::NotClaimed);
        }

        let mut refund = ctx.as_caller(self.address);
        token.transfer_sealed(&mut refund, caller, &bid)?;
        self.bids.remove(&caller);
        Ok(())
    }

    fn require_token(&self, token: &PrivateToken) -> Result<()> {
        if token.address() == self.token {
            Ok(())
        } else {
            Err(VeilError::WrongToken {
                expected: self.token,
                actual: token.address(),
            })
        }
    }

    fn require_ended(&self, now: Timestamp) -> Result<()> {
        if self.is_open(now) {
            Err(VeilError::AuctionNotEnded)
        } else {
            Ok(())
        }
    }

    fn holds_highest_bid(&self, ctx: &CallContext<'_>, bidder: &Principal) -> Result<bool> {
        let backend = ctx.backend();
        match (self.bids.get(bidder), &self.highest_bid) {
            (Some(bid), Some(highest)) => Ok(backend.reveal(&backend.eq(bid, highest)?)? != 0),
            (None, _) => Err(VeilError::NoBid(*bidder)),
            (Some(_), None) => Ok(false),
        }
    }
}

/// A token and an auction settled in it, deployed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionHouse {
    pub token: PrivateToken,
    pub auction: PrivateAuction,
}

impl AuctionHouse {
    /// Deploy a fresh token and an auction over it, both owned by `owner`.
    pub fn deploy(
        owner: Principal,
        token_config: TokenConfig,
        auction_config: &AuctionConfig,
        beneficiary: Principal,
        now: Timestamp,
    ) -> Result<Self> {
        let token_address = Principal::derive_contract(&owner, "PrivateToken", 0);
        let auction_address = Principal::derive_contract(&owner, "PrivateAuction", 1);
        let token = PrivateToken::new(owner, token_address, token_config)?;
        let auction = PrivateAuction::new(
            owner,
            auction_address,
            beneficiary,
            token_address,
            auction_config,
            now,
        )?;
        Ok(Self { token, auction })
    }

    pub fn bid(&mut self, ctx: &mut CallContext<'_>, input: &EncryptedInput) -> Result<()> {
        self.auction.bid(ctx, &mut self.token, input)
    }

    pub fn auction_end(&mut self, ctx: &mut CallContext<'_>) -> Result<()> {
        self.auction.auction_end(ctx, &mut self.token)
    }

    pub fn withdraw(&mut self, ctx: &mut CallContext<'_>) -> Result<()> {
        self.auction.withdraw(ctx, &mut self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::APPROVE_SIGNATURE;
    use veilgate_core::{
        Account, ClearBackend, ConfidentialBackend, CoreError, InputBinding, Op, X25519PublicKey,
    };

    const START: u64 = 1_700_000_000;
    const DAY: u64 = 60 * 60 * 24;

    struct Setup {
        backend: ClearBackend,
        owner: Account,
        bob: Account,
        house: AuctionHouse,
    }

    fn at(offset: u64) -> Timestamp {
        Timestamp::from_secs(START + offset)
    }

    /// Owner and bob each hold 1000 tokens and approve the auction for all
    /// of them.
    fn setup() -> Setup {
        let backend = ClearBackend::new();
        let owner = Account::from_seed([1; 32]);
        let bob = Account::from_seed([2; 32]);
        let mut house = AuctionHouse::deploy(
            owner.principal(),
            TokenConfig::default(),
            &AuctionConfig::default(),
            owner.principal(),
            at(0),
        )
        .unwrap();

        let mut events = Vec::new();
        let auction = house.auction.address();
        for account in [&owner, &bob] {
            let mut ctx = CallContext::new(owner.principal(), at(0), &backend, &mut events);
            house.token.mint(&mut ctx, account.principal(), 1000).unwrap();

            let binding =
                InputBinding::new(account.principal(), house.token.address(), APPROVE_SIGNATURE);
            let approval = backend.encrypt_input(account, 1000, &binding).unwrap();
            let mut ctx = CallContext::new(account.principal(), at(0), &backend, &mut events);
            house.token.approve(&mut ctx, auction, &approval).unwrap();
        }
        Setup {
            backend,
            owner,
            bob,
            house,
        }
    }

    fn bid(s: &mut Setup, who: &Account, amount: u64, offset: u64) -> Result<()> {
        let binding = InputBinding::new(who.principal(), s.house.auction.address(), BID_SIGNATURE);
        let input = s.backend.encrypt_input(who, amount, &binding).unwrap();
        let mut events = Vec::new();
        let mut ctx = CallContext::new(who.principal(), at(offset), &s.backend, &mut events);
        s.house.bid(&mut ctx, &input)
    }

    fn balance(s: &Setup, who: &Account) -> u64 {
        let ct = s.house.token.balance_of(&s.backend, &who.principal()).unwrap();
        s.backend.decrypt_output(who, &ct).unwrap()
    }

    fn my_bid(s: &Setup, who: &Account) -> u64 {
        let mut events = Vec::new();
        let ctx = CallContext::new(who.principal(), at(1), &s.backend, &mut events);
        let ct = s.house.auction.get_bid(&ctx).unwrap();
        s.backend.decrypt_output(who, &ct).unwrap()
    }

    #[test]
    fn test_raising_a_bid_pulls_only_the_increase() {
        let mut s = setup();
        let owner = s.owner.clone();
        bid(&mut s, &owner, 5, 1).unwrap();
        assert_eq!(balance(&s, &s.owner), 995);
        bid(&mut s, &owner, 10, 2).unwrap();
        assert_eq!(balance(&s, &s.owner), 990);
        assert_eq!(my_bid(&s, &s.owner), 10);

        // Lowering pulls nothing and keeps the bid.
        bid(&mut s, &owner, 3, 3).unwrap();
        assert_eq!(balance(&s, &s.owner), 990);
        assert_eq!(my_bid(&s, &s.owner), 10);
        assert_eq!(s.house.auction.bid_counter(), 1);
    }

    #[test]
    fn test_stop_then_highest_bid_check() {
        let mut s = setup();
        let owner = s.owner.clone();
        bid(&mut s, &owner, 5, 1).unwrap();
        bid(&mut s, &owner, 10, 2).unwrap();

        let mut events = Vec::new();
        let mut ctx = CallContext::new(owner.principal(), at(3), &s.backend, &mut events);
        assert!(matches!(
            s.house.auction.do_i_have_highest_bid(&mut ctx),
            Err(VeilError::AuctionNotEnded)
        ));
        s.house.auction.stop(&ctx).unwrap();
        let ct = s.house.auction.do_i_have_highest_bid(&mut ctx).unwrap();
        assert_eq!(s.backend.decrypt_output(&owner, &ct).unwrap(), 1);
        drop(ctx);
        assert_eq!(events.len(), 1);
        drop(events);

        assert!(matches!(bid(&mut s, &owner, 20, 4), Err(VeilError::AuctionEnded)));
    }

    #[test]
    fn test_stop_is_owner_only() {
        let s = setup();
        let mut auction = s.house.auction.clone();
        let mut events = Vec::new();
        let ctx = CallContext::new(s.bob.principal(), at(1), &s.backend, &mut events);
        assert!(matches!(
            auction.stop(&ctx),
            Err(VeilError::PolicyDenied { .. })
        ));
    }

    #[test]
    fn test_claim_settle_and_withdraw() {
        let mut s = setup();
        let owner = s.owner.clone();
        let bob = s.bob.clone();
        bid(&mut s, &owner, 50, 1).unwrap();
        bid(&mut s, &bob, 80, 2).unwrap();
        assert_eq!(s.house.auction.bid_counter(), 2);

        let end = DAY;
        let mut events = Vec::new();

        // Owner is not the highest bidder.
        let mut ctx = CallContext::new(owner.principal(), at(end), &s.backend, &mut events);
        assert!(matches!(
            s.house.auction.claim(&mut ctx),
            Err(VeilError::NotHighestBidder(_))
        ));
        assert!(matches!(
            s.house.auction_end(&mut ctx),
            Err(VeilError::NotClaimed)
        ));

        // Bob may not withdraw before claiming.
        let mut ctx = CallContext::new(bob.principal(), at(end), &s.backend, &mut events);
        assert!(matches!(s.house.withdraw(&mut ctx), Err(VeilError::NotClaimed)));
        s.house.auction.claim(&mut ctx).unwrap();
        assert_eq!(s.house.auction.winner(), Some(bob.principal()));
        assert!(matches!(
            s.house.auction.claim(&mut ctx),
            Err(VeilError::AlreadyClaimed)
        ));
        assert!(matches!(
            s.house.withdraw(&mut ctx),
            Err(VeilError::WinnerCannotWithdraw)
        ));

        s.house.auction_end(&mut ctx).unwrap();
        assert!(matches!(
            s.house.auction_end(&mut ctx),
            Err(VeilError::AlreadySettled)
        ));

        let mut ctx = CallContext::new(owner.principal(), at(end), &s.backend, &mut events);
        s.house.withdraw(&mut ctx).unwrap();
        assert!(matches!(s.house.withdraw(&mut ctx), Err(VeilError::NoBid(_))));
        drop(ctx);

        // Owner is also the beneficiary: refunded 50 and paid 80.
        assert_eq!(balance(&s, &owner), 1080);
        assert_eq!(balance(&s, &bob), 920);
        assert_eq!(s.house.token.total_supply(), 2000);
    }

    /// Clear backend whose `and` fails. A first bid reaches `and` only
    /// inside the token's escrow transfer.
    struct EscrowOutage(ClearBackend);

    impl ConfidentialBackend for EscrowOutage {
        fn encrypt_input(
            &self,
            account: &Account,
            value: u64,
            binding: &InputBinding,
        ) -> veilgate_core::Result<EncryptedInput> {
            self.0.encrypt_input(account, value, binding)
        }

        fn decrypt_output(
            &self,
            account: &Account,
            ciphertext: &UserCiphertext,
        ) -> veilgate_core::Result<u64> {
            self.0.decrypt_output(account, ciphertext)
        }

        fn register_account(&self, principal: Principal, key: X25519PublicKey) {
            self.0.register_account(principal, key)
        }

        fn validate_input(
            &self,
            input: &EncryptedInput,
            binding: &InputBinding,
        ) -> veilgate_core::Result<SealedValue> {
            self.0.validate_input(input, binding)
        }

        fn seal(&self, value: u64) -> veilgate_core::Result<SealedValue> {
            self.0.seal(value)
        }

        fn reveal(&self, value: &SealedValue) -> veilgate_core::Result<u64> {
            self.0.reveal(value)
        }

        fn encrypt_for(
            &self,
            value: &SealedValue,
            recipient: &Principal,
        ) -> veilgate_core::Result<UserCiphertext> {
            self.0.encrypt_for(value, recipient)
        }

        fn apply(&self, op: Op, operands: &[&SealedValue]) -> veilgate_core::Result<SealedValue> {
            if op == Op::And {
                return Err(CoreError::EncryptionError("network unavailable".into()));
            }
            self.0.apply(op, operands)
        }
    }

    #[test]
    fn test_failed_escrow_does_not_count_the_bidder() {
        let mut s = setup();
        let bob = s.bob.clone();
        let before = s.house.clone();

        let outage = EscrowOutage(ClearBackend::new());
        let binding = InputBinding::new(bob.principal(), s.house.auction.address(), BID_SIGNATURE);
        let input = outage.encrypt_input(&bob, 10, &binding).unwrap();
        let mut events = Vec::new();
        let mut ctx = CallContext::new(bob.principal(), at(1), &outage, &mut events);
        assert!(matches!(s.house.bid(&mut ctx, &input), Err(VeilError::Core(_))));
        drop(ctx);

        assert_eq!(s.house.auction.bid_counter(), 0);
        assert_eq!(s.house, before);
        assert!(events.is_empty());
    }

    #[test]
    fn test_foreign_token_is_rejected() {
        let mut s = setup();
        let owner = s.owner.clone();
        let foreign_address = Principal::derive_contract(&owner.principal(), "PrivateToken", 7);
        let mut foreign =
            PrivateToken::new(owner.principal(), foreign_address, TokenConfig::default()).unwrap();

        let binding = InputBinding::new(owner.principal(), s.house.auction.address(), BID_SIGNATURE);
        let input = s.backend.encrypt_input(&owner, 10, &binding).unwrap();
        let mut events = Vec::new();
        let mut ctx = CallContext::new(owner.principal(), at(1), &s.backend, &mut events);
        assert!(matches!(
            s.house.auction.bid(&mut ctx, &mut foreign, &input),
            Err(VeilError::WrongToken { actual, .. }) if actual == foreign_address
        ));
        assert_eq!(s.house.auction.bid_counter(), 0);

        let mut ctx = CallContext::new(owner.principal(), at(DAY), &s.backend, &mut events);
        assert!(matches!(
            s.house.auction.withdraw(&mut ctx, &mut foreign),
            Err(VeilError::WrongToken { .. })
        ));
        assert!(matches!(
            s.house.auction.auction_end(&mut ctx, &mut foreign),
            Err(VeilError::WrongToken { .. })
        ));
    }

    #[test]
    fn test_unapproved_bid_moves_nothing() {
        let mut s = setup();
        let carol = Account::from_seed([3; 32]);
        bid(&mut s, &carol, 10, 1).unwrap();

        let mut events = Vec::new();
        let ctx = CallContext::new(carol.principal(), at(1), &s.backend, &mut events);
        let ct = s.house.auction.get_bid(&ctx).unwrap();
        assert_eq!(s.backend.decrypt_output(&carol, &ct).unwrap(), 0);
    }

    #[test]
    fn test_zero_beneficiary_rejected() {
        let owner = Principal::from_bytes([1; 20]);
        assert!(matches!(
            AuctionHouse::deploy(
                owner,
                TokenConfig::default(),
                &AuctionConfig::default(),
                Principal::ZERO,
                at(0),
            ),
            Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Beneficiary,
                ..
            })
        ));
    }
}
