//! Test fixtures and helpers.
//!
//! A [`TestNetwork`] is a deterministic encrypting backend, a manual clock
//! and a handful of registered accounts, plus shortcuts for deploying each
//! contract into a [`Runtime`].

use std::sync::Arc;

use veilgate::{
    AuctionConfig, AuctionHouse, ConfidentialDatabase, IdentityRegistry, RegistryConfig, Runtime,
    RuntimeConfig, TokenConfig,
};
use veilgate_core::{
    Account, ConfidentialBackend, EncryptedInput, InputBinding, ManualClock, Principal,
    SealedBackend, Timestamp, UserCiphertext,
};
use veilgate_store::SnapshotStore;

/// The time every fixture network starts at.
pub const GENESIS: Timestamp = Timestamp::from_secs(1_700_000_000);

/// A deterministic account. Different `n` give different accounts.
pub fn account(n: u8) -> Account {
    let mut seed = [0u8; 32];
    seed[0] = n;
    seed[31] = 0xa5;
    Account::from_seed(seed)
}

/// `count` distinct deterministic accounts.
pub fn accounts(count: u8) -> Vec<Account> {
    (1..=count).map(account).collect()
}

pub struct TestNetwork {
    pub backend: Arc<SealedBackend>,
    pub clock: Arc<ManualClock>,
    pub owner: Account,
    pub alice: Account,
    pub bob: Account,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self::with_seed([0x42; 32])
    }

    pub fn with_seed(seed: [u8; 32]) -> Self {
        let network = Self {
            backend: Arc::new(SealedBackend::from_seed(seed)),
            clock: Arc::new(ManualClock::new(GENESIS)),
            owner: account(1),
            alice: account(2),
            bob: account(3),
        };
        for account in [&network.owner, &network.alice, &network.bob] {
            network.register(account);
        }
        network
    }

    pub fn register(&self, account: &Account) {
        self.backend
            .register_account(account.principal(), account.encryption_public());
    }

    pub fn now(&self) -> Timestamp {
        use veilgate_core::Clock;
        self.clock.now()
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(secs);
    }

    /// Encrypt `value` as `account`'s input to `signature` on `contract`.
    pub fn input(
        &self,
        account: &Account,
        value: u64,
        contract: Principal,
        signature: &str,
    ) -> EncryptedInput {
        let binding = InputBinding::new(account.principal(), contract, signature);
        self.backend
            .encrypt_input(account, value, &binding)
            .expect("encrypting a fixture input")
    }

    pub fn decrypt(&self, account: &Account, ciphertext: &UserCiphertext) -> u64 {
        self.backend
            .decrypt_output(account, ciphertext)
            .expect("decrypting a fixture output")
    }

    /// Host `state` in a runtime on this network without persistence.
    pub fn runtime<S>(&self, state: S, namespace: &str) -> Runtime<S>
    where
        S: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        Runtime::new(
            state,
            RuntimeConfig::with_namespace(namespace),
            self.backend.clone(),
            self.clock.clone(),
        )
    }

    /// Host `state` in a runtime persisting every call to `store`.
    pub fn persistent_runtime<S>(
        &self,
        state: S,
        namespace: &str,
        store: Arc<dyn SnapshotStore>,
    ) -> Runtime<S>
    where
        S: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        Runtime::with_store(
            state,
            RuntimeConfig::with_namespace(namespace),
            self.backend.clone(),
            self.clock.clone(),
            store,
        )
    }

    /// Rebuild the runtime persisted under `namespace` in `store`.
    pub async fn restore<S>(&self, namespace: &str, store: Arc<dyn SnapshotStore>) -> Runtime<S>
    where
        S: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        Runtime::restore(
            RuntimeConfig::with_namespace(namespace),
            self.backend.clone(),
            self.clock.clone(),
            store,
        )
        .await
        .expect("restoring a persisted runtime")
    }

    /// The price database, owned by `owner`.
    pub fn deploy_prices(&self) -> Runtime<ConfidentialDatabase> {
        let address = Principal::derive_contract(&self.owner.principal(), "OnChainDatabase", 0);
        let db = ConfidentialDatabase::deploy_prices(
            self.owner.principal(),
            address,
            self.backend.as_ref(),
        )
        .expect("deploying the price database");
        self.runtime(db, "prices")
    }

    /// An identity registry owned by `owner`, who is not yet a registrar.
    pub fn registry(&self) -> IdentityRegistry {
        let address =
            Principal::derive_contract(&self.owner.principal(), "PrivateIdentityRegistry", 0);
        IdentityRegistry::new(self.owner.principal(), address, RegistryConfig::default())
            .expect("deploying the identity registry")
    }

    /// [`TestNetwork::registry`] in a runtime without persistence.
    pub fn deploy_registry(&self) -> Runtime<IdentityRegistry> {
        self.runtime(self.registry(), "identity")
    }

    /// A token and auction owned by `owner`, paying out to `owner`.
    pub fn deploy_auction(&self, config: &AuctionConfig) -> Runtime<AuctionHouse> {
        let house = AuctionHouse::deploy(
            self.owner.principal(),
            TokenConfig::default(),
            config,
            self.owner.principal(),
            self.now(),
        )
        .expect("deploying the auction house");
        self.runtime(house, "auction")
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}
