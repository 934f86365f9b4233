//! The confidential key-value database.
//!
//! Values are sealed; every read and write is decided by the database's own
//! policy. Writes and encrypted reads use a rule's `string_parameter` as a
//! key constraint: an empty string covers every key.
//!
//! Clear reads are separate operations, one per item: revealing `price`
//! requires `op_get_clear_price`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use veilgate_core::{ConfidentialBackend, EncryptedInput, Principal, SealedValue, UserCiphertext};
use veilgate_policy::{DataPrivacyFramework, ParameterQuery, PermissionRule, OP_SET_PERMISSION};

use crate::context::CallContext;
use crate::error::{Result, VeilError};
use crate::events::{Disclosure, Event};

pub const OP_SET_ITEM: &str = "op_set_item";
pub const OP_GET_ITEM: &str = "op_get_item";

/// Signature encrypted `set_item` inputs are bound to.
pub const SET_ITEM_SIGNATURE: &str = "setItem(string,(uint256,bytes))";

pub const COTI_USD_PRICE: &str = "coti_usd_price";
pub const OIL_USD_PRICE: &str = "oil_usd_price";
pub const OIL_COTI_PRICE: &str = "oil_coti_price";

/// The clear-read operation for `item`.
pub fn clear_operation(item: &str) -> String {
    format!("op_get_clear_{item}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidentialDatabase {
    address: Principal,
    owner: Principal,
    policy: DataPrivacyFramework,
    items: BTreeMap<String, SealedValue>,
}

impl ConfidentialDatabase {
    /// Deploy an empty database.
    ///
    /// The owner may administer policy and write any key; nobody may read.
    pub fn new(owner: Principal, address: Principal) -> Result<Self> {
        let mut policy = DataPrivacyFramework::with_owner(owner)?;
        policy.seed(PermissionRule::allow(owner, OP_SET_ITEM))?;
        Ok(Self {
            address,
            owner,
            policy,
            items: BTreeMap::new(),
        })
    }

    /// Deploy the price database.
    ///
    /// Items: `coti_usd_price = 5`, `oil_usd_price = 100` and the derived
    /// `oil_coti_price`. Everyone may read everything, including clear reads,
    /// except that the owner may not reveal `oil_coti_price`. Only the owner
    /// may write or administer policy.
    pub fn deploy_prices(
        owner: Principal,
        address: Principal,
        backend: &dyn ConfidentialBackend,
    ) -> Result<Self> {
        let mut db = Self::new(owner, address)?;
        db.policy.seed(PermissionRule::allow(Principal::ALL, "*"))?;
        db.policy
            .seed(PermissionRule::deny(Principal::ALL, OP_SET_PERMISSION))?;
        db.policy.seed(PermissionRule::deny(Principal::ALL, OP_SET_ITEM))?;
        db.policy
            .seed(PermissionRule::deny(owner, clear_operation(OIL_COTI_PRICE)))?;

        let coti_usd = backend.seal(5)?;
        let oil_usd = backend.seal(100)?;
        let oil_coti = backend.div(&oil_usd, &coti_usd)?;
        db.items.insert(COTI_USD_PRICE.to_string(), coti_usd);
        db.items.insert(OIL_USD_PRICE.to_string(), oil_usd);
        db.items.insert(OIL_COTI_PRICE.to_string(), oil_coti);
        Ok(db)
    }

    pub fn address(&self) -> Principal {
        self.address
    }

    pub fn owner(&self) -> Principal {
        self.owner
    }

    pub fn policy(&self) -> &DataPrivacyFramework {
        &self.policy
    }

    /// Insert or replace a rule in this database's policy.
    pub fn set_permission(&mut self, ctx: &CallContext<'_>, rule: PermissionRule) -> Result<()> {
        self.policy.set_permission(&ctx.caller(), ctx.now(), rule)?;
        Ok(())
    }

    /// Store an encrypted value under `key`, replacing any previous value.
    pub fn set_item(&mut self, ctx: &CallContext<'_>, key: &str, input: &EncryptedInput) -> Result<()> {
        self.policy
            .require_with(&ctx.caller(), OP_SET_ITEM, &ParameterQuery::string(key), ctx.now())?;
        let value = ctx.accept_input(input, self.address, SET_ITEM_SIGNATURE)?;
        self.items.insert(key.to_string(), value);
        Ok(())
    }

    /// Read `key`, re-encrypted for the caller.
    pub fn get_item(&self, ctx: &mut CallContext<'_>, key: &str) -> Result<UserCiphertext> {
        self.policy
            .require_with(&ctx.caller(), OP_GET_ITEM, &ParameterQuery::string(key), ctx.now())?;
        let value = self.item(key)?;
        let ciphertext = ctx.backend().encrypt_for(value, &ctx.caller())?;

        let caller = ctx.caller();
        ctx.emit(
            self.address,
            Event::ItemDisclosed {
                caller,
                key: key.to_string(),
                value: Disclosure::Encrypted(ciphertext.clone()),
            },
        );
        Ok(ciphertext)
    }

    /// Reveal `item` in clear.
    pub fn get_clear(&self, ctx: &mut CallContext<'_>, item: &str) -> Result<u64> {
        self.policy
            .require(&ctx.caller(), &clear_operation(item), ctx.now())?;
        let value = ctx.backend().reveal(self.item(item)?)?;

        let caller = ctx.caller();
        ctx.emit(
            self.address,
            Event::ItemDisclosed {
                caller,
                key: item.to_string(),
                value: Disclosure::Clear(value),
            },
        );
        Ok(value)
    }

    pub fn get_clear_coti_usd_price(&self, ctx: &mut CallContext<'_>) -> Result<u64> {
        self.get_clear(ctx, COTI_USD_PRICE)
    }

    pub fn get_clear_oil_usd_price(&self, ctx: &mut CallContext<'_>) -> Result<u64> {
        self.get_clear(ctx, OIL_USD_PRICE)
    }

    pub fn get_clear_oil_coti_price(&self, ctx: &mut CallContext<'_>) -> Result<u64> {
        self.get_clear(ctx, OIL_COTI_PRICE)
    }

    /// Stored keys, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    fn item(&self, key: &str) -> Result<&SealedValue> {
        self.items
            .get(key)
            .ok_or_else(|| VeilError::ItemNotFound(key.to_string()))
    }
}
