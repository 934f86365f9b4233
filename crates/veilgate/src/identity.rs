//! The identity registry.
//!
//! Registrars write sealed attributes about onboarded subjects. Subjects
//! decide who may read each of their attributes. Reads are decided by the
//! subject's grant lists alone; the registry's policy governs only the
//! administrative operations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use veilgate_core::{EncryptedInput, Principal, SealedValue, UserCiphertext};
use veilgate_policy::{DataPrivacyFramework, PermissionRule};

use crate::config::RegistryConfig;
use crate::context::CallContext;
use crate::error::{PrincipalRole, Result, VeilError};
use crate::events::Event;

pub const OP_ADD_REGISTRAR: &str = "op_add_registrar";
pub const OP_REMOVE_REGISTRAR: &str = "op_remove_registrar";
pub const OP_ADD_DID: &str = "op_add_did";

/// Signature encrypted `set_identifier` inputs are bound to.
pub const SET_IDENTIFIER_SIGNATURE: &str = "setIdentifier(address,string,(uint256,bytes))";

/// One attribute of one subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    /// `None` until a registrar writes it.
    pub value: Option<SealedValue>,
    /// Principals other than the subject allowed to read it.
    pub granted_to: BTreeSet<Principal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRegistry {
    address: Principal,
    owner: Principal,
    config: RegistryConfig,
    policy: DataPrivacyFramework,
    registrars: BTreeMap<Principal, u8>,
    subjects: BTreeSet<Principal>,
    attributes: BTreeMap<Principal, BTreeMap<String, AttributeRecord>>,
}

impl IdentityRegistry {
    /// Deploy a registry administered by `owner`.
    pub fn new(owner: Principal, address: Principal, config: RegistryConfig) -> Result<Self> {
        let mut policy = DataPrivacyFramework::with_owner(owner)?;
        for op in [OP_ADD_REGISTRAR, OP_REMOVE_REGISTRAR, OP_ADD_DID] {
            policy.seed(PermissionRule::allow(owner, op))?;
        }
        Ok(Self {
            address,
            owner,
            config,
            policy,
            registrars: BTreeMap::new(),
            subjects: BTreeSet::new(),
            attributes: BTreeMap::new(),
        })
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

    pub fn set_permission(&mut self, ctx: &CallContext<'_>, rule: PermissionRule) -> Result<()> {
        self.policy.set_permission(&ctx.caller(), ctx.now(), rule)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────────────────

    /// Make `registrar` a registrar at `level`, replacing any previous level.
    pub fn add_registrar(&mut self, ctx: &CallContext<'_>, registrar: Principal, level: u8) -> Result<()> {
        self.policy.require(&ctx.caller(), OP_ADD_REGISTRAR, ctx.now())?;
        if registrar.is_zero() {
            return Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Registrar,
                principal: registrar,
            });
        }
        if level == 0 {
            return Err(VeilError::InvalidRegistrarLevel);
        }
        self.registrars.insert(registrar, level);
        Ok(())
    }

    pub fn remove_registrar(&mut self, ctx: &CallContext<'_>, registrar: Principal) -> Result<()> {
        self.policy.require(&ctx.caller(), OP_REMOVE_REGISTRAR, ctx.now())?;
        if self.registrars.remove(&registrar).is_none() {
            return Err(VeilError::NotRegistrar(registrar));
        }
        Ok(())
    }

    /// Onboard a subject. Onboarding twice is a no-op.
    pub fn add_did(&mut self, ctx: &CallContext<'_>, subject: Principal) -> Result<()> {
        self.policy.require(&ctx.caller(), OP_ADD_DID, ctx.now())?;
        if subject.is_zero() {
            return Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Subject,
                principal: subject,
            });
        }
        self.subjects.insert(subject);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Attributes
    // ─────────────────────────────────────────────────────────────────────────

    /// Write an attribute. The caller must be a registrar of sufficient level
    /// and the subject must be onboarded. Existing grants are kept.
    pub fn set_identifier(
        &mut self,
        ctx: &CallContext<'_>,
        subject: Principal,
        name: &str,
        input: &EncryptedInput,
    ) -> Result<()> {
        let registrar = ctx.caller();
        let level = *self
            .registrars
            .get(&registrar)
            .ok_or(VeilError::NotRegistrar(registrar))?;
        if level < self.config.min_registrar_level {
            return Err(VeilError::InsufficientRegistrarLevel {
                registrar,
                level,
                required: self.config.min_registrar_level,
            });
        }
        self.require_onboarded(subject)?;

        let value = ctx.accept_input(input, self.address, SET_IDENTIFIER_SIGNATURE)?;
        self.record_mut(subject, name).value = Some(value);
        Ok(())
    }

    /// Let `grantee` read the caller's attributes `names`. Additive.
    pub fn grant_access<N: AsRef<str>>(
        &mut self,
        ctx: &CallContext<'_>,
        grantee: Principal,
        names: &[N],
    ) -> Result<()> {
        let subject = ctx.caller();
        self.require_onboarded(subject)?;
        if grantee.is_zero() {
            return Err(VeilError::InvalidPrincipal {
                role: PrincipalRole::Grantee,
                principal: grantee,
            });
        }
        for name in names {
            self.record_mut(subject, name.as_ref())
                .granted_to
                .insert(grantee);
        }
        Ok(())
    }

    /// Withdraw `grantee`'s access to the caller's attributes `names`.
    pub fn revoke_access<N: AsRef<str>>(
        &mut self,
        ctx: &CallContext<'_>,
        grantee: Principal,
        names: &[N],
    ) -> Result<()> {
        let subject = ctx.caller();
        self.require_onboarded(subject)?;
        if let Some(records) = self.attributes.get_mut(&subject) {
            for name in names {
                if let Some(record) = records.get_mut(name.as_ref()) {
                    record.granted_to.remove(&grantee);
                }
            }
        }
        Ok(())
    }

    /// Read an attribute, re-encrypted for the caller.
    pub fn get_identifier(
        &self,
        ctx: &mut CallContext<'_>,
        subject: Principal,
        name: &str,
    ) -> Result<UserCiphertext> {
        let caller = ctx.caller();
        let record = self.attributes.get(&subject).and_then(|r| r.get(name));

        let permitted =
            caller == subject || record.is_some_and(|r| r.granted_to.contains(&caller));
        if !permitted {
            return Err(VeilError::AttributeAccessDenied {
                subject,
                name: name.to_string(),
            });
        }

        let value = record
            .and_then(|r| r.value.as_ref())
            .ok_or_else(|| VeilError::IdentifierNotSet {
                subject,
                name: name.to_string(),
            })?;
        let ciphertext = ctx.backend().encrypt_for(value, &caller)?;

        ctx.emit(
            self.address,
            Event::IdentifierDisclosed {
                caller,
                subject,
                name: name.to_string(),
                value: ciphertext.clone(),
            },
        );
        Ok(ciphertext)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────────

    pub fn registrar_level(&self, registrar: &Principal) -> Option<u8> {
        self.registrars.get(registrar).copied()
    }

    pub fn is_onboarded(&self, subject: &Principal) -> bool {
        self.subjects.contains(subject)
    }

    /// Who besides the subject may read an attribute.
    pub fn grantees(&self, subject: &Principal, name: &str) -> Vec<Principal> {
        self.attributes
            .get(subject)
            .and_then(|r| r.get(name))
            .map(|r| r.granted_to.iter().copied().collect())
            .unwrap_or_default()
    }

    fn require_onboarded(&self, subject: Principal) -> Result<()> {
        if self.subjects.contains(&subject) {
            Ok(())
        } else {
            Err(VeilError::NotOnboarded(subject))
        }
    }

    fn record_mut(&mut self, subject: Principal, name: &str) -> &mut AttributeRecord {
        self.attributes
            .entry(subject)
            .or_default()
            .entry(name.to_string())
            .or_default()
    }
}
