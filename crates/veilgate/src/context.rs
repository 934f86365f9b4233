//! The per-call execution context.

use veilgate_core::{
    ConfidentialBackend, CoreError, EncryptedInput, InputBinding, Principal, SealedValue,
    Timestamp, UserCiphertext,
};

use crate::error::Result;
use crate::events::{Event, EventRecord};

/// Who is calling, when, and where events go.
///
/// The timestamp is read once per call. Contracts calling other contracts
/// use [`CallContext::as_caller`]; the nested context shares the time, the
/// backend and the event buffer.
pub struct CallContext<'a> {
    caller: Principal,
    now: Timestamp,
    backend: &'a dyn ConfidentialBackend,
    events: &'a mut Vec<EventRecord>,
}

impl<'a> CallContext<'a> {
    pub fn new(
        caller: Principal,
        now: Timestamp,
        backend: &'a dyn ConfidentialBackend,
        events: &'a mut Vec<EventRecord>,
    ) -> Self {
        Self {
            caller,
            now,
            backend,
            events,
        }
    }

    pub fn caller(&self) -> Principal {
        self.caller
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn backend(&self) -> &'a dyn ConfidentialBackend {
        self.backend
    }

    /// A context for a call made by `caller` (typically a contract address)
    /// during this call.
    pub fn as_caller(&mut self, caller: Principal) -> CallContext<'_> {
        CallContext {
            caller,
            now: self.now,
            backend: self.backend,
            events: &mut *self.events,
        }
    }

    /// Record an event emitted by `contract`.
    pub fn emit(&mut self, contract: Principal, event: Event) {
        self.events.push(EventRecord {
            height: 0,
            contract,
            event,
        });
    }

    /// Validate an input the caller bound to `contract` and `signature`.
    pub fn accept_input(
        &self,
        input: &EncryptedInput,
        contract: Principal,
        signature: &str,
    ) -> Result<SealedValue> {
        let binding = InputBinding::new(self.caller, contract, signature);
        Ok(self.backend.validate_input(input, &binding)?)
    }

    /// Re-encrypt for `party`, or `None` if `party` has no registered key.
    pub fn encrypt_for_party(
        &self,
        value: &SealedValue,
        party: &Principal,
    ) -> Result<Option<UserCiphertext>> {
        encrypt_for_party(self.backend, value, party)
    }
}

pub(crate) fn encrypt_for_party(
    backend: &dyn ConfidentialBackend,
    value: &SealedValue,
    party: &Principal,
) -> Result<Option<UserCiphertext>> {
    if party.is_zero() {
        return Ok(None);
    }
    match backend.encrypt_for(value, party) {
        Ok(ciphertext) => Ok(Some(ciphertext)),
        Err(CoreError::UnknownAccount(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl std::fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("caller", &self.caller)
            .field("now", &self.now)
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilgate_core::{ClearBackend, SealedBackend};

    #[test]
    fn test_nested_context_shares_event_buffer() {
        let backend = ClearBackend::new();
        let mut events = Vec::new();
        let alice = Principal::from_bytes([1; 20]);
        let contract = Principal::from_bytes([2; 20]);
        {
            let mut ctx = CallContext::new(alice, Timestamp::from_secs(5), &backend, &mut events);
            {
                let mut nested = ctx.as_caller(contract);
                assert_eq!(nested.caller(), contract);
                assert_eq!(nested.now(), Timestamp::from_secs(5));
                nested.emit(contract, Event::Winner { who: alice });
            }
            ctx.emit(alice, Event::Winner { who: contract });
        }
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].contract, contract);
    }

    #[test]
    fn test_encrypt_for_unregistered_party_is_none() {
        let backend = SealedBackend::generate();
        let mut events = Vec::new();
        let ctx = CallContext::new(
            Principal::from_bytes([1; 20]),
            Timestamp::ZERO,
            &backend,
            &mut events,
        );
        let value = backend.seal(3).unwrap();
        assert!(ctx
            .encrypt_for_party(&value, &Principal::from_bytes([9; 20]))
            .unwrap()
            .is_none());
        assert!(ctx.encrypt_for_party(&value, &Principal::ZERO).unwrap().is_none());
    }
}
