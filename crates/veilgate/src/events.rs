//! Observable events.
//!
//! Every authorized disclosure of a confidential value produces an event
//! naming the caller and carrying the value, either re-encrypted for the
//! caller or already clear.

use serde::{Deserialize, Serialize};

use veilgate_core::{Principal, UserCiphertext};

/// A disclosed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disclosure {
    /// Readable only by the caller.
    Encrypted(UserCiphertext),
    /// Revealed to everyone.
    Clear(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A database item was read.
    ItemDisclosed {
        caller: Principal,
        key: String,
        value: Disclosure,
    },

    /// An identity attribute was read.
    IdentifierDisclosed {
        caller: Principal,
        subject: Principal,
        name: String,
        value: UserCiphertext,
    },

    /// Tokens moved. Amounts are encrypted for each party that has a
    /// registered key; contracts and the zero address get `None`.
    Transfer {
        from: Principal,
        to: Principal,
        sender_value: Option<UserCiphertext>,
        receiver_value: Option<UserCiphertext>,
    },

    /// An allowance was replaced.
    Approval {
        owner: Principal,
        spender: Principal,
        owner_value: Option<UserCiphertext>,
        spender_value: Option<UserCiphertext>,
    },

    /// Answer to "do I have the highest bid", as an encrypted 0/1.
    HighestBidChecked {
        caller: Principal,
        value: UserCiphertext,
    },

    /// The highest bidder claimed the auction.
    Winner { who: Principal },
}

/// An event together with where and when it was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Height of the commit that published the event; zero until committed.
    pub height: u64,
    /// The contract that emitted the event.
    pub contract: Principal,
    pub event: Event,
}
