// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed identifiers for every persisted entity.
//!
//! Cross-entity references are always id lookups; ownership of rows is unidirectional from
//! container to child.

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(inner: u64) -> Self {
                Self(inner)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl core::str::FromStr for $name {
            type Err = core::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

entity_id!(
    /// Identifier of a [`crate::entity::User`].
    UserId
);
entity_id!(
    /// Identifier of an [`crate::entity::Event`].
    EventId
);
entity_id!(
    /// Identifier of a [`crate::entity::Participant`].
    ParticipantId
);
entity_id!(
    /// Identifier of an [`crate::entity::Invite`].
    InviteId
);
entity_id!(
    /// Identifier of a [`crate::entity::TaskList`].
    TaskListId
);
entity_id!(
    /// Identifier of a [`crate::entity::Task`].
    TaskId
);
entity_id!(
    /// Identifier of a [`crate::entity::Poll`].
    PollId
);
entity_id!(
    /// Identifier of a [`crate::entity::PollOption`].
    PollOptionId
);
entity_id!(
    /// Identifier of a [`crate::entity::Vote`].
    VoteId
);
entity_id!(
    /// Identifier of a [`crate::entity::Message`].
    MessageId
);
