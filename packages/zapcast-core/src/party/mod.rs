//! Watch-party membership, sync, and the rendezvous transport.
//!
//! # Module Structure
//!
//! - `types` - Roster, shared-state, and chat-message types
//! - `transport` - `PartyTransport` trait and the HTTP implementation
//! - `engine` - `PartySyncEngine` host/member/roster loops

pub mod engine;
pub mod transport;
pub mod types;

pub use engine::PartySyncEngine;
pub use transport::{HttpPartyTransport, PartyTransport, PartyTransportError};
pub use types::{
    ChatMessage, PartyMember, PartyMembership, PartyRole, PartyStateSnapshot, PlaybackUpdate,
    MAX_MESSAGE_CHARS, MAX_USERNAME_CHARS,
};
