//! Core data types: market/message enums, the message envelope and
//! subscriptions.

pub mod enums;
pub mod message;

pub use enums::*;
pub use message::*;
