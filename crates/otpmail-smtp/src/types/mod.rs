//! Core SMTP types.

mod address;
mod envelope;
mod reply;

pub use address::Address;
pub use envelope::{Credentials, Envelope};
pub use reply::{Reply, ReplyCode};
