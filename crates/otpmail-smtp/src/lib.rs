//! # otpmail-smtp
//!
//! A single-purpose SMTP submission client for transactional one-time-code
//! mail, built around an explicit state machine.
//!
//! ## Features
//!
//! - **Explicit session state**: one enum, one transition table, no socket
//!   inside the protocol logic ([`session`])
//! - **In-place STARTTLS**: the open TCP stream is handed to rustls; nothing
//!   is written between the `220` go-ahead and the handshake
//! - **AUTH LOGIN**: base64 username and password in two round trips
//! - **Never throws**: every send resolves to a [`SendOutcome`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use otpmail_smtp::{Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> otpmail_smtp::Result<()> {
//!     let config = Config::builder("smtp.example.com")
//!         .credentials("mailer@example.com", "password")
//!         .build()?;
//!     let client = Client::new(config)?;
//!
//!     let outcome = client
//!         .send("attendee@example.org", "Your code", "<p>1234</p>", "1234")
//!         .await;
//!     println!("{}", outcome.is_success());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Configuration, transports, and the async driver
//! - [`message`]: DATA payload composition
//! - [`parser`]: Reply recognition over raw bytes
//! - [`session`]: The submission state machine
//! - [`types`]: Addresses, envelopes, credentials, replies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod message;
pub mod parser;
pub mod session;
pub mod types;

pub use connection::{Client, Config, ConfigBuilder, SendOutcome};
pub use error::{Error, Result};
pub use session::{ReplyPolicy, Session, SessionState, Step};
pub use types::{Address, Credentials, Envelope, Reply, ReplyCode};
