//! # otpmail-core
//!
//! Caller-side logic for one-time-code email sign-in.
//!
//! This crate provides:
//! - SMTP and OTP settings resolved from the environment with defaults
//! - Code generation and the HTML email template
//! - A TTL code store
//! - The issuance service, which waits a bounded time for the email and
//!   reports the code as issued regardless

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod otp;
pub mod service;
pub mod settings;

pub use error::{Error, Result};
pub use otp::{CodeStore, MemoryCodeStore, generate_code, render_email};
pub use service::{EmailStatus, IssueReport, Mailer, OtpService};
pub use settings::{OtpSettings, SmtpSettings, TimeoutPolicy};
