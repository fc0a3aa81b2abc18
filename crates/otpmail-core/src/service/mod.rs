//! Services that sit between callers and the SMTP driver.

pub mod mailer;
pub mod otp;

pub use mailer::Mailer;
pub use otp::{EmailStatus, IssueReport, OtpService};
