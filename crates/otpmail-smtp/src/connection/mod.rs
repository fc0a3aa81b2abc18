//! Configuration, transports, and the async session driver.

mod client;
mod config;
mod stream;

pub use client::{Client, SendOutcome};
pub use config::{Config, ConfigBuilder, DEFAULT_CLIENT_HOSTNAME, DEFAULT_PORT};
pub use stream::{Connector, RustlsUpgrade, SmtpStream, TcpConnector, TlsUpgrade};
