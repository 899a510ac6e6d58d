pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod job;
pub mod protocol;
pub mod session;
pub mod transfer;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::LpdClient;
pub use config::{ClientConfig, DEFAULT_PORT, ErrorMode};
pub use error::{LpdError, Result};
pub use identity::{FixedIdentity, Identity, SystemIdentity};
pub use job::{ControlFields, Job, JobKey, PrintMode, Symlink, TextOptions, TroffFont};
pub use protocol::QueueFormat;
pub use session::{Mode, Operation, Session};
pub use transfer::Transfer;
pub use transport::{Connector, SourcePortPolicy, TcpConnector, TcpTransport, Transport};
