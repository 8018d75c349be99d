pub mod credential;
pub mod directory;
pub mod net;
pub mod registration;

// Re-export primary types.
pub use credential::{SinkIdentity, compute_credential, registration_id};
pub use directory::{Directory, DirectoryFuture, TcpDirectory};
pub use net::{advertised_address, get_hostname, get_local_ips};
pub use registration::{RegistrationLoop, RegistrationStats};

/// Errors for registration operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("directory service unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("cannot read key: {0}")]
    Key(#[from] std::io::Error),
}
