//! Wallet management for the managed account pool
//!
//! Decodes supplied credentials and holds the in-memory account roster entries.

mod account;
mod credentials;

pub use account::{Account, AccountStatus};
pub use credentials::{decode_credential, decode_credentials, DecodedCredentials, KEYPAIR_LENGTH};
