//! Per-account sell execution: quote, build, sign, broadcast

pub mod channels;
pub mod racer;
pub mod signer;
pub mod swap;
pub mod units;

pub use channels::{DirectChannel, RelayChannel};
pub use racer::{first_success, BroadcastChannel, BroadcastRacer, Confirmation};
pub use signer::{sign_transfer, SignedTransfer};
pub use swap::{JupiterClient, Quote, SwapVenue, UnsignedTransfer, WRAPPED_SOL_MINT};
pub use units::{from_base_units, to_base_units};
