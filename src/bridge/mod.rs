//! In-process WebSocket server speaking the Amp IDE protocol, so agent CLIs
//! running in session terminals can read and edit workspace files.

mod lockfile;
mod protocol;
mod server;

pub use lockfile::resolve_data_home;
pub use server::{BridgeHandle, BridgeOptions, generate_auth_token, start_bridge};
