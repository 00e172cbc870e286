mod changes;
mod confirm;
mod registry;
mod review;
mod sidebar;
mod types;

pub use changes::*;
pub use confirm::*;
pub use registry::*;
pub use review::*;
pub use sidebar::*;
pub use types::*;
