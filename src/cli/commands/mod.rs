mod bootstrap;
mod config;
mod permissions;

pub use bootstrap::cmd_bootstrap;
pub use config::{cmd_check_config, cmd_init};
pub use permissions::cmd_permissions;
