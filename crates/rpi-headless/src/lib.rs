pub mod boot;
pub mod config;
pub mod error;
pub mod executor;
pub mod firstrun;
pub mod hdmi;
pub mod log_sanitize;
pub mod modules;
pub mod patch;
pub mod secret;
pub mod status;
pub mod userconf;
pub mod util;
pub mod wifi;

pub use error::{Error, ErrorKind, Result};
