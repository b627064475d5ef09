//! CDP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pieces shared by every CDP workspace member: the common error type and the
//! tracing setup used by the server and the ingest CLI.
//!
//! ```no_run
//! use cdp_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> cdp_common::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{CdpError, Result};
