//! cloudbase-init-rs library
//!
//! The Windows OS configuration layer used during first-boot initialization
//! of a virtual machine instance: local accounts, static network
//! configuration, service control, sysprep completion, persisted
//! configuration values and host identity.
//!
//! # Design Principles
//!
//! - **Classified failures**: every native failure maps to one [`OsError`]
//!   variant; benign outcomes are ordinary results
//! - **Guaranteed release**: logon sessions and loaded profiles are owned
//!   guards
//! - **Bounded waits**: the sysprep wait has a deadline and can be cancelled
//! - **Native code at the edge**: components run against the traits in
//!   [`platform`], so they are tested against an in-memory host
//!
//! # Example
//! ```no_run
//! use cloudbase_init_rs::{OsConfig, OsUtils, Platform};
//!
//! # async fn run() -> Result<(), cloudbase_init_rs::OsError> {
//! let utils = OsUtils::new(&Platform::native()?, &OsConfig::default());
//! utils.boot.wait_for_completion().await?;
//! if !utils.accounts.exists("admin").await? {
//!     utils.accounts.create("admin", "S3cret!pass", false).await?;
//! }
//! utils.accounts.add_to_local_group("admin", "Administrators").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod escape;
pub mod osutils;
pub mod outcome;
pub mod platform;
pub mod process;
pub mod wql;

mod error;

pub use config::OsConfig;
pub use error::OsError;
pub use osutils::OsUtils;
pub use outcome::{ExecutionStatus, NativeOutcome, PluginOutcome};
pub use platform::Platform;
