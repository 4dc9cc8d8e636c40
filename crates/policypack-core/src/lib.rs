//! Policy pack distribution core.
//!
//! This crate packages local policy pack directories for publication, fetches
//! published packs back down, and places them on disk exactly once even when
//! several installers race for the same version. Installed packs get their
//! runtime dependencies bootstrapped before they are handed to the caller.

pub mod env;
pub mod error;
pub mod packs;

pub use env::{PackLayout, PolicyConfig, ToolCommands};
pub use error::{PolicyPackError, Result};
pub use packs::{
    Bootstrapper, CommandRunner, CommandSpec, HttpPolicyClient, InstallOutcome, Installer,
    LocalRegistry, Manifest, PackIdentity, PackMetadata, PolicyClient, PublishedPack, Publisher,
    RequiredPolicy, Runtime, SystemCommandRunner, install_path,
};
