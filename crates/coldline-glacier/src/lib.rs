//! Deep-archive cold tier for coldline.
//!
//! A cold-tier address has the form
//!
//! ```text
//! <scheme>://<id>:<secret>@<endpoint>:<bucket>/<vault>
//! ```
//!
//! [`GlacierArchiveFactory`] parses it, connects the warm tier at
//! `s3n://<id>:<secret>@<bucket>/<vault>` through a
//! [`StoreRegistry`](coldline_store::StoreRegistry), connects the vault
//! backend registered for `<scheme>`, and returns a [`GlacierArchive`]: an
//! [`ArchiveFileSystem`](coldline_store::ArchiveFileSystem) decorator that
//! also ships every archived bucket to the vault.
//!
//! Vault backends: [`LocalVaultConnector`] keeps archives on local disk and
//! [`S3VaultConnector`] keeps them in the address's S3 bucket.
//!
//! Secrets never appear in error messages, `Debug` or `Display` output.

pub mod archive;
pub mod client;
pub mod credentials;
pub mod error;
pub mod factory;

pub use archive::GlacierArchive;
pub use client::{
    DeepArchiveClient, LocalVaultClient, LocalVaultConnector, ObjectStoreVaultClient,
    S3VaultConnector, VaultConnector,
};
pub use credentials::{GlacierAddress, GlacierCredentials};
pub use error::{GlacierError, GlacierResult};
pub use factory::GlacierArchiveFactory;
