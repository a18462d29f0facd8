//! Storage backends and the transactional archive filesystem for coldline.
//!
//! Two layers live here:
//!
//! - [`AddressableStore`] is the small capability set of one backing
//!   technology: copy, list, open, mkdirs, delete, atomic rename.
//! - [`ArchiveFileSystem`] is the contract the archiver and thawer consume.
//!   [`TransactionalArchive`] implements it on top of any store with a
//!   stage-then-rename protocol.
//!
//! # Backends
//!
//! - [`LocalFileStore`] -- maps URI paths under a local root directory
//! - [`InMemoryStore`] -- `BTreeMap`-based tree for tests and embedding
//! - [`ObjectStoreBackend`] -- any `object_store` client; [`S3Connector`]
//!   wires `s3n://` and `s3://` URIs to S3
//!
//! [`StoreRegistry`] picks a backend by URI scheme.
//!
//! # Design Rules
//!
//! 1. Never overwrite: an occupied destination is `AlreadyExists`.
//! 2. Stage, then rename: a destination is absent or complete.
//! 3. A crash leaves garbage only under the staging root.
//! 4. Transport errors propagate unchanged; no layer here retries.
//! 5. The store never interprets bucket contents.

pub mod archive;
pub mod error;
pub mod local;
pub mod memory;
pub mod object;
pub mod registry;
pub mod traits;
pub mod transactional;
pub mod uri;

pub use archive::ArchiveFileSystem;
pub use error::{StoreError, StoreResult};
pub use local::{copy_tree, LocalFileStore};
pub use memory::InMemoryStore;
pub use object::{blocking_runtime, ObjectBridge, ObjectStoreBackend, S3Connector, S3Options};
pub use registry::{LocalConnector, StoreConnector, StoreRegistry};
pub use traits::{AddressableStore, ByteStream};
pub use transactional::TransactionalArchive;
