use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use coldline_store::{ObjectBridge, S3Options, StoreError};
use object_store::path::Path as ObjectPath;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::credentials::GlacierCredentials;
use crate::error::{GlacierError, GlacierResult};

/// Upload/download/delete against a deep-archive service.
///
/// Archives are opaque files addressed by `(vault, archive_id)`. Calls
/// block for as long as the service takes; the client never retries.
pub trait DeepArchiveClient: Send + Sync {
    /// Store `file` under `archive_id`, replacing any earlier archive with
    /// that id.
    fn upload(&self, vault: &str, archive_id: &str, file: &Path) -> GlacierResult<()>;

    /// Write the archive to `dest`. A missing archive is
    /// [`StoreError::NotFound`](coldline_store::StoreError::NotFound).
    fn download(&self, vault: &str, archive_id: &str, dest: &Path) -> GlacierResult<()>;

    /// Remove the archive. Returns `true` if it existed.
    fn delete(&self, vault: &str, archive_id: &str) -> GlacierResult<bool>;
}

/// Builds a vault client authenticated with parsed credentials.
pub trait VaultConnector: Send + Sync {
    fn connect(
        &self,
        credentials: &GlacierCredentials,
    ) -> GlacierResult<Arc<dyn DeepArchiveClient>>;
}

impl<F> VaultConnector for F
where
    F: Fn(&GlacierCredentials) -> GlacierResult<Arc<dyn DeepArchiveClient>> + Send + Sync,
{
    fn connect(
        &self,
        credentials: &GlacierCredentials,
    ) -> GlacierResult<Arc<dyn DeepArchiveClient>> {
        self(credentials)
    }
}

/// Path segments of an archive: the vault's, then the archive id's.
fn archive_parts<'a>(vault: &'a str, archive_id: &'a str) -> GlacierResult<Vec<&'a str>> {
    let relative = archive_id.trim_start_matches('/');
    let safe = |p: &Path| {
        p.components().next().is_some()
            && p.components().all(|c| matches!(c, Component::Normal(_)))
    };
    if !safe(Path::new(vault)) || !safe(Path::new(relative)) {
        return Err(GlacierError::vault(
            vault,
            format!("archive id {archive_id:?} does not name a file in the vault"),
        ));
    }
    Ok(vault
        .split('/')
        .chain(relative.split('/'))
        .filter(|part| !part.is_empty())
        .collect())
}

/// Vault backend on local disk: archives live under `<root>/<vault>/`.
#[derive(Clone, Debug)]
pub struct LocalVaultClient {
    root: PathBuf,
}

impl LocalVaultClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `archive_id` in `vault`.
    pub fn archive_path(&self, vault: &str, archive_id: &str) -> GlacierResult<PathBuf> {
        let parts = archive_parts(vault, archive_id)?;
        Ok(self.root.join(parts.iter().collect::<PathBuf>()))
    }

    pub fn contains(&self, vault: &str, archive_id: &str) -> GlacierResult<bool> {
        Ok(self.archive_path(vault, archive_id)?.is_file())
    }
}

impl DeepArchiveClient for LocalVaultClient {
    fn upload(&self, vault: &str, archive_id: &str, file: &Path) -> GlacierResult<()> {
        let target = self.archive_path(vault, archive_id)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut partial = target.clone().into_os_string();
        partial.push(".part");
        fs::copy(file, &partial)?;
        fs::rename(&partial, &target)?;
        debug!(vault, archive_id, "uploaded archive");
        Ok(())
    }

    fn download(&self, vault: &str, archive_id: &str, dest: &Path) -> GlacierResult<()> {
        let source = self.archive_path(vault, archive_id)?;
        if !source.is_file() {
            let missing = format!("{vault}:{archive_id}");
            return Err(StoreError::NotFound(missing).into());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source, dest)?;
        debug!(vault, archive_id, "downloaded archive");
        Ok(())
    }

    fn delete(&self, vault: &str, archive_id: &str) -> GlacierResult<bool> {
        let path = self.archive_path(vault, archive_id)?;
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        debug!(vault, archive_id, "deleted archive");
        Ok(true)
    }
}

/// Connects every address to a [`LocalVaultClient`] rooted at
/// `<root>/<endpoint>`.
#[derive(Clone, Debug)]
pub struct LocalVaultConnector {
    root: PathBuf,
}

impl LocalVaultConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl VaultConnector for LocalVaultConnector {
    fn connect(
        &self,
        credentials: &GlacierCredentials,
    ) -> GlacierResult<Arc<dyn DeepArchiveClient>> {
        Ok(Arc::new(LocalVaultClient::new(
            self.root.join(credentials.endpoint()),
        )))
    }
}

/// Vault backend on an object store: archive `ID` of vault `V` is the
/// object `V/ID`.
#[derive(Clone, Debug)]
pub struct ObjectStoreVaultClient {
    bridge: ObjectBridge,
}

impl ObjectStoreVaultClient {
    pub fn new(bridge: ObjectBridge) -> Self {
        Self { bridge }
    }

    pub fn archive_key(&self, vault: &str, archive_id: &str) -> GlacierResult<ObjectPath> {
        Ok(ObjectPath::from_iter(archive_parts(vault, archive_id)?))
    }
}

impl DeepArchiveClient for ObjectStoreVaultClient {
    fn upload(&self, vault: &str, archive_id: &str, file: &Path) -> GlacierResult<()> {
        self.bridge
            .upload_file(file, &self.archive_key(vault, archive_id)?)?;
        debug!(vault, archive_id, "uploaded archive");
        Ok(())
    }

    fn download(&self, vault: &str, archive_id: &str, dest: &Path) -> GlacierResult<()> {
        let key = self.archive_key(vault, archive_id)?;
        if !self.bridge.is_object(&key)? {
            let missing = format!("{vault}:{archive_id}");
            return Err(StoreError::NotFound(missing).into());
        }
        self.bridge.download_file(&key, dest)?;
        debug!(vault, archive_id, "downloaded archive");
        Ok(())
    }

    fn delete(&self, vault: &str, archive_id: &str) -> GlacierResult<bool> {
        let key = self.archive_key(vault, archive_id)?;
        if !self.bridge.is_object(&key)? {
            return Ok(false);
        }
        self.bridge.delete(&key)?;
        debug!(vault, archive_id, "deleted archive");
        Ok(true)
    }
}

/// Connects addresses to vaults kept in the address's S3 bucket.
///
/// The address `ENDPOINT` is the region unless [`S3Options`] sets one.
#[derive(Clone, Debug)]
pub struct S3VaultConnector {
    options: S3Options,
    runtime: Arc<Runtime>,
}

impl S3VaultConnector {
    pub fn new(options: S3Options, runtime: Arc<Runtime>) -> Self {
        Self { options, runtime }
    }
}

impl VaultConnector for S3VaultConnector {
    fn connect(
        &self,
        credentials: &GlacierCredentials,
    ) -> GlacierResult<Arc<dyn DeepArchiveClient>> {
        let mut options = self.options.clone();
        if options.region.is_none() {
            options.region = Some(credentials.endpoint().to_string());
        }
        let store = options.open(
            credentials.bucket(),
            Some((credentials.id(), credentials.secret())),
        )?;
        Ok(Arc::new(ObjectStoreVaultClient::new(ObjectBridge::new(
            store,
            Arc::clone(&self.runtime),
        ))))
    }
}
