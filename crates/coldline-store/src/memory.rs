use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::RwLock;

use url::Url;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::{AddressableStore, ByteStream};
use crate::uri;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// In-memory, path-tree store.
///
/// Intended for tests. Like [`LocalFileStore`](crate::LocalFileStore) it
/// keys entries by URI path only. The whole tree sits behind one `RwLock`,
/// which also makes `rename` trivially atomic.
pub struct InMemoryStore {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Number of files currently stored.
    pub fn file_count(&self) -> usize {
        self.nodes
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|n| matches!(n, Node::File(_)))
            .count()
    }

    /// Contents of the file at `uri`, if it is a file.
    pub fn read_file(&self, uri: &Url) -> Option<Vec<u8>> {
        match self.nodes.read().expect("lock poisoned").get(&key(uri)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// Store `data` as a file at `uri`, creating parents.
    pub fn write_file(&self, uri: &Url, data: impl Into<Vec<u8>>) {
        let mut nodes = self.nodes.write().expect("lock poisoned");
        let path = key(uri);
        insert_ancestors(&mut nodes, &path);
        nodes.insert(path, Node::File(data.into()));
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn key(uri: &Url) -> String {
    uri::normalized_path(uri)
}

fn parent_key(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(i) => Some(path[..i].to_string()),
        None => None,
    }
}

fn insert_ancestors(nodes: &mut BTreeMap<String, Node>, path: &str) {
    let mut current = parent_key(path);
    while let Some(dir) = current {
        current = parent_key(&dir);
        nodes.entry(dir).or_insert(Node::Dir);
    }
}

/// Keys strictly below `path` in the tree.
fn descendants<'a>(
    nodes: &'a BTreeMap<String, Node>,
    path: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Node)> + 'a {
    let prefix = if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    };
    nodes
        .range(prefix.clone()..)
        .take_while(move |(k, _)| k.starts_with(&prefix))
        .filter(move |(k, _)| k.as_str() != path)
}

fn join_key(base: &str, rel: &str) -> String {
    if rel.is_empty() {
        base.to_string()
    } else if base == "/" {
        format!("/{rel}")
    } else {
        format!("{base}/{rel}")
    }
}

impl AddressableStore for InMemoryStore {
    fn copy_local_to_remote(&self, local: &Path, remote: &Url) -> StoreResult<()> {
        if !local.exists() {
            return Err(StoreError::not_found_path(local));
        }
        let base = key(remote);

        let mut staged = Vec::new();
        for entry in WalkDir::new(local).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let rel = entry
                .path()
                .strip_prefix(local)
                .map_err(|e| StoreError::Transport(e.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            let node = if entry.file_type().is_dir() {
                Node::Dir
            } else {
                Node::File(fs::read(entry.path())?)
            };
            staged.push((join_key(&base, &rel), node));
        }

        let mut nodes = self.nodes.write().expect("lock poisoned");
        insert_ancestors(&mut nodes, &base);
        nodes.extend(staged);
        Ok(())
    }

    fn copy_remote_to_local(&self, remote: &Url, local: &Path) -> StoreResult<()> {
        let nodes = self.nodes.read().expect("lock poisoned");
        let base = key(remote);
        let root = nodes
            .get(&base)
            .ok_or_else(|| StoreError::not_found_uri(remote))?;

        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        match root {
            Node::File(data) => fs::write(local, data)?,
            Node::Dir => {
                fs::create_dir_all(local)?;
                for (path, node) in descendants(&nodes, &base) {
                    let rel = path[base.len()..].trim_start_matches('/');
                    let out = local.join(rel);
                    match node {
                        Node::Dir => fs::create_dir_all(&out)?,
                        Node::File(data) => {
                            if let Some(parent) = out.parent() {
                                fs::create_dir_all(parent)?;
                            }
                            fs::write(&out, data)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn list_children(&self, uri: &Url) -> StoreResult<Vec<Url>> {
        let nodes = self.nodes.read().expect("lock poisoned");
        let base = key(uri);
        match nodes.get(&base) {
            None => Ok(Vec::new()),
            Some(Node::File(_)) => Ok(vec![uri.clone()]),
            Some(Node::Dir) => descendants(&nodes, &base)
                .filter(|(path, _)| parent_key(path).as_deref() == Some(base.as_str()))
                .map(|(path, _)| {
                    let name = path.rsplit('/').next().unwrap_or_default();
                    uri::child(uri, name)
                })
                .collect(),
        }
    }

    fn open_for_read(&self, uri: &Url) -> StoreResult<ByteStream> {
        match self.nodes.read().expect("lock poisoned").get(&key(uri)) {
            Some(Node::File(data)) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(Node::Dir) => Err(StoreError::invalid_uri(uri, "is a directory")),
            None => Err(StoreError::not_found_uri(uri)),
        }
    }

    fn mkdirs(&self, uri: &Url) -> StoreResult<()> {
        let mut nodes = self.nodes.write().expect("lock poisoned");
        let path = key(uri);
        if let Some(Node::File(_)) = nodes.get(&path) {
            return Err(StoreError::exists_uri(uri));
        }
        insert_ancestors(&mut nodes, &path);
        nodes.insert(path, Node::Dir);
        Ok(())
    }

    fn delete(&self, uri: &Url, recursive: bool) -> StoreResult<bool> {
        let mut nodes = self.nodes.write().expect("lock poisoned");
        let path = key(uri);
        if !nodes.contains_key(&path) || path == "/" {
            return Ok(false);
        }
        let below: Vec<String> = descendants(&nodes, &path).map(|(k, _)| k.clone()).collect();
        if !below.is_empty() && !recursive {
            return Err(StoreError::DirectoryNotEmpty(uri.to_string()));
        }
        for k in below {
            nodes.remove(&k);
        }
        nodes.remove(&path);
        Ok(true)
    }

    fn rename(&self, from: &Url, to: &Url) -> StoreResult<()> {
        let mut nodes = self.nodes.write().expect("lock poisoned");
        let src = key(from);
        let dst = key(to);
        if !nodes.contains_key(&src) {
            return Err(StoreError::not_found_uri(from));
        }
        if nodes.contains_key(&dst) {
            return Err(StoreError::exists_uri(to));
        }
        if let Some(parent) = parent_key(&dst) {
            if !matches!(nodes.get(&parent), Some(Node::Dir)) {
                return Err(StoreError::NotFound(parent));
            }
        }

        let moved: Vec<(String, Node)> = descendants(&nodes, &src)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let root = nodes.remove(&src).unwrap_or(Node::Dir);
        for (k, _) in &moved {
            nodes.remove(k);
        }
        nodes.insert(dst.clone(), root);
        for (k, v) in moved {
            let rel = &k[src.len()..];
            nodes.insert(format!("{dst}{rel}"), v);
        }
        Ok(())
    }

    fn exists(&self, uri: &Url) -> StoreResult<bool> {
        Ok(self.nodes.read().expect("lock poisoned").contains_key(&key(uri)))
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("file_count", &self.file_count())
            .finish()
    }
}
