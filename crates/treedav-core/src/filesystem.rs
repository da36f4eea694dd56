//! Filesystem resource backend.
//!
//! Maps a mount onto a host directory. Every [`ResourcePath`] is resolved
//! below the tree's root directory; since paths can never contain `..`,
//! no request can reach outside it.
//!
//! Reads go straight to the OS. Structural mutations (create, relocate,
//! delete) are serialized per tree so that the exists-then-act checks they
//! perform are not raced by another request on the same mount.

use crate::error::{ResourceError, ResourceResult};
use crate::path::ResourcePath;
use crate::resource::{
    BackendId, DynResource, Resource, ResourceProps, from_system_time, now,
};
use crate::stream::{ContentSink, ContentSource};
use async_trait::async_trait;
use bytes::BytesMut;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Read block size for content streaming (1 MiB).
const BLOCK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relocation {
    Move,
    Copy,
}

/// A resource tree backed by a host directory.
#[derive(Debug)]
pub struct FsTree {
    root_dir: PathBuf,
    structure: Mutex<()>,
}

impl FsTree {
    /// Serve the directory at `root_dir`.
    ///
    /// The directory is canonicalized when possible so that two trees over
    /// the same directory report the same [`BackendId`].
    pub fn new(root_dir: impl Into<PathBuf>) -> Arc<Self> {
        let root_dir = root_dir.into();
        let root_dir = std::fs::canonicalize(&root_dir).unwrap_or(root_dir);
        Arc::new(Self {
            root_dir,
            structure: Mutex::new(()),
        })
    }

    /// Root resource of this tree, exposed under `prefix`.
    pub fn root(self: &Arc<Self>, prefix: impl Into<Arc<str>>) -> FsResource {
        FsResource {
            prefix: prefix.into(),
            path: ResourcePath::root(),
            tree: Arc::clone(self),
        }
    }

    /// Host directory backing this tree.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn absolute(&self, path: &ResourcePath) -> PathBuf {
        if path.is_root() {
            self.root_dir.clone()
        } else {
            self.root_dir.join(path.as_str().trim_start_matches('/'))
        }
    }

    /// Metadata at `path`, or `None` if nothing is there.
    async fn stat(&self, path: &ResourcePath) -> ResourceResult<Option<Metadata>> {
        match fs::metadata(self.absolute(path)).await {
            Ok(meta) => Ok(Some(meta)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(ResourceError::from_io(path, e)),
        }
    }

    async fn expect_collection(&self, path: &ResourcePath) -> ResourceResult<()> {
        match self.stat(path).await? {
            Some(meta) if meta.is_dir() => Ok(()),
            Some(_) => Err(ResourceError::InvalidType(path.clone())),
            None => Err(ResourceError::DoesNotExist(path.clone())),
        }
    }

    /// Check every ancestor of `path` from the root down.
    async fn expect_ancestors(&self, path: &ResourcePath) -> ResourceResult<()> {
        let segments: Vec<&str> = path.segments().collect();
        let mut walked = ResourcePath::root();
        for name in &segments[..segments.len().saturating_sub(1)] {
            walked = walked.join(name)?;
            self.expect_collection(&walked).await?;
        }
        Ok(())
    }

    /// Recursively copy the directory `from` to the not-yet-existing `to`.
    ///
    /// Iterative to avoid unbounded async recursion on deep trees.
    async fn copy_tree(&self, from: &Path, to: &Path, target: &ResourcePath) -> ResourceResult<()> {
        let io_err = |e: io::Error| ResourceError::from_io(target, e);
        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];

        while let Some((src, dst)) = pending.pop() {
            fs::create_dir(&dst).await.map_err(io_err)?;
            let mut entries = fs::read_dir(&src).await.map_err(io_err)?;
            while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
                let child_dst = dst.join(entry.file_name());
                if entry.file_type().await.map_err(io_err)?.is_dir() {
                    pending.push((entry.path(), child_dst));
                } else {
                    fs::copy(entry.path(), &child_dst).await.map_err(io_err)?;
                }
            }
        }
        Ok(())
    }
}

fn props_from(path: &ResourcePath, meta: &Metadata) -> ResourceProps {
    let modified = meta.modified().map_or_else(|_| now(), from_system_time);
    // Not every filesystem records birth time
    let created = meta.created().map_or(modified, from_system_time);
    ResourceProps {
        path: path.clone(),
        is_collection: meta.is_dir(),
        size: if meta.is_dir() { 0 } else { meta.len() },
        created,
        modified,
    }
}

/// Handle to a path (existing or not) in an [`FsTree`].
#[derive(Debug, Clone)]
pub struct FsResource {
    prefix: Arc<str>,
    path: ResourcePath,
    tree: Arc<FsTree>,
}

impl FsResource {
    /// Root of a new tree over `root_dir`.
    pub fn new_root(prefix: impl Into<Arc<str>>, root_dir: impl Into<PathBuf>) -> Self {
        FsTree::new(root_dir).root(prefix)
    }

    /// Host path of this resource.
    pub fn absolute_path(&self) -> PathBuf {
        self.tree.absolute(&self.path)
    }

    fn at(&self, path: ResourcePath) -> Self {
        Self {
            prefix: Arc::clone(&self.prefix),
            path,
            tree: Arc::clone(&self.tree),
        }
    }

    async fn relocate(&self, destination: &ResourcePath, mode: Relocation) -> ResourceResult<bool> {
        if mode == Relocation::Move && self.path.is_root() {
            return Err(ResourceError::InvalidPath(
                "the mount root cannot be moved".into(),
            ));
        }

        let _structure = self.tree.structure.lock().await;
        let source = self
            .tree
            .stat(&self.path)
            .await?
            .ok_or_else(|| ResourceError::DoesNotExist(self.path.clone()))?;

        let (target, fresh) = match self.tree.stat(destination).await? {
            Some(meta) if meta.is_dir() => (destination.join(self.name())?, false),
            Some(_) => (destination.clone(), false),
            None => {
                let parent = destination
                    .parent()
                    .ok_or_else(|| ResourceError::DoesNotExist(destination.clone()))?;
                if !self
                    .tree
                    .stat(&parent)
                    .await?
                    .is_some_and(|meta| meta.is_dir())
                {
                    return Err(ResourceError::DoesNotExist(parent));
                }
                (destination.clone(), true)
            }
        };

        if target.starts_with(&self.path) {
            return Err(ResourceError::InvalidPath(format!(
                "cannot place {} inside itself",
                self.path
            )));
        }
        if self.tree.stat(&target).await?.is_some() {
            return Err(match mode {
                Relocation::Move => ResourceError::InvalidType(target),
                Relocation::Copy => ResourceError::AlreadyExists(target),
            });
        }

        let from = self.absolute_path();
        let to = self.tree.absolute(&target);
        match mode {
            Relocation::Move => fs::rename(&from, &to)
                .await
                .map_err(|e| ResourceError::from_io(&target, e))?,
            Relocation::Copy if source.is_dir() => self.tree.copy_tree(&from, &to, &target).await?,
            Relocation::Copy => {
                fs::copy(&from, &to)
                    .await
                    .map_err(|e| ResourceError::from_io(&target, e))?;
            }
        }

        debug!(source = %self.path, target = %target, ?mode, fresh, "relocated filesystem resource");
        Ok(fresh)
    }
}

#[async_trait]
impl Resource for FsResource {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn path(&self) -> &ResourcePath {
        &self.path
    }

    fn backend_id(&self) -> BackendId {
        BackendId::new(format!("fs:{}", self.tree.root_dir.display()))
    }

    fn parent(&self) -> Option<DynResource> {
        self.path
            .parent()
            .map(|parent| Box::new(self.at(parent)) as DynResource)
    }

    async fn populate_props(&self) -> ResourceResult<ResourceProps> {
        self.tree
            .stat(&self.path)
            .await?
            .map(|meta| props_from(&self.path, &meta))
            .ok_or_else(|| ResourceError::DoesNotExist(self.path.clone()))
    }

    async fn populate_collection(&self) -> ResourceResult<Vec<ResourceProps>> {
        self.tree.expect_collection(&self.path).await?;

        let io_err = |e: io::Error| ResourceError::from_io(&self.path, e);
        let mut entries = fs::read_dir(self.absolute_path()).await.map_err(io_err)?;
        let mut collections = Vec::new();
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let Ok(name) = entry.file_name().into_string() else {
                warn!(parent = %self.path, entry = ?entry.file_name(), "skipping non-UTF-8 entry");
                continue;
            };
            // Follow symlinks; a dangling one has no props to report
            let meta = match fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(e) => {
                    debug!(parent = %self.path, %name, error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let props = props_from(&self.path.join(&name)?, &meta);
            if props.is_collection {
                collections.push(props);
            } else {
                files.push(props);
            }
        }

        collections.sort_by(|a, b| a.name().cmp(b.name()));
        files.sort_by(|a, b| a.name().cmp(b.name()));
        collections.extend(files);
        Ok(collections)
    }

    async fn with_relative(&self, relative: &str) -> ResourceResult<DynResource> {
        let target = self.path.join(relative)?;
        if target == self.path {
            return Ok(Box::new(self.clone()));
        }

        {
            let below = target.relative_to(&self.path).unwrap_or_default();
            let mut names = below.split('/').peekable();
            let mut walked = self.path.clone();
            while let Some(name) = names.next() {
                self.tree.expect_collection(&walked).await?;
                if names.peek().is_none() {
                    break;
                }
                walked = walked.join(name)?;
            }
        }

        trace!(base = %self.path, target = %target, "resolved filesystem resource");
        Ok(Box::new(self.at(target)))
    }

    async fn get_content(
        &self,
        sink: &mut dyn ContentSink,
        offset: u64,
        limit: Option<u64>,
    ) -> ResourceResult<()> {
        let io_err = |e: io::Error| ResourceError::from_io(&self.path, e);
        let mut file = fs::File::open(self.absolute_path()).await.map_err(io_err)?;
        if file.metadata().await.map_err(io_err)?.is_dir() {
            return Err(ResourceError::InvalidType(self.path.clone()));
        }
        if offset > 0 {
            file.seek(io::SeekFrom::Start(offset)).await.map_err(io_err)?;
        }

        let mut reader = file.take(limit.unwrap_or(u64::MAX));
        loop {
            let mut block = BytesMut::with_capacity(BLOCK_SIZE);
            if reader.read_buf(&mut block).await.map_err(io_err)? == 0 {
                break;
            }
            sink.write(block.freeze()).await.map_err(ResourceError::Stream)?;
        }
        Ok(())
    }

    async fn put_content(&self, source: &mut dyn ContentSource) -> ResourceResult<bool> {
        let io_err = |e: io::Error| ResourceError::from_io(&self.path, e);

        let (mut file, created) = {
            let _structure = self.tree.structure.lock().await;
            let existing = self.tree.stat(&self.path).await?;
            if existing.as_ref().is_some_and(Metadata::is_dir) {
                return Err(ResourceError::InvalidType(self.path.clone()));
            }
            if existing.is_none() {
                let parent = self.path.parent().unwrap_or_else(ResourcePath::root);
                self.tree.expect_collection(&parent).await?;
            }
            let file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(self.absolute_path())
                .await
                .map_err(io_err)?;
            (file, existing.is_none())
        };

        let mut written = 0u64;
        loop {
            let chunk = source.read_some().await.map_err(ResourceError::Stream)?;
            if chunk.is_empty() {
                break;
            }
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;

        debug!(path = %self.path, size = written, created, "stored filesystem content");
        Ok(created)
    }

    async fn make_collection(&self, relative: &str) -> ResourceResult<DynResource> {
        let target = self.path.join(relative)?;
        {
            let _structure = self.tree.structure.lock().await;
            if self.tree.stat(&target).await?.is_some() {
                return Err(ResourceError::AlreadyExists(target));
            }
            self.tree.expect_ancestors(&target).await?;
            fs::create_dir(self.tree.absolute(&target))
                .await
                .map_err(|e| ResourceError::from_io(&target, e))?;
        }
        debug!(path = %target, "created filesystem collection");
        Ok(Box::new(self.at(target)))
    }

    async fn move_to(&self, destination: &ResourcePath) -> ResourceResult<bool> {
        self.relocate(destination, Relocation::Move).await
    }

    async fn copy_to(&self, destination: &ResourcePath) -> ResourceResult<bool> {
        self.relocate(destination, Relocation::Copy).await
    }

    async fn delete(&self) -> ResourceResult<()> {
        if self.path.is_root() {
            return Err(ResourceError::InvalidPath(
                "the mount root cannot be removed".into(),
            ));
        }

        let _structure = self.tree.structure.lock().await;
        let meta = self
            .tree
            .stat(&self.path)
            .await?
            .ok_or_else(|| ResourceError::DoesNotExist(self.path.clone()))?;
        let absolute = self.absolute_path();
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&absolute).await
        } else {
            fs::remove_file(&absolute).await
        };
        removed.map_err(|e| ResourceError::from_io(&self.path, e))?;

        debug!(path = %self.path, "deleted filesystem resource");
        Ok(())
    }
}
