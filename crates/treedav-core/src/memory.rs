//! In-memory resource backend.
//!
//! The whole tree lives in a single [`MemoryTree`]: collections own a
//! name-ordered map of children, files own an immutable [`Bytes`] payload.
//! Handles ([`MemoryResource`]) are just `(tree, path)` pairs, so a handle to
//! a node that does not exist yet is free to build.
//!
//! All structural changes happen under the tree's write lock. The lock is
//! never held across an `.await`: downloads stream from a cloned `Bytes`,
//! uploads are collected first and committed in one step.

use crate::error::{ResourceError, ResourceResult};
use crate::path::ResourcePath;
use crate::resource::{BackendId, DynResource, Resource, ResourceProps, now};
use crate::stream::{ContentSink, ContentSource};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Chunk size used when streaming a payload into a sink.
const STREAM_BLOCK_SIZE: usize = 64 * 1024;

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
enum Node {
    File {
        content: Bytes,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
    },
    Collection {
        children: BTreeMap<String, Node>,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
    },
}

impl Node {
    fn new_file() -> Self {
        let now = now();
        Node::File {
            content: Bytes::new(),
            created: now,
            modified: now,
        }
    }

    fn new_collection() -> Self {
        let now = now();
        Node::Collection {
            children: BTreeMap::new(),
            created: now,
            modified: now,
        }
    }

    fn is_collection(&self) -> bool {
        matches!(self, Node::Collection { .. })
    }

    fn children(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Collection { children, .. } => Some(children),
            Node::File { .. } => None,
        }
    }

    /// Children of a collection that is about to change; bumps its mtime.
    fn children_for_update(&mut self) -> Option<&mut BTreeMap<String, Node>> {
        match self {
            Node::Collection {
                children, modified, ..
            } => {
                *modified = now();
                Some(children)
            }
            Node::File { .. } => None,
        }
    }

    fn props(&self, path: &ResourcePath) -> ResourceProps {
        match self {
            Node::File {
                content,
                created,
                modified,
            } => ResourceProps {
                path: path.clone(),
                is_collection: false,
                size: content.len() as u64,
                created: *created,
                modified: *modified,
            },
            Node::Collection {
                created, modified, ..
            } => ResourceProps {
                path: path.clone(),
                is_collection: true,
                size: 0,
                created: *created,
                modified: *modified,
            },
        }
    }
}

/// Node at `path`, or `None` if it (or any ancestor) is missing or a file.
fn find<'a>(root: &'a Node, path: &ResourcePath) -> Option<&'a Node> {
    path.segments()
        .try_fold(root, |node, name| node.children()?.get(name))
}

fn find_mut<'a>(root: &'a mut Node, path: &ResourcePath) -> Option<&'a mut Node> {
    let mut node = root;
    for name in path.segments() {
        node = match node {
            Node::Collection { children, .. } => children.get_mut(name)?,
            Node::File { .. } => return None,
        };
    }
    Some(node)
}

/// Fail unless every ancestor of `path` exists and is a collection.
fn check_ancestors(root: &Node, path: &ResourcePath) -> ResourceResult<()> {
    let segments: Vec<&str> = path.segments().collect();
    let mut node = root;
    let mut walked = ResourcePath::root();
    for name in &segments[..segments.len().saturating_sub(1)] {
        walked = walked.join(name)?;
        node = node
            .children()
            .and_then(|children| children.get(*name))
            .ok_or_else(|| ResourceError::DoesNotExist(walked.clone()))?;
        if !node.is_collection() {
            return Err(ResourceError::InvalidType(walked));
        }
    }
    Ok(())
}

/// Attach `node` under the collection at `parent`.
fn insert_child(
    root: &mut Node,
    parent: &ResourcePath,
    name: &str,
    node: Node,
) -> ResourceResult<()> {
    let children = match find_mut(root, parent) {
        Some(parent_node) => parent_node
            .children_for_update()
            .ok_or_else(|| ResourceError::InvalidType(parent.clone()))?,
        None => return Err(ResourceError::DoesNotExist(parent.clone())),
    };
    children.insert(name.to_string(), node);
    Ok(())
}

/// Detach and return the node at `path`.
fn remove_child(root: &mut Node, path: &ResourcePath) -> ResourceResult<Node> {
    let parent = path
        .parent()
        .ok_or_else(|| ResourceError::InvalidPath("the mount root cannot be removed".into()))?;
    find_mut(root, &parent)
        .and_then(Node::children_for_update)
        .and_then(|children| children.remove(path.name()))
        .ok_or_else(|| ResourceError::DoesNotExist(path.clone()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relocation {
    Move,
    Copy,
}

/// A resource tree held entirely in process memory.
pub struct MemoryTree {
    id: u64,
    root: RwLock<Node>,
}

impl fmt::Debug for MemoryTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTree").field("id", &self.id).finish_non_exhaustive()
    }
}

impl MemoryTree {
    /// Create an empty tree (a root collection with no children).
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed),
            root: RwLock::new(Node::new_collection()),
        })
    }

    /// Root resource of this tree, exposed under `prefix`.
    pub fn root(self: &Arc<Self>, prefix: impl Into<Arc<str>>) -> MemoryResource {
        MemoryResource {
            prefix: prefix.into(),
            path: ResourcePath::root(),
            tree: Arc::clone(self),
        }
    }
}

/// Handle to a node (existing or not) in a [`MemoryTree`].
#[derive(Clone)]
pub struct MemoryResource {
    prefix: Arc<str>,
    path: ResourcePath,
    tree: Arc<MemoryTree>,
}

impl fmt::Debug for MemoryResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryResource")
            .field("prefix", &self.prefix)
            .field("path", &self.path)
            .field("tree", &self.tree.id)
            .finish()
    }
}

impl MemoryResource {
    /// Root of a brand-new, empty tree.
    pub fn new_root(prefix: impl Into<Arc<str>>) -> Self {
        MemoryTree::new().root(prefix)
    }

    fn at(&self, path: ResourcePath) -> Self {
        Self {
            prefix: Arc::clone(&self.prefix),
            path,
            tree: Arc::clone(&self.tree),
        }
    }

    fn relocate(&self, destination: &ResourcePath, mode: Relocation) -> ResourceResult<bool> {
        if mode == Relocation::Move && self.path.is_root() {
            return Err(ResourceError::InvalidPath(
                "the mount root cannot be moved".into(),
            ));
        }

        let mut root = self.tree.root.write();
        if find(&root, &self.path).is_none() {
            return Err(ResourceError::DoesNotExist(self.path.clone()));
        }

        let (target, fresh) = match find(&root, destination) {
            Some(node) if node.is_collection() => (destination.join(self.name())?, false),
            Some(_) => (destination.clone(), false),
            None => {
                let parent = destination
                    .parent()
                    .ok_or_else(|| ResourceError::DoesNotExist(destination.clone()))?;
                if !find(&root, &parent).is_some_and(Node::is_collection) {
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
        if find(&root, &target).is_some() {
            return Err(match mode {
                Relocation::Move => ResourceError::InvalidType(target),
                Relocation::Copy => ResourceError::AlreadyExists(target),
            });
        }

        let node = match mode {
            Relocation::Move => remove_child(&mut root, &self.path)?,
            Relocation::Copy => find(&root, &self.path)
                .cloned()
                .ok_or_else(|| ResourceError::DoesNotExist(self.path.clone()))?,
        };
        let parent = target.parent().unwrap_or_else(ResourcePath::root);
        insert_child(&mut root, &parent, target.name(), node)?;

        debug!(source = %self.path, target = %target, ?mode, fresh, "relocated memory resource");
        Ok(fresh)
    }
}

#[async_trait]
impl Resource for MemoryResource {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn path(&self) -> &ResourcePath {
        &self.path
    }

    fn backend_id(&self) -> BackendId {
        BackendId::new(format!("memory:{}", self.tree.id))
    }

    fn parent(&self) -> Option<DynResource> {
        self.path
            .parent()
            .map(|parent| Box::new(self.at(parent)) as DynResource)
    }

    async fn populate_props(&self) -> ResourceResult<ResourceProps> {
        let root = self.tree.root.read();
        find(&root, &self.path)
            .map(|node| node.props(&self.path))
            .ok_or_else(|| ResourceError::DoesNotExist(self.path.clone()))
    }

    async fn populate_collection(&self) -> ResourceResult<Vec<ResourceProps>> {
        let root = self.tree.root.read();
        let children = find(&root, &self.path)
            .ok_or_else(|| ResourceError::DoesNotExist(self.path.clone()))?
            .children()
            .ok_or_else(|| ResourceError::InvalidType(self.path.clone()))?;

        // BTreeMap iteration is already name-ordered
        let mut collections = Vec::new();
        let mut files = Vec::new();
        for (name, child) in children {
            let props = child.props(&self.path.join(name)?);
            if props.is_collection {
                collections.push(props);
            } else {
                files.push(props);
            }
        }
        collections.extend(files);
        Ok(collections)
    }

    async fn with_relative(&self, relative: &str) -> ResourceResult<DynResource> {
        let target = self.path.join(relative)?;
        if target == self.path {
            return Ok(Box::new(self.clone()));
        }

        check_ancestors(&self.tree.root.read(), &target)?;

        trace!(base = %self.path, target = %target, "resolved memory resource");
        Ok(Box::new(self.at(target)))
    }

    async fn get_content(
        &self,
        sink: &mut dyn ContentSink,
        offset: u64,
        limit: Option<u64>,
    ) -> ResourceResult<()> {
        let content = {
            let root = self.tree.root.read();
            match find(&root, &self.path) {
                Some(Node::File { content, .. }) => content.clone(),
                Some(Node::Collection { .. }) => {
                    return Err(ResourceError::InvalidType(self.path.clone()));
                }
                None => return Err(ResourceError::DoesNotExist(self.path.clone())),
            }
        };

        let len = content.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
        let end = limit.map_or(len, |limit| {
            start
                .saturating_add(usize::try_from(limit).unwrap_or(usize::MAX))
                .min(len)
        });

        let mut remaining = content.slice(start..end);
        while !remaining.is_empty() {
            let chunk = remaining.split_to(STREAM_BLOCK_SIZE.min(remaining.len()));
            sink.write(chunk).await.map_err(ResourceError::Stream)?;
        }
        Ok(())
    }

    async fn put_content(&self, source: &mut dyn ContentSource) -> ResourceResult<bool> {
        let created = {
            let mut root = self.tree.root.write();
            match find(&root, &self.path).map(Node::is_collection) {
                Some(true) => return Err(ResourceError::InvalidType(self.path.clone())),
                Some(false) => {
                    if let Some(Node::File {
                        content, modified, ..
                    }) = find_mut(&mut root, &self.path)
                    {
                        *content = Bytes::new();
                        *modified = now();
                    }
                    false
                }
                None => {
                    let parent = self.path.parent().unwrap_or_else(ResourcePath::root);
                    insert_child(&mut root, &parent, self.name(), Node::new_file())?;
                    true
                }
            }
        };

        let mut buffer = BytesMut::new();
        loop {
            let chunk = source.read_some().await.map_err(ResourceError::Stream)?;
            if chunk.is_empty() {
                break;
            }
            buffer.extend_from_slice(&chunk);
        }

        let mut root = self.tree.root.write();
        match find_mut(&mut root, &self.path) {
            Some(Node::File {
                content, modified, ..
            }) => {
                *content = buffer.freeze();
                *modified = now();
                debug!(path = %self.path, size = content.len(), created, "stored memory content");
                Ok(created)
            }
            Some(Node::Collection { .. }) => Err(ResourceError::InvalidType(self.path.clone())),
            // Deleted while the upload was in flight
            None => Err(ResourceError::DoesNotExist(self.path.clone())),
        }
    }

    async fn make_collection(&self, relative: &str) -> ResourceResult<DynResource> {
        let target = self.path.join(relative)?;
        let parent = target
            .parent()
            .ok_or_else(|| ResourceError::AlreadyExists(target.clone()))?;
        {
            let mut root = self.tree.root.write();
            if find(&root, &target).is_some() {
                return Err(ResourceError::AlreadyExists(target));
            }
            check_ancestors(&root, &target)?;
            insert_child(&mut root, &parent, target.name(), Node::new_collection())?;
        }
        debug!(path = %target, "created memory collection");
        Ok(Box::new(self.at(target)))
    }

    async fn move_to(&self, destination: &ResourcePath) -> ResourceResult<bool> {
        self.relocate(destination, Relocation::Move)
    }

    async fn copy_to(&self, destination: &ResourcePath) -> ResourceResult<bool> {
        self.relocate(destination, Relocation::Copy)
    }

    async fn delete(&self) -> ResourceResult<()> {
        remove_child(&mut self.tree.root.write(), &self.path)?;
        debug!(path = %self.path, "deleted memory resource");
        Ok(())
    }
}
