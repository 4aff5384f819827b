//! Destroyable Registry
//!
//! The registry is the process-wide arena that associates owners with their
//! children and cleanup callbacks.
//!
//! # How Destruction Works
//!
//! 1. `destroy(owner)` marks the owner as destroying. From here on nothing
//!    can be attached to it, and further `destroy` calls are no-ops.
//!
//! 2. Children are destroyed first, in the order they were associated,
//!    recursively. A descendant's callbacks therefore always run before its
//!    ancestors' callbacks.
//!
//! 3. The owner's own callbacks run in registration order, each exactly once.
//!
//! 4. The owner is evicted from the arena and detached from its parent.
//!
//! No registry lock is held while callbacks run, so callbacks may freely
//! create, associate and destroy other owners.

use std::sync::OnceLock;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{ResourceError, Result};

use super::owner::OwnerId;

type Destructor = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Live,
    Destroying,
}

struct Node {
    state: NodeState,
    parent: Option<OwnerId>,
    children: Vec<OwnerId>,
    // Behind a mutex so the node is Sync while callbacks only need Send.
    destructors: Mutex<Vec<Destructor>>,
}

impl Node {
    fn new() -> Self {
        Self {
            state: NodeState::Live,
            parent: None,
            children: Vec::new(),
            destructors: Mutex::new(Vec::new()),
        }
    }
}

static NODES: OnceLock<DashMap<OwnerId, Node>> = OnceLock::new();

fn nodes() -> &'static DashMap<OwnerId, Node> {
    NODES.get_or_init(DashMap::new)
}

/// The global destroyable registry.
pub struct Registry;

impl Registry {
    /// Allocate a new live owner.
    pub(crate) fn create() -> OwnerId {
        let id = OwnerId::next();
        nodes().insert(id, Node::new());
        id
    }

    fn is_live(id: OwnerId) -> bool {
        nodes()
            .get(&id)
            .is_some_and(|node| node.state == NodeState::Live)
    }

    /// Associate `child` under `parent`, so the child is destroyed no later
    /// than the parent.
    ///
    /// Re-associating a child with its current parent is a no-op.
    pub fn register_child(parent: OwnerId, child: OwnerId) -> Result<()> {
        if parent == child {
            return Err(ResourceError::CyclicAssociation { parent, child });
        }
        if !Self::is_live(parent) {
            return Err(ResourceError::OwnerDestroyed(parent));
        }

        let existing_parent = match nodes().get(&child) {
            Some(node) if node.state == NodeState::Live => node.parent,
            _ => return Err(ResourceError::OwnerDestroyed(child)),
        };
        match existing_parent {
            Some(existing) if existing == parent => return Ok(()),
            Some(existing) => {
                return Err(ResourceError::AlreadyAssociated {
                    parent: existing,
                    child,
                })
            }
            None => {}
        }

        let mut cursor = parent;
        while let Some(ancestor) = Self::parent(cursor) {
            if ancestor == child {
                return Err(ResourceError::CyclicAssociation { parent, child });
            }
            cursor = ancestor;
        }

        if let Some(mut node) = nodes().get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(mut node) = nodes().get_mut(&parent) {
            node.children.push(child);
        }
        trace!(parent = ?parent, child = ?child, "associated destroyable child");
        Ok(())
    }

    /// Register a callback to run exactly once when `owner` is destroyed.
    pub fn register_destructor<F>(owner: OwnerId, destructor: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        match nodes().get(&owner) {
            Some(node) if node.state == NodeState::Live => {
                node.destructors.lock().push(Box::new(destructor));
                Ok(())
            }
            _ => Err(ResourceError::OwnerDestroyed(owner)),
        }
    }

    /// Destroy `owner`: its children first, then its own callbacks.
    ///
    /// Destroying an owner that is already destroying or destroyed does
    /// nothing.
    pub fn destroy(owner: OwnerId) {
        let (children, parent) = {
            let Some(mut node) = nodes().get_mut(&owner) else {
                return;
            };
            if node.state != NodeState::Live {
                return;
            }
            node.state = NodeState::Destroying;
            (std::mem::take(&mut node.children), node.parent)
        };

        debug!(owner = ?owner, children = children.len(), "destroying owner");

        for child in children {
            Self::destroy(child);
        }

        let destructors = nodes()
            .get(&owner)
            .map(|node| std::mem::take(&mut *node.destructors.lock()))
            .unwrap_or_default();

        trace!(owner = ?owner, destructors = destructors.len(), "running destructors");
        for destructor in destructors {
            destructor();
        }

        nodes().remove(&owner);

        if let Some(parent) = parent {
            if let Some(mut node) = nodes().get_mut(&parent) {
                node.children.retain(|c| *c != owner);
            }
        }
    }

    /// Whether `owner` has started (or finished) destruction.
    pub fn is_destroying(owner: OwnerId) -> bool {
        !Self::is_live(owner)
    }

    /// Whether `owner` has finished destruction.
    pub fn is_destroyed(owner: OwnerId) -> bool {
        !nodes().contains_key(&owner)
    }

    /// The parent `owner` is associated under.
    pub fn parent(owner: OwnerId) -> Option<OwnerId> {
        nodes().get(&owner).and_then(|node| node.parent)
    }

    /// The children currently associated under `owner`.
    pub fn children(owner: OwnerId) -> Vec<OwnerId> {
        nodes()
            .get(&owner)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }
}

/// Associate `child` under `parent`. See [`Registry::register_child`].
pub fn register_child(parent: OwnerId, child: OwnerId) -> Result<()> {
    Registry::register_child(parent, child)
}

/// Register a destructor for `owner`. See [`Registry::register_destructor`].
pub fn register_destructor<F>(owner: OwnerId, destructor: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    Registry::register_destructor(owner, destructor)
}

/// Destroy `owner`. See [`Registry::destroy`].
pub fn destroy(owner: OwnerId) {
    Registry::destroy(owner)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
