use crate::error::{constants, NemoriaError, Result};
use crate::store::route::Route;
use crate::store::tree::{Node, RouteTree};
use crate::store::value::Value;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// Route tree behind a single readers-writer lock.
///
/// Every operation holds the lock only for the in-memory work, never across
/// an `.await`, so readers never observe a half-applied write.
#[derive(Debug, Default)]
pub struct SharedStore {
    tree: RwLock<RouteTree>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tree(tree: RouteTree) -> Self {
        Self {
            tree: RwLock::new(tree),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RouteTree>> {
        self.tree.read().map_err(|_| {
            NemoriaError::Internal(format!(
                "{}: {}",
                constants::ERR_STORE_READ_LOCK,
                constants::ERR_LOCK_POISONED
            ))
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RouteTree>> {
        self.tree.write().map_err(|_| {
            NemoriaError::Internal(format!(
                "{}: {}",
                constants::ERR_STORE_WRITE_LOCK,
                constants::ERR_LOCK_POISONED
            ))
        })
    }

    pub fn set(&self, route: &Route, value: Value) -> Result<Option<Value>> {
        trace!(%route, kind = value.type_name(), "store set");
        self.write()?.set(route, value)
    }

    pub fn get(&self, route: &Route) -> Result<Value> {
        self.read()?.get(route)
    }

    pub fn subtree(&self, route: &Route) -> Result<Value> {
        self.read()?.subtree(route)
    }

    pub fn delete(&self, route: &Route) -> Result<Node> {
        trace!(%route, "store delete");
        self.write()?.delete(route)
    }

    pub fn drop_route(&self, route: &Route) -> Result<Node> {
        trace!(%route, "store drop");
        self.write()?.drop_route(route)
    }

    pub fn all(&self) -> Result<Value> {
        Ok(self.read()?.all())
    }

    /// Consistent copy of the whole tree, for encoding outside the lock.
    pub fn snapshot(&self) -> Result<RouteTree> {
        Ok(self.read()?.clone())
    }

    /// Swap in a new tree, returning the old one.
    pub fn replace(&self, tree: RouteTree) -> Result<RouteTree> {
        Ok(std::mem::replace(&mut *self.write()?, tree))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }
}
