//! Hierarchical route tree.
//!
//! The tree is a root branch mapping segments to nodes. Branch maps keep
//! insertion order so snapshots (and the files written from them) are stable.
//!
//! Fixed policies:
//! - `set` never descends through an existing leaf; it fails with
//!   `RouteConflict` and leaves the tree untouched.
//! - `delete`/`drop_route` do not prune ancestors that become empty.
//! - A route plus its value may nest at most [`MAX_VALUE_DEPTH`] levels, so
//!   every snapshot survives an encode/decode round trip.

use crate::config::MAX_VALUE_DEPTH;
use crate::error::{constants, NemoriaError, Result};
use crate::store::route::Route;
use crate::store::value::{Value, ValueMap};
use indexmap::IndexMap;

/// Child map of a branch.
pub type Branch = IndexMap<String, Node>;

/// A node of the route tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Branch(Branch),
    Leaf(Value),
}

impl Node {
    /// Deep copy of this node as a plain value.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Leaf(value) => value.clone(),
            Node::Branch(children) => Value::Map(branch_to_map(children)),
        }
    }

    /// Rebuild a node from a snapshot value; maps become branches.
    pub fn from_value(value: Value) -> Node {
        match value {
            Value::Map(map) => Node::Branch(map_to_branch(map)),
            other => Node::Leaf(other),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }
}

fn branch_to_map(branch: &Branch) -> ValueMap {
    branch
        .iter()
        .map(|(key, node)| (key.clone(), node.to_value()))
        .collect()
}

fn map_to_branch(map: ValueMap) -> Branch {
    map.into_iter()
        .map(|(key, value)| (key, Node::from_value(value)))
        .collect()
}

fn not_found(route: &Route) -> NemoriaError {
    NemoriaError::RouteNotFound(route.to_string())
}

/// In-memory hierarchical store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTree {
    root: Branch,
}

impl RouteTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a tree from a decoded snapshot. The root must be a map.
    pub fn from_snapshot(snapshot: Value) -> Result<Self> {
        let depth = snapshot.depth();
        if depth > MAX_VALUE_DEPTH {
            return Err(NemoriaError::PersistenceError(format!(
                "{}: snapshot nests {depth} levels, limit is {MAX_VALUE_DEPTH}",
                constants::ERR_TOO_DEEP
            )));
        }
        match snapshot {
            Value::Map(map) => Ok(Self {
                root: map_to_branch(map),
            }),
            Value::Null => Ok(Self::new()),
            other => Err(NemoriaError::PersistenceError(format!(
                "{} (found {})",
                constants::ERR_SNAPSHOT_NOT_MAP,
                other.type_name()
            ))),
        }
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Bind `value` at `route`, creating intermediate branches.
    ///
    /// Returns the leaf value previously bound there, if any. Replacing a
    /// branch returns `None` and discards the subtree.
    pub fn set(&mut self, route: &Route, value: Value) -> Result<Option<Value>> {
        let depth = route.len() + value.depth();
        if depth > MAX_VALUE_DEPTH {
            return Err(NemoriaError::InvalidRoute(format!(
                "{}: {route} with its value nests {depth} levels, limit is {MAX_VALUE_DEPTH}",
                constants::ERR_TOO_DEEP
            )));
        }

        // Check the path first so a conflict leaves the tree untouched.
        let mut cursor = &self.root;
        for (depth, segment) in route.prefix().iter().enumerate() {
            match cursor.get(segment) {
                Some(Node::Branch(children)) => cursor = children,
                Some(Node::Leaf(_)) => {
                    let blocked = Route::new(route.segments()[..=depth].iter().cloned())?;
                    return Err(NemoriaError::RouteConflict(format!(
                        "{blocked} holds a value, cannot descend to {route}"
                    )));
                }
                None => break,
            }
        }

        let mut branch = &mut self.root;
        for segment in route.prefix() {
            let node = branch
                .entry(segment.clone())
                .or_insert_with(|| Node::Branch(Branch::new()));
            branch = match node {
                Node::Branch(children) => children,
                Node::Leaf(_) => return Err(NemoriaError::RouteConflict(route.to_string())),
            };
        }

        let previous = branch.insert(route.last().to_owned(), Node::Leaf(value));
        Ok(match previous {
            Some(Node::Leaf(old)) => Some(old),
            _ => None,
        })
    }

    fn node(&self, route: &Route) -> Option<&Node> {
        let parent = self.branch_at(route.prefix())?;
        parent.get(route.last())
    }

    fn branch_at(&self, segments: &[String]) -> Option<&Branch> {
        let mut branch = &self.root;
        for segment in segments {
            match branch.get(segment)? {
                Node::Branch(children) => branch = children,
                Node::Leaf(_) => return None,
            }
        }
        Some(branch)
    }

    fn branch_at_mut(&mut self, segments: &[String]) -> Option<&mut Branch> {
        let mut branch = &mut self.root;
        for segment in segments {
            match branch.get_mut(segment)? {
                Node::Branch(children) => branch = children,
                Node::Leaf(_) => return None,
            }
        }
        Some(branch)
    }

    /// Value of the leaf at `route`.
    pub fn get(&self, route: &Route) -> Result<Value> {
        match self.node(route) {
            Some(Node::Leaf(value)) => Ok(value.clone()),
            _ => Err(not_found(route)),
        }
    }

    /// Snapshot of whatever is at `route`: a leaf's value or a branch's map.
    pub fn subtree(&self, route: &Route) -> Result<Value> {
        self.node(route)
            .map(Node::to_value)
            .ok_or_else(|| not_found(route))
    }

    pub fn contains(&self, route: &Route) -> bool {
        self.node(route).is_some()
    }

    /// Remove the node at `route` with all its descendants.
    pub fn delete(&mut self, route: &Route) -> Result<Node> {
        let parent = self
            .branch_at_mut(route.prefix())
            .ok_or_else(|| not_found(route))?;
        parent
            .shift_remove(route.last())
            .ok_or_else(|| not_found(route))
    }

    /// Same as [`RouteTree::delete`], named for top-level intent.
    pub fn drop_route(&mut self, route: &Route) -> Result<Node> {
        self.delete(route)
    }

    /// Deep copy of the whole tree.
    pub fn all(&self) -> Value {
        Value::Map(branch_to_map(&self.root))
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.root.clear();
    }
}
