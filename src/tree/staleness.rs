//! Staleness detection and reconnect
//!
//! The bound objects can change underneath the tree: arrays grow or
//! shrink, references are reassigned, objects are destroyed. [`tick`]
//! compares the built tree against live data and, if they disagree,
//! rebuilds the whole tree once while keeping expansion and favorites.
//!
//! [`tick`]: PropertyTree::tick

use super::compare::ReadOptions;
use super::node::{ExpectedChildShape, NodeId, NodeKind, Truncation};
use super::PropertyTree;
use crate::memory::{Address, MemoryReader};
use crate::reflection::{ObjectHost, ObjectRef, Reflection};
use crate::{Error, Result};

/// Result of one [`PropertyTree::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tree still matches live data
    Unchanged,
    /// The tree was rebuilt
    Reconnected,
}

impl<H: ObjectHost> PropertyTree<H> {
    /// Check the tree against live data and rebuild it if needed
    pub fn tick(&mut self) -> TickOutcome {
        if !self.reconnect_pending && !self.is_all_data_valid() {
            tracing::warn!("Bound data no longer matches the tree, rebuilding");
            self.reconnect_pending = true;
        }

        if self.reconnect_pending {
            self.reconnect();
            TickOutcome::Reconnected
        } else {
            TickOutcome::Unchanged
        }
    }

    /// Force a rebuild on the next tick
    pub fn request_reconnect(&mut self) {
        self.reconnect_pending = true;
    }

    /// Whether a rebuild is scheduled
    pub fn is_reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Whether every built node still agrees with live data
    ///
    /// Collapsed subtrees are not visited; they are checked once they are
    /// shown.
    pub fn is_all_data_valid(&self) -> bool {
        self.node_data_valid(self.root)
    }

    fn node_data_valid(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        let host = self.ctx.host.as_ref();

        if let NodeKind::Object(object) = &node.kind {
            if let Some(dead) = object.instances.iter().find(|&&o| !host.is_live(o)) {
                tracing::debug!("Bound object {} was destroyed", dead);
                return false;
            }
        }

        if node.property.is_some() {
            let options = ReadOptions {
                arrays_may_differ_in_size: true,
                ..ReadOptions::default()
            };
            let Ok(read) = self.resolve_read_addresses(id, options) else {
                tracing::debug!("'{}' no longer resolves", node.display_name);
                return false;
            };

            let e = node.expansion;
            let never_built = e.on_demand && !e.ever_expanded;
            let depth_exhausted = node.depth_remaining == Some(0);

            if !never_built && !depth_exhausted {
                match node.shape {
                    ExpectedChildShape::Fixed => {}
                    ExpectedChildShape::ArrayElements => {
                        let lengths: Vec<_> = read
                            .addresses
                            .iter()
                            .map(|&address| host.read_array_header(address).map(|h| h.len()).ok())
                            .collect();
                        if let Some(Some(first)) = lengths.first().copied() {
                            let uniform = lengths.iter().all(|&len| len == Some(first));
                            if uniform && first != node.children.len() {
                                tracing::debug!(
                                    "'{}' has {} elements, {} built",
                                    node.display_name,
                                    first,
                                    node.children.len()
                                );
                                return false;
                            }
                        }
                    }
                    ExpectedChildShape::ObjectReference => {
                        let matches = if e.truncation == Some(Truncation::CircularReference) {
                            self.reference_still_circular(id, &read.addresses)
                        } else {
                            self.reference_matches(id, &read.addresses)
                        };
                        if !matches {
                            tracing::debug!("'{}' points somewhere new", node.display_name);
                            return false;
                        }
                    }
                }
            }
        }

        node.children.iter().all(|&child| {
            let shown = self
                .nodes
                .get(child)
                .is_some_and(|c| c.visibility.seen || c.is_object());
            !shown || self.node_data_valid(child)
        })
    }

    /// Whether a reference node's nested root binds exactly the live targets
    fn reference_matches(&self, id: NodeId, addresses: &[Address]) -> bool {
        let host = self.ctx.host.as_ref();
        let target = |address: Address| {
            host.read_pointer(address)
                .ok()
                .flatten()
                .map(ObjectRef::from_address)
                .filter(|&o| host.is_live(o))
        };

        let nested = self
            .children(id)
            .first()
            .and_then(|&child| self.nodes.get(child))
            .and_then(|n| n.as_object());

        let Some(first) = addresses.first().and_then(|&a| target(a)) else {
            return nested.is_none();
        };
        let Some(nested) = nested else {
            return false;
        };

        let mut expected = vec![first];
        for &address in &addresses[1..] {
            if let Some(object) = target(address) {
                if !expected.contains(&object) {
                    expected.push(object);
                }
            }
        }
        nested.instances == expected
    }

    /// Whether a reference cut off as circular still points back at an
    /// object bound above it
    fn reference_still_circular(&self, id: NodeId, addresses: &[Address]) -> bool {
        let host = self.ctx.host.as_ref();
        addresses
            .first()
            .and_then(|&address| host.read_pointer(address).ok().flatten())
            .map(ObjectRef::from_address)
            .is_some_and(|target| host.is_live(target) && self.is_bound_by_ancestor(id, target))
    }

    /// Rebuild the whole tree from the bound objects, dropping destroyed
    /// ones, and keep expansion and favorites
    pub fn reconnect(&mut self) {
        let paths = self.remember_expanded();
        self.save_expanded();
        self.reconnect_pending = false;

        let host = std::sync::Arc::clone(&self.ctx.host);
        let instances: Vec<ObjectRef> = self
            .instances()
            .iter()
            .copied()
            .filter(|&object| {
                let live = host.is_live(object);
                if !live {
                    tracing::warn!("Dropping destroyed object {}", object);
                }
                live
            })
            .collect();

        self.set_root_instances(instances);
        self.rebuild_root();
        self.apply_expanded_paths(&paths);
        self.apply_favorites();
        self.refresh();

        self.reconnects += 1;
        tracing::info!(
            "Reconnected {} object(s), {} nodes",
            self.instances().len(),
            self.nodes.len()
        );
    }

    /// Rebuild one node's children from live data
    pub fn rebuild_subtree(&mut self, id: NodeId) -> Result<()> {
        self.nodes.get(id).ok_or(Error::InvalidNode)?;

        let paths = self.remember_expanded();
        self.init_expansion_flags(id);
        self.rebuild_children(id);
        self.apply_expanded_paths(&paths);
        self.apply_favorites();
        self.refresh();
        Ok(())
    }
}
