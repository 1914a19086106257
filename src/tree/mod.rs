//! Property tree
//!
//! A [`PropertyTree`] binds one or more object instances to a tree of
//! [`PropertyNode`]s built from reflection data. Every node owns its
//! children through a generation-checked arena; parents are plain ids.
//!
//! The tree is split across submodules by concern:
//! - `build`: child construction and sorting
//! - `address`: address resolution into instance memory
//! - `compare`: multi-object comparison and default-value diff
//! - `visibility`: filtering, seen flags and the visible list
//! - `expansion`: expand/collapse and expanded-path persistence
//! - `favorites`: the favorites view
//! - `staleness`: validity scan and reconnect
//! - `edit`: value text read/write and array edits
//! - `path`: qualified paths and display names

use crate::config::InspectorConfig;
use crate::persistence::{LayoutStore, MemoryLayoutStore};
use crate::reflection::{ObjectHost, ObjectRef, TypeDescriptor};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

mod address;
mod build;
mod compare;
mod edit;
mod expansion;
mod favorites;
mod node;
mod path;
mod staleness;
mod visibility;

#[cfg(test)]
pub(crate) mod fixtures;

pub use compare::{ReadAddresses, ReadOptions};
pub use edit::{ArrayEdit, ChangeKind, ChangeObserver, DisplayValue, PropertyChange};
pub use favorites::{MoveDirection, ViewMode};
pub use node::{
    ChildOrdering, ExpansionState, ExpectedChildShape, FavoriteState, ItemRole, NodeId, NodeKind,
    ObjectNode, PropertyNode, Truncation, VisibilityState,
};
pub use path::sanitize_display_name;
pub use staleness::TickOutcome;
pub use visibility::FilterSettings;

use node::NodeArena;

/// Everything a tree needs from its surroundings
///
/// Passed in explicitly instead of living in globals: the object host, the
/// configuration, the layout store and the change observers.
pub struct EditorContext<H: ObjectHost> {
    host: Arc<H>,
    config: InspectorConfig,
    store: Box<dyn LayoutStore>,
    observers: Vec<Box<dyn ChangeObserver>>,
}

impl<H: ObjectHost> EditorContext<H> {
    /// Create a context
    pub fn new(host: Arc<H>, config: InspectorConfig, store: Box<dyn LayoutStore>) -> Self {
        Self {
            host,
            config,
            store,
            observers: Vec::new(),
        }
    }

    /// Context with an in-memory layout store
    pub fn in_memory(host: Arc<H>, config: InspectorConfig) -> Self {
        Self::new(host, config, Box::new(MemoryLayoutStore::new()))
    }

    /// Register an observer for value changes
    pub fn with_observer(mut self, observer: Box<dyn ChangeObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

/// A multi-object property inspection tree
pub struct PropertyTree<H: ObjectHost> {
    ctx: EditorContext<H>,
    nodes: NodeArena,
    root: NodeId,
    filter: FilterSettings,
    view: ViewMode,
    visible: Vec<NodeId>,
    reconnect_pending: bool,
    reconnects: u64,
}

impl<H: ObjectHost> PropertyTree<H> {
    /// Create an empty tree; call [`PropertyTree::bind`] to show objects
    pub fn new(ctx: EditorContext<H>) -> Self {
        let mut nodes = NodeArena::default();
        let mut root = PropertyNode::new(None, NodeKind::Object(ObjectNode::default()));
        root.expansion.expandable = true;
        root.expansion.expanded = true;
        let root = nodes.insert(root);

        Self {
            ctx,
            nodes,
            root,
            filter: FilterSettings::default(),
            view: ViewMode::Normal,
            visible: Vec::new(),
            reconnect_pending: false,
            reconnects: 0,
        }
    }

    /// Bind a new set of instances, replacing the current one
    ///
    /// Duplicates and objects that are no longer live are dropped. The
    /// expanded paths of the previous binding are saved first, and those of
    /// the new base type are restored afterwards.
    pub fn bind(&mut self, objects: &[ObjectRef]) {
        self.save_expanded();

        let previous = self.base_type_name().map(str::to_string);
        let mut seen = HashSet::new();
        let instances: Vec<ObjectRef> = objects
            .iter()
            .copied()
            .filter(|object| seen.insert(*object))
            .filter(|&object| {
                let live = self.ctx.host.is_live(object);
                if !live {
                    tracing::warn!("Skipping destroyed object {}", object);
                }
                live
            })
            .collect();

        self.set_root_instances(instances);

        if self.base_type_name() != previous.as_deref() {
            self.filter.terms.clear();
        }

        self.rebuild_root();
        self.restore_saved_expansion();
        self.apply_favorites();
        self.refresh();

        tracing::info!(
            "Bound {} object(s) as {}",
            self.instances().len(),
            self.base_type_name().unwrap_or("<none>")
        );
    }

    /// Remove every instance
    pub fn unbind(&mut self) {
        self.bind(&[]);
    }

    /// Instances bound at the root
    pub fn instances(&self) -> &[ObjectRef] {
        self.nodes
            .get(self.root)
            .and_then(PropertyNode::as_object)
            .map(ObjectNode::instances)
            .unwrap_or(&[])
    }

    /// Most-derived type shared by every bound instance
    pub fn base_type(&self) -> Option<&Arc<TypeDescriptor>> {
        self.nodes
            .get(self.root)
            .and_then(PropertyNode::as_object)
            .and_then(ObjectNode::base_type)
    }

    fn base_type_name(&self) -> Option<&str> {
        self.base_type().map(|ty| ty.name.as_str())
    }

    /// The root object node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> Option<&PropertyNode> {
        self.nodes.get(id)
    }

    /// Children of a node, empty for unknown ids
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(PropertyNode::children).unwrap_or(&[])
    }

    /// Number of live nodes, including the root
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Currently visible nodes in display order
    pub fn visible_nodes(&self) -> &[NodeId] {
        &self.visible
    }

    /// Display name of a node
    pub fn display_name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id).map(PropertyNode::display_name)
    }

    /// The object host
    pub fn host(&self) -> &Arc<H> {
        &self.ctx.host
    }

    /// Active configuration
    pub fn config(&self) -> &InspectorConfig {
        &self.ctx.config
    }

    /// Number of full reconnects performed so far
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects
    }

    fn set_root_instances(&mut self, instances: Vec<ObjectRef>) {
        let base_type = build::common_base_type(self.ctx.host.as_ref(), &instances);
        if let Some(NodeKind::Object(object)) = self.nodes.get_mut(self.root).map(|n| &mut n.kind) {
            object.instances = instances;
            object.base_type = base_type;
        }
    }

    /// Recompute filter and seen flags, build newly visible lazy nodes,
    /// and regenerate the visible list
    pub(crate) fn refresh(&mut self) {
        loop {
            self.filter_tree();
            self.compute_seen();
            if !self.materialize_seen() {
                break;
            }
        }
        self.collect_visible();
    }

    /// Depth-first pre-order over a subtree
    pub(crate) fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }
}

impl<H: ObjectHost> fmt::Debug for PropertyTree<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyTree")
            .field("instances", &self.instances())
            .field("nodes", &self.nodes.len())
            .field("visible", &self.visible.len())
            .finish_non_exhaustive()
    }
}
