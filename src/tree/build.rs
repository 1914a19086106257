//! Child construction
//!
//! Each node builds its own children from reflection data: object roots
//! create top-level categories (or items when grouping is off), categories
//! create sub-categories and their items, and items dispatch on the
//! property kind.

use super::compare::ReadOptions;
use super::node::{
    ExpectedChildShape, ItemRole, NodeId, NodeKind, ObjectNode, PropertyNode, Truncation,
};
use super::path::sanitize_display_name;
use super::PropertyTree;
use crate::memory::MemoryReader;
use crate::reflection::{
    ObjectHost, ObjectRef, PropertyDescriptor, PropertyFlags, PropertyKind, Reflection,
    TypeDescriptor,
};
use std::sync::Arc;

/// Struct types whose members keep declaration order
const COLOR_TYPES: [&str; 2] = ["Color", "LinearColor"];

/// Struct type whose members are shown in a fixed canonical order
const ROTATOR_TYPE: &str = "Rotator";
const ROTATOR_ORDER: [&str; 3] = ["Roll", "Pitch", "Yaw"];

/// Most-derived type shared by every live instance
pub(super) fn common_base_type<H: ObjectHost>(
    host: &H,
    instances: &[ObjectRef],
) -> Option<Arc<TypeDescriptor>> {
    let classes: Vec<_> = instances.iter().filter_map(|&o| host.class_of(o)).collect();
    host.registry()
        .common_base_type(classes.iter().map(|c| c.name.as_str()))
}

fn object_display_name<H: ObjectHost>(host: &H, object: &ObjectNode) -> String {
    match object.instances.as_slice() {
        [] => "None".to_string(),
        [single] => host
            .object_name(*single)
            .unwrap_or_else(|| single.to_string()),
        many => {
            let type_name = object.base_type.as_ref().map_or("Object", |ty| ty.name.as_str());
            format!("{} ({} objects)", type_name, many.len())
        }
    }
}

/// Uncategorized properties group under their declaring type
fn effective_category(property: &PropertyDescriptor) -> &str {
    if property.category.is_empty() {
        &property.owner
    } else {
        &property.category
    }
}

fn new_item(
    parent: NodeId,
    role: ItemRole,
    property: Arc<PropertyDescriptor>,
    offset: usize,
    array_index: Option<usize>,
) -> PropertyNode {
    let display_name = match array_index {
        Some(index) => format!("[{index}]"),
        None => sanitize_display_name(&property.name, property.is_bool()),
    };

    let mut node = PropertyNode::item(parent, role, property, offset, array_index);
    node.display_name = display_name;
    node
}

impl<H: ObjectHost> PropertyTree<H> {
    /// Rebuild the whole tree below the root from the bound instances
    pub(super) fn rebuild_root(&mut self) {
        let root = self.root;
        self.destroy_children(root);
        if let Some(node) = self.nodes.get_mut(root) {
            node.expansion.materialized = false;
        }
        self.init_node(root);
    }

    /// Derive inherited state and flags for a freshly inserted node, then
    /// build its children
    pub(super) fn init_node(&mut self, id: NodeId) {
        let config = &self.ctx.config;
        let parent = self
            .nodes
            .get(id)
            .and_then(|n| n.parent)
            .and_then(|p| self.nodes.get(p));

        let (force_script_order, depth, edit_const) = match parent {
            Some(parent) => (
                parent.ordering.force_script_order,
                parent.depth_remaining.map(|d| d.saturating_sub(1)),
                parent.edit_const,
            ),
            None => (false, config.max_child_depth, config.read_only),
        };
        let sorted = config.sorted;

        let host = Arc::clone(&self.ctx.host);
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };

        node.ordering.sort_children = sorted;
        node.ordering.force_script_order = force_script_order;
        node.depth_remaining = depth;
        node.edit_const = edit_const;

        if let Some(property) = node.property.clone() {
            if let Some(limit) = property.meta.max_depth.filter(|&d| d > 0) {
                node.depth_remaining = Some(node.depth_remaining.map_or(limit, |d| d.min(limit)));
            }
            if property.meta.force_script_order {
                node.ordering.force_script_order = true;
            }

            node.expansion.on_demand = !property.is_editable() && node.array_index.is_none();
            node.edit_const |= property.flags.contains(PropertyFlags::EDIT_CONST);
            node.shape = if node.is_static_array_header() {
                ExpectedChildShape::Fixed
            } else if property.kind.is_dynamic_array() {
                ExpectedChildShape::ArrayElements
            } else if property.is_edit_inline() {
                ExpectedChildShape::ObjectReference
            } else {
                ExpectedChildShape::Fixed
            };
        }

        if let NodeKind::Object(object) = &node.kind {
            node.display_name = object_display_name(host.as_ref(), object);
        }

        self.init_expansion_flags(id);
        self.rebuild_children(id);
    }

    /// Decide whether a node can have children at all
    pub(super) fn init_expansion_flags(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };

        let expandable = match (&node.kind, &node.property) {
            (NodeKind::Object(_), _) | (NodeKind::Category { .. }, _) => true,
            (NodeKind::Item(_), None) => false,
            (NodeKind::Item(_), Some(_)) if node.is_static_array_header() => true,
            (NodeKind::Item(_), Some(property)) => match &property.kind {
                PropertyKind::Scalar(_) => false,
                PropertyKind::Struct { .. } => true,
                PropertyKind::Array { .. } => {
                    self.resolve_read_addresses(id, ReadOptions::default()).is_ok()
                }
                PropertyKind::Object { .. } | PropertyKind::Interface { .. } => {
                    property.is_edit_inline()
                        && self.resolve_read_addresses(id, ReadOptions::default()).is_ok()
                }
            },
        };

        if let Some(node) = self.nodes.get_mut(id) {
            node.expansion.expandable = expandable;
            if node.is_object() {
                node.expansion.expanded = true;
            }
        }
    }

    /// Destroy and rebuild a node's children
    pub(super) fn rebuild_children(&mut self, id: NodeId) {
        self.destroy_children(id);

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.expansion.materialized = false;
        node.expansion.truncation = None;

        if node.expansion.on_demand && !node.expansion.ever_expanded {
            return;
        }

        if node.depth_remaining == Some(0) {
            if node.expansion.expandable {
                node.expansion.expandable = false;
                node.expansion.truncation = Some(Truncation::DepthExhausted);
                tracing::debug!("Depth limit reached at '{}', not building children", node.display_name);
            }
            return;
        }

        if !node.expansion.expandable {
            return;
        }

        match node.kind.clone() {
            NodeKind::Object(object) => self.build_object_children(id, &object),
            NodeKind::Category { name } => self.build_category_children(id, &name),
            NodeKind::Item(_) => self.build_item_children(id),
        }

        let fully_expand = match self.nodes.get_mut(id) {
            Some(node) => {
                node.expansion.materialized = true;
                node.property.as_ref().is_some_and(|p| p.meta.fully_expand)
            }
            None => return,
        };

        self.sort_children(id);

        if fully_expand {
            self.set_expanded_internal(id, true, true, false);
        }
    }

    /// Insert a child, attach it and initialize it
    fn add_child(&mut self, parent: NodeId, node: PropertyNode) -> NodeId {
        let id = self.nodes.insert(node);
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.push(id);
        }
        self.init_node(id);
        id
    }

    /// Destroy every descendant of a node
    pub(super) fn destroy_children(&mut self, id: NodeId) {
        let mut stack = match self.nodes.get_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };

        while let Some(child) = stack.pop() {
            if let Some(node) = self.nodes.remove(child) {
                stack.extend(node.children);
            }
        }
    }

    /// Properties of a type that pass the edit-visibility predicate and are
    /// not in a hidden category
    fn visible_properties(&self, type_name: &str) -> Vec<Arc<PropertyDescriptor>> {
        let registry = self.ctx.host.registry();
        let hidden = registry.hidden_categories(type_name);
        let show_non_editable = self.ctx.config.show_non_editable;

        registry
            .all_properties(type_name)
            .into_iter()
            .filter(|p| show_non_editable || p.is_editable())
            .filter(|p| {
                let category = effective_category(p);
                !hidden.iter().any(|h| {
                    category == h
                        || category
                            .strip_prefix(h.as_str())
                            .is_some_and(|rest| rest.starts_with('.'))
                })
            })
            .collect()
    }

    fn shows_categories(&self, type_name: &str) -> bool {
        self.ctx.config.show_categories && !self.ctx.host.registry().collapses_categories(type_name)
    }

    fn build_object_children(&mut self, id: NodeId, object: &ObjectNode) {
        let Some(base_type) = object.base_type.as_ref() else {
            return;
        };

        let properties = self.visible_properties(&base_type.name);

        if self.shows_categories(&base_type.name) {
            let mut categories: Vec<&str> = Vec::new();
            for property in &properties {
                let top = effective_category(property).split('.').next().unwrap_or_default();
                if !categories.contains(&top) {
                    categories.push(top);
                }
            }

            for name in categories {
                let mut category = PropertyNode::new(Some(id), NodeKind::Category { name: name.to_string() });
                category.display_name = name.to_string();
                self.add_child(id, category);
            }
        } else {
            for property in properties {
                let offset = property.offset;
                self.add_child(id, new_item(id, ItemRole::Member, property, offset, None));
            }
        }
    }

    fn build_category_children(&mut self, id: NodeId, name: &str) {
        let Some(base_type) = self
            .owning_object(id)
            .and_then(|o| self.nodes.get(o))
            .and_then(PropertyNode::as_object)
            .and_then(|o| o.base_type.clone())
        else {
            return;
        };

        let properties = self.visible_properties(&base_type.name);
        let prefix = format!("{name}.");

        let mut subcategories: Vec<&str> = Vec::new();
        for property in &properties {
            if let Some(rest) = effective_category(property).strip_prefix(prefix.as_str()) {
                let segment = rest.split('.').next().unwrap_or_default();
                if !subcategories.contains(&segment) {
                    subcategories.push(segment);
                }
            }
        }

        for segment in subcategories {
            let mut category = PropertyNode::new(
                Some(id),
                NodeKind::Category {
                    name: format!("{prefix}{segment}"),
                },
            );
            category.display_name = segment.to_string();
            self.add_child(id, category);
        }

        for property in properties.iter().filter(|p| effective_category(p) == name) {
            let offset = property.offset;
            self.add_child(id, new_item(id, ItemRole::Member, Arc::clone(property), offset, None));
        }
    }

    fn build_item_children(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let Some(property) = node.property.clone() else {
            return;
        };

        if node.is_static_array_header() {
            node.ordering.sort_children = false;
            for index in 0..property.array_dim {
                let offset = index * property.element_size;
                let child = new_item(id, ItemRole::StaticElement, Arc::clone(&property), offset, Some(index));
                self.add_child(id, child);
            }
            return;
        }

        match &property.kind {
            PropertyKind::Scalar(_) => {}
            PropertyKind::Array { inner } => {
                node.ordering.sort_children = false;

                let Ok(read) = self.resolve_read_addresses(id, ReadOptions::default()) else {
                    return;
                };
                let len = self
                    .ctx
                    .host
                    .read_array_header(read.addresses[0])
                    .map_or(0, |header| header.len());

                for index in 0..len {
                    let offset = index * inner.element_size;
                    let child = new_item(id, ItemRole::DynamicElement, Arc::clone(inner), offset, Some(index));
                    self.add_child(id, child);
                }
            }
            PropertyKind::Struct { type_name } => {
                let rotator = type_name == ROTATOR_TYPE;
                if COLOR_TYPES.contains(&type_name.as_str()) {
                    node.ordering.sort_children = false;
                } else if rotator {
                    node.ordering.sort_children = true;
                    node.ordering.force_script_order = true;
                }

                let show_non_editable = self.ctx.config.show_non_editable;
                let members = self.ctx.host.registry().all_properties(type_name);
                for member in members.into_iter().filter(|m| show_non_editable || m.is_editable()) {
                    let offset = member.offset;
                    let canonical = rotator
                        .then(|| ROTATOR_ORDER.iter().position(|n| *n == member.name))
                        .flatten();

                    let mut child = new_item(id, ItemRole::Member, member, offset, None);
                    if let Some(position) = canonical {
                        child.order_index = Some(position as i32);
                    }
                    self.add_child(id, child);
                }
            }
            PropertyKind::Object { .. } | PropertyKind::Interface { .. } => {
                self.build_reference_children(id);
            }
        }
    }

    fn build_reference_children(&mut self, id: NodeId) {
        let Ok(read) = self.resolve_read_addresses(id, ReadOptions::default()) else {
            return;
        };
        let host = Arc::clone(&self.ctx.host);

        let target = match host.read_pointer(read.addresses[0]) {
            Ok(Some(address)) => ObjectRef::from_address(address),
            _ => return,
        };
        if !host.is_live(target) {
            tracing::debug!("Reference at {:?} points at destroyed object {}", id, target);
            return;
        }

        if self.is_bound_by_ancestor(id, target) {
            if let Some(node) = self.nodes.get_mut(id) {
                node.expansion.truncation = Some(Truncation::CircularReference);
                tracing::debug!(
                    "Circular reference to {} at '{}', not expanding",
                    target,
                    node.display_name
                );
            }
            return;
        }

        let mut instances = Vec::with_capacity(read.addresses.len());
        for &address in &read.addresses {
            if let Ok(Some(pointer)) = host.read_pointer(address) {
                let object = ObjectRef::from_address(pointer);
                if host.is_live(object) && !instances.contains(&object) {
                    instances.push(object);
                }
            }
        }

        let base_type = common_base_type(host.as_ref(), &instances);
        let child = PropertyNode::new(Some(id), NodeKind::Object(ObjectNode { instances, base_type }));
        self.add_child(id, child);
    }

    /// Whether any object root above `id` already binds `target`
    pub(super) fn is_bound_by_ancestor(&self, id: NodeId, target: ObjectRef) -> bool {
        let mut current = self.nodes.get(id).and_then(|n| n.parent);
        while let Some(ancestor) = current {
            let Some(node) = self.nodes.get(ancestor) else {
                return false;
            };
            if node.as_object().is_some_and(|o| o.instances.contains(&target)) {
                return true;
            }
            current = node.parent;
        }
        false
    }

    /// Order children by name, or by declared order index under script order
    pub(super) fn sort_children(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if !node.ordering.sort_children {
            return;
        }

        let script_order = node.ordering.force_script_order || self.ctx.config.use_script_defined_order;
        let mut keyed: Vec<(NodeId, i32, String)> = node
            .children
            .iter()
            .filter_map(|&child| {
                let child_node = self.nodes.get(child)?;
                Some((
                    child,
                    child_node.order_index.unwrap_or(i32::MAX),
                    child_node.display_name.to_lowercase(),
                ))
            })
            .collect();

        if script_order {
            keyed.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.2.cmp(&b.2)));
        } else {
            keyed.sort_by(|a, b| a.2.cmp(&b.2));
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.children = keyed.into_iter().map(|(child, _, _)| child).collect();
        }
    }
}
