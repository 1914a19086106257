//! Address resolution
//!
//! Every node resolves to an address inside one bound instance by walking
//! up to its owning object root: object roots start at the instance,
//! categories share their parent's storage, members add their offset, and
//! dynamic array elements go through the array header's data pointer.

use super::node::{ItemRole, NodeId, NodeKind};
use super::PropertyTree;
use crate::memory::{Address, MemoryReader};
use crate::reflection::ObjectHost;

impl<H: ObjectHost> PropertyTree<H> {
    /// Address of a node's own storage for the instance starting at `start`
    ///
    /// For dynamic arrays this is the address of the array header. Returns
    /// `None` when any step leaves valid memory, or when an array element
    /// index is past the live length.
    pub fn resolve_base_address(&self, id: NodeId, start: Address) -> Option<Address> {
        let node = self.nodes.get(id)?;
        let host = self.ctx.host.as_ref();

        let address = match &node.kind {
            NodeKind::Object(_) => {
                return (start != 0 && host.is_valid_address(start)).then_some(start);
            }
            NodeKind::Category { .. } => return self.resolve_value_address(node.parent?, start),
            NodeKind::Item(ItemRole::DynamicElement) => {
                let header_address = self.resolve_base_address(node.parent?, start)?;
                let header = host.read_array_header(header_address).ok()?;
                if node.array_index? >= header.len() {
                    return None;
                }
                header.data_address()? + node.offset
            }
            NodeKind::Item(_) => self.resolve_value_address(node.parent?, start)? + node.offset,
        };

        let size = node.property.as_ref().map_or(1, |p| p.element_size);
        host.is_valid_range(address, size).then_some(address)
    }

    /// Address children of a node are relative to
    ///
    /// Same as the base address except for dynamic arrays, whose value is
    /// the element data the header points at. Empty arrays have none.
    pub fn resolve_value_address(&self, id: NodeId, start: Address) -> Option<Address> {
        let base = self.resolve_base_address(id, start)?;
        let node = self.nodes.get(id)?;

        if node.is_dynamic_array() {
            let header = self.ctx.host.read_array_header(base).ok()?;
            header.data_address()
        } else {
            Some(base)
        }
    }

    /// Nearest object root at or above a node
    pub fn owning_object(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            let node = self.nodes.get(candidate)?;
            if node.is_object() {
                return Some(candidate);
            }
            current = node.parent;
        }
        None
    }
}
