//! Multi-object comparison and default-value diff

use super::node::{NodeId, NodeKind};
use super::PropertyTree;
use crate::memory::{Address, MemoryReader};
use crate::reflection::{ObjectHost, ObjectRef, Reflection};
use crate::value;
use crate::{Error, Result};

/// Options for [`PropertyTree::resolve_read_addresses`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Fail when more than one instance is bound
    pub require_single_selection: bool,
    /// Compare values across instances; without this only references are
    /// compared and other values count as identical
    pub compare_contents: bool,
    /// Compare object references by target rather than by null-ness
    pub force_object_compare: bool,
    /// Allow bulk edits on arrays whose lengths differ across instances
    pub arrays_may_differ_in_size: bool,
}

/// One address per bound instance plus comparison results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAddresses {
    /// Base address of the node in each instance, in binding order
    pub addresses: Vec<Address>,
    /// Every instance holds the same value
    pub all_identical: bool,
    /// Every instance has the same array length
    pub uniform_shape: bool,
    /// An edit may be applied to every instance at once
    pub bulk_edit_allowed: bool,
}

impl<H: ObjectHost> PropertyTree<H> {
    /// Resolve a node's address in every instance bound above it
    pub fn resolve_read_addresses(&self, id: NodeId, options: ReadOptions) -> Result<ReadAddresses> {
        let node = self.nodes.get(id).ok_or(Error::InvalidNode)?;
        let instances = self.owning_instances(id);

        if instances.is_empty() {
            return Err(Error::NoInstances);
        }
        if options.require_single_selection && instances.len() > 1 {
            return Err(Error::MultipleSelection {
                count: instances.len(),
            });
        }

        let mut addresses = Vec::with_capacity(instances.len());
        for &instance in &instances {
            let address = self
                .resolve_base_address(id, instance.address())
                .ok_or_else(|| Error::AddressResolution {
                    path: self.qualified_path(id),
                    instance,
                })?;
            addresses.push(address);
        }

        let uniform_shape = self.has_uniform_shape(id, &instances);
        let all_identical = uniform_shape && self.values_identical(id, &addresses, options);

        if !node.is_object() && !all_identical {
            tracing::trace!("'{}' differs across {} objects", node.display_name, instances.len());
        }

        Ok(ReadAddresses {
            addresses,
            all_identical,
            uniform_shape,
            bulk_edit_allowed: uniform_shape || options.arrays_may_differ_in_size,
        })
    }

    /// Whether the node's value differs from its instances' archetype in
    /// any bound instance
    ///
    /// Instances without an archetype, or whose archetype's storage does
    /// not reach the node's top-level member, match by definition.
    pub fn differs_from_default(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        let Some(property) = node.property.as_ref() else {
            return false;
        };

        let count = node.value_count();
        let host = self.ctx.host.as_ref();

        for instance in self.owning_instances(id) {
            let Some(archetype) = self.default_source(id, instance) else {
                continue;
            };

            let current = self.resolve_base_address(id, instance.address());
            let default = self.resolve_base_address(id, archetype.address());
            match (current, default) {
                (Some(current), Some(default)) => {
                    if !value::identical(host, property, current, default, count).unwrap_or(false) {
                        return true;
                    }
                }
                _ => return true,
            }
        }
        false
    }

    /// Instances bound by the nearest object root above a node
    pub(super) fn owning_instances(&self, id: NodeId) -> Vec<ObjectRef> {
        self.owning_object(id)
            .and_then(|o| self.nodes.get(o))
            .and_then(|n| n.as_object())
            .map(|o| o.instances.clone())
            .unwrap_or_default()
    }

    /// The archetype holding the default for a node in one instance
    pub(super) fn default_source(&self, id: NodeId, instance: ObjectRef) -> Option<ObjectRef> {
        let host = self.ctx.host.as_ref();
        let archetype = host.archetype_of(instance)?;
        let archetype_class = host.class_of(archetype)?;
        let instance_class = host.class_of(instance)?;

        if archetype_class.name == instance_class.name {
            return Some(archetype);
        }

        let member = self.nodes.get(self.top_member(id))?;
        let property = member.property.as_ref()?;
        (member.offset + property.total_size() <= archetype_class.size).then_some(archetype)
    }

    /// Outermost item above a node that is still inside the same object
    fn top_member(&self, id: NodeId) -> NodeId {
        let mut top = id;
        while let Some(parent) = self.nodes.get(top).and_then(|n| n.parent) {
            match self.nodes.get(parent).map(|n| &n.kind) {
                Some(NodeKind::Item(_)) => top = parent,
                _ => break,
            }
        }
        top
    }

    /// Every dynamic array between `id` and its owning object, `id`
    /// included, has the same length across instances
    fn has_uniform_shape(&self, id: NodeId, instances: &[ObjectRef]) -> bool {
        let mut current = Some(id);
        while let Some(candidate) = current {
            let Some(node) = self.nodes.get(candidate) else {
                return false;
            };
            if node.is_object() {
                break;
            }
            if node.is_dynamic_array() && !self.array_lengths_agree(candidate, instances) {
                return false;
            }
            current = node.parent;
        }
        true
    }

    fn array_lengths_agree(&self, array: NodeId, instances: &[ObjectRef]) -> bool {
        let mut lengths = instances.iter().map(|instance| {
            self.resolve_base_address(array, instance.address())
                .and_then(|address| self.ctx.host.read_array_header(address).ok())
                .map(|header| header.len())
        });

        match lengths.next() {
            Some(Some(first)) => lengths.all(|len| len == Some(first)),
            Some(None) => false,
            None => true,
        }
    }

    fn values_identical(&self, id: NodeId, addresses: &[Address], options: ReadOptions) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        let Some(property) = node.property.as_ref() else {
            return true;
        };
        let Some((&first, rest)) = addresses.split_first() else {
            return true;
        };

        let host = self.ctx.host.as_ref();

        if property.kind.is_reference() && !node.is_static_array_header() {
            let target = |address: Address| host.read_pointer(address).ok().flatten();
            let first_target = target(first);
            return rest.iter().all(|&address| {
                if options.force_object_compare {
                    target(address) == first_target
                } else {
                    target(address).is_some() == first_target.is_some()
                }
            });
        }

        if !options.compare_contents {
            return true;
        }

        let count = node.value_count();
        rest.iter()
            .all(|&address| value::identical(host, property, first, address, count).unwrap_or(false))
    }
}
