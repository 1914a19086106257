//! Value access and edits
//!
//! Values are read and written as text through [`crate::value`]. Every
//! write goes to all bound instances at once and is bracketed by
//! [`ChangeObserver`] notifications.

use super::compare::ReadOptions;
use super::node::NodeId;
use super::PropertyTree;
use crate::memory::{resize_array, Address, MemoryError, MemoryReader, MemoryWriter};
use crate::reflection::{ObjectHost, ObjectRef, PropertyDescriptor, PropertyFlags, PropertyKind};
use crate::value;
use crate::{Error, Result};
use std::sync::Arc;

/// What a node's value looks like across the bound instances
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayValue {
    /// Every instance holds this value
    Value(String),
    /// The instances disagree
    MultipleValues,
    /// The value cannot be read
    Unavailable,
}

/// Structural edits on a dynamic array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayEdit {
    /// Append a zeroed element
    Add,
    /// Remove every element
    Empty,
    /// Insert a zeroed element before the index
    Insert(usize),
    /// Remove the element at the index
    Delete(usize),
    /// Insert a deep copy of the element after it
    Duplicate(usize),
}

/// Kind of change reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A value was imported from text
    ValueSet,
    /// An element was appended
    ArrayAdd,
    /// An array was emptied
    ArrayEmpty,
    /// An element was inserted
    ArrayInsert,
    /// An element was removed
    ArrayDelete,
    /// An element was duplicated
    ArrayDuplicate,
    /// A value was reset to its archetype's
    ResetToDefault,
}

impl From<ArrayEdit> for ChangeKind {
    fn from(edit: ArrayEdit) -> Self {
        match edit {
            ArrayEdit::Add => ChangeKind::ArrayAdd,
            ArrayEdit::Empty => ChangeKind::ArrayEmpty,
            ArrayEdit::Insert(_) => ChangeKind::ArrayInsert,
            ArrayEdit::Delete(_) => ChangeKind::ArrayDelete,
            ArrayEdit::Duplicate(_) => ChangeKind::ArrayDuplicate,
        }
    }
}

/// Description of one edit
#[derive(Debug, Clone)]
pub struct PropertyChange {
    /// Qualified path of the edited node
    pub path: String,
    /// The edited property
    pub property: Arc<PropertyDescriptor>,
    /// Objects whose memory changes
    pub objects: Vec<ObjectRef>,
    /// What happened
    pub kind: ChangeKind,
}

/// Receives notifications around every edit
pub trait ChangeObserver: Send {
    /// Called before any instance is modified
    fn pre_change(&mut self, _change: &PropertyChange) {}

    /// Called after every instance has been modified
    fn post_change(&mut self, _change: &PropertyChange) {}
}

impl<H: ObjectHost> PropertyTree<H> {
    /// Text of a node's value, or [`DisplayValue::MultipleValues`] when the
    /// instances disagree
    pub fn value_text(&self, id: NodeId) -> DisplayValue {
        let Some(node) = self.nodes.get(id) else {
            return DisplayValue::Unavailable;
        };
        let Some(property) = node.property.as_ref() else {
            return DisplayValue::Unavailable;
        };

        let options = ReadOptions {
            compare_contents: true,
            force_object_compare: true,
            ..ReadOptions::default()
        };

        match self.resolve_read_addresses(id, options) {
            Ok(read) if read.all_identical => {
                match value::export_text(self.ctx.host.as_ref(), property, read.addresses[0], node.value_count()) {
                    Ok(text) => DisplayValue::Value(text),
                    Err(e) => {
                        tracing::debug!("Cannot export '{}': {}", node.display_name, e);
                        DisplayValue::Unavailable
                    }
                }
            }
            Ok(_) => DisplayValue::MultipleValues,
            Err(_) => DisplayValue::Unavailable,
        }
    }

    /// Import `text` into the node's value in every bound instance
    pub fn set_value_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        let (property, count) = self.editable_property(id)?;
        let read = self.resolve_read_addresses(
            id,
            ReadOptions {
                arrays_may_differ_in_size: true,
                ..ReadOptions::default()
            },
        )?;

        value::check_text(self.ctx.host.as_ref(), &property, count, text)?;

        let change = self.change(id, &property, ChangeKind::ValueSet);
        self.notify_pre(&change);
        let written = read
            .addresses
            .iter()
            .try_for_each(|&address| value::import_text(self.ctx.host.as_ref(), &property, address, count, text));
        self.notify_post(&change);

        // Some instances may have been written before a failure
        if let Err(e) = written {
            tracing::warn!("Setting '{}' failed part way: {}", change.path, e);
            self.after_edit(id)?;
            return Err(e);
        }

        tracing::debug!("Set '{}' to {}", change.path, text);
        self.after_edit(id)
    }

    /// Apply a structural edit to a dynamic array node
    ///
    /// Adding and emptying work even when the instances disagree on the
    /// length; index-based edits need every instance to agree.
    pub fn edit_array(&mut self, id: NodeId, edit: ArrayEdit) -> Result<()> {
        let (property, _) = self.editable_property(id)?;
        let path = self.qualified_path(id);

        let inner = match (&property.kind, self.nodes.get(id).is_some_and(|n| n.is_dynamic_array())) {
            (PropertyKind::Array { inner }, true) => Arc::clone(inner),
            _ => return Err(Error::NotAnArray(path)),
        };
        if property.flags.contains(PropertyFlags::EDIT_FIXED_SIZE) {
            return Err(Error::FixedSizeArray(path));
        }

        let read = self.resolve_read_addresses(
            id,
            ReadOptions {
                arrays_may_differ_in_size: matches!(edit, ArrayEdit::Add | ArrayEdit::Empty),
                ..ReadOptions::default()
            },
        )?;
        if !read.bulk_edit_allowed {
            return Err(Error::ArrayShapeMismatch(path));
        }

        if let ArrayEdit::Insert(index) | ArrayEdit::Delete(index) | ArrayEdit::Duplicate(index) = edit {
            let len = self.ctx.host.read_array_header(read.addresses[0])?.len();
            let limit = if matches!(edit, ArrayEdit::Insert(_)) { len + 1 } else { len };
            if index >= limit {
                return Err(Error::IndexOutOfBounds { path, index, len });
            }
        }

        let change = self.change(id, &property, edit.into());
        self.notify_pre(&change);
        for &address in &read.addresses {
            self.apply_array_edit(address, &inner, edit)?;
        }
        self.notify_post(&change);

        tracing::debug!("{:?} on '{}'", edit, change.path);
        self.after_edit(id)
    }

    fn apply_array_edit(&self, header_address: Address, inner: &PropertyDescriptor, edit: ArrayEdit) -> Result<()> {
        let host = self.ctx.host.as_ref();
        let size = inner.element_size;
        let len = host.read_array_header(header_address)?.len();

        match edit {
            ArrayEdit::Add => {
                resize_array(host, header_address, len + 1, size)?;
            }
            ArrayEdit::Empty => {
                resize_array(host, header_address, 0, size)?;
            }
            ArrayEdit::Insert(index) => {
                self.open_gap(header_address, len, index, size)?;
            }
            ArrayEdit::Delete(index) => {
                let header = host.read_array_header(header_address)?;
                if let Some(data) = header.data_address() {
                    let tail = (len - index - 1) * size;
                    if tail > 0 {
                        let bytes = host.read_bytes(data + (index + 1) * size, tail)?;
                        host.write_bytes(data + index * size, &bytes)?;
                    }
                }
                resize_array(host, header_address, len - 1, size)?;
            }
            ArrayEdit::Duplicate(index) => {
                let data = self.open_gap(header_address, len, index + 1, size)?;
                let text = value::export_value(host, &inner.kind, data + index * size)?;
                value::import_value(host, &inner.kind, data + (index + 1) * size, &text)?;
            }
        }
        Ok(())
    }

    /// Grow the array by one and leave a zeroed element at `index`;
    /// returns the new data address
    fn open_gap(&self, header_address: Address, len: usize, index: usize, size: usize) -> Result<Address> {
        let host = self.ctx.host.as_ref();
        let header = resize_array(host, header_address, len + 1, size)?;
        let data = header
            .data_address()
            .ok_or(MemoryError::InvalidAddress(header_address))?;

        let tail = (len - index) * size;
        if tail > 0 {
            let bytes = host.read_bytes(data + index * size, tail)?;
            host.write_bytes(data + (index + 1) * size, &bytes)?;
            host.write_bytes(data + index * size, &vec![0u8; size])?;
        }
        Ok(data)
    }

    /// Copy the archetype's value into every instance that differs
    ///
    /// Returns whether anything changed.
    pub fn reset_to_default(&mut self, id: NodeId) -> Result<bool> {
        let (property, count) = self.editable_property(id)?;
        if !self.differs_from_default(id) {
            return Ok(false);
        }

        let host = Arc::clone(&self.ctx.host);
        let mut targets = Vec::new();
        for instance in self.owning_instances(id) {
            let Some(archetype) = self.default_source(id, instance) else {
                continue;
            };
            let current = self.resolve_base_address(id, instance.address());
            let default = self.resolve_base_address(id, archetype.address());
            if let (Some(current), Some(default)) = (current, default) {
                targets.push((current, default));
            }
        }

        let change = self.change(id, &property, ChangeKind::ResetToDefault);
        self.notify_pre(&change);
        for (current, default) in targets {
            let text = value::export_text(host.as_ref(), &property, default, count)?;
            value::import_text(host.as_ref(), &property, current, count, &text)?;
        }
        self.notify_post(&change);

        tracing::debug!("Reset '{}' to default", change.path);
        self.after_edit(id)?;
        Ok(true)
    }

    /// The node's property and value count, if it may be edited
    fn editable_property(&self, id: NodeId) -> Result<(Arc<PropertyDescriptor>, usize)> {
        let node = self.nodes.get(id).ok_or(Error::InvalidNode)?;
        let property = node.property.clone().ok_or(Error::InvalidNode)?;

        if self.ctx.config.read_only || node.edit_const {
            return Err(Error::EditConst(self.qualified_path(id)));
        }
        Ok((property, node.value_count()))
    }

    fn change(&self, id: NodeId, property: &Arc<PropertyDescriptor>, kind: ChangeKind) -> PropertyChange {
        PropertyChange {
            path: self.qualified_path(id),
            property: Arc::clone(property),
            objects: self.owning_instances(id),
            kind,
        }
    }

    fn notify_pre(&mut self, change: &PropertyChange) {
        for observer in &mut self.ctx.observers {
            observer.pre_change(change);
        }
    }

    fn notify_post(&mut self, change: &PropertyChange) {
        for observer in &mut self.ctx.observers {
            observer.post_change(change);
        }
    }

    /// Rebuild what an edit may have reshaped
    fn after_edit(&mut self, id: NodeId) -> Result<()> {
        let reshaped = self
            .nodes
            .get(id)
            .is_some_and(|n| n.is_expandable() || n.expected_shape() != super::ExpectedChildShape::Fixed);

        if reshaped {
            self.rebuild_subtree(id)
        } else {
            self.refresh();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::Fixture;
    use super::super::EditorContext;
    use super::*;
    use crate::config::InspectorConfig;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<(String, ChangeKind, bool)>>>,
    }

    impl ChangeObserver for Recorder {
        fn pre_change(&mut self, change: &PropertyChange) {
            self.events.lock().push((change.path.clone(), change.kind, false));
        }

        fn post_change(&mut self, change: &PropertyChange) {
            self.events.lock().push((change.path.clone(), change.kind, true));
        }
    }

    #[test]
    fn test_value_text_single_and_multiple() {
        let fx = Fixture::new();
        let a = fx.pawn("A");
        let b = fx.pawn("B");
        fx.world.set(a, "Health", 10i32).unwrap();
        fx.world.set(b, "Health", 10i32).unwrap();
        fx.world.set(a, "Location.X", 1.5f32).unwrap();

        let tree = fx.tree(&[a, b]);
        let health = tree.find_node_by_path("Stats.Health").unwrap();
        let location = tree.find_node_by_path("Movement.Location").unwrap();

        assert_eq!(tree.value_text(health), DisplayValue::Value("10".to_string()));
        assert_eq!(tree.value_text(location), DisplayValue::MultipleValues);
        assert_eq!(tree.value_text(tree.root()), DisplayValue::Unavailable);
    }

    #[test]
    fn test_set_value_writes_every_instance() {
        let fx = Fixture::new();
        let a = fx.pawn("A");
        let b = fx.pawn("B");
        let events = Arc::new(Mutex::new(Vec::new()));
        let observer = Recorder {
            events: Arc::clone(&events),
        };

        let ctx = EditorContext::new(
            Arc::clone(&fx.world),
            InspectorConfig::default(),
            Box::new(fx.store.clone()),
        )
        .with_observer(Box::new(observer));
        let mut tree = PropertyTree::new(ctx);
        tree.bind(&[a, b]);

        let location = tree.find_node_by_path("Movement.Location").unwrap();
        tree.set_value_text(location, "(X=1,Y=2,Z=3)").unwrap();

        assert_eq!(fx.world.get::<f32>(a, "Location.Y").unwrap(), 2.0);
        assert_eq!(fx.world.get::<f32>(b, "Location.Z").unwrap(), 3.0);
        assert_eq!(
            *events.lock(),
            [
                ("Movement.Location".to_string(), ChangeKind::ValueSet, false),
                ("Movement.Location".to_string(), ChangeKind::ValueSet, true),
            ]
        );
    }

    #[test]
    fn test_read_only_rejects_edits() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");

        let mut tree = fx.tree_with(&[pawn], |config| config.read_only = true);
        let health = tree.find_node_by_path("Stats.Health").unwrap();
        assert!(matches!(tree.set_value_text(health, "5"), Err(Error::EditConst(_))));

        let mut tree = fx.tree(&[pawn]);
        let armor = tree.find_node_by_path("Stats.Armor").unwrap();
        assert!(tree.node(armor).unwrap().is_edit_const());
        assert!(matches!(tree.set_value_text(armor, "5"), Err(Error::EditConst(_))));
    }

    #[test]
    fn test_bad_text_is_rejected() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        let health = tree.find_node_by_path("Stats.Health").unwrap();
        assert!(matches!(
            tree.set_value_text(health, "lots"),
            Err(Error::ValueImport { .. })
        ));
    }

    #[test]
    fn test_rejected_array_text_leaves_tree_and_memory_alone() {
        let fx = Fixture::new();
        let a = fx.pawn("A");
        let b = fx.pawn("B");
        for pawn in [a, b] {
            fx.world.set_array_len(pawn, "Tags", 2).unwrap();
            fx.world.set(pawn, "Tags[1]", 5i32).unwrap();
        }
        let events = Arc::new(Mutex::new(Vec::new()));
        let observer = Recorder {
            events: Arc::clone(&events),
        };

        let ctx = EditorContext::new(
            Arc::clone(&fx.world),
            InspectorConfig::default(),
            Box::new(fx.store.clone()),
        )
        .with_observer(Box::new(observer));
        let mut tree = PropertyTree::new(ctx);
        tree.bind(&[a, b]);

        let tags = tree.find_node_by_path("Stats.Tags").unwrap();
        tree.set_expanded(tags, true).unwrap();
        assert!(matches!(
            tree.set_value_text(tags, "(1,x,3)"),
            Err(Error::ValueImport { .. })
        ));

        for pawn in [a, b] {
            assert_eq!(fx.world.array_len(pawn, "Tags").unwrap(), 2);
            assert_eq!(fx.world.get::<i32>(pawn, "Tags[1]").unwrap(), 5);
        }
        assert_eq!(tree.children(tags).len(), 2);
        assert!(tree.is_all_data_valid());
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_array_edits() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        let tags = tree.find_node_by_path("Stats.Tags").unwrap();
        tree.set_value_text(tags, "(1,2,3)").unwrap();
        let tags = tree.find_node_by_path("Stats.Tags").unwrap();
        assert_eq!(tree.children(tags).len(), 3);

        tree.edit_array(tags, ArrayEdit::Insert(1)).unwrap();
        assert_eq!(tree.value_text(tags), DisplayValue::Value("(1,0,2,3)".to_string()));

        tree.edit_array(tags, ArrayEdit::Delete(0)).unwrap();
        assert_eq!(tree.value_text(tags), DisplayValue::Value("(0,2,3)".to_string()));

        tree.edit_array(tags, ArrayEdit::Duplicate(2)).unwrap();
        assert_eq!(tree.value_text(tags), DisplayValue::Value("(0,2,3,3)".to_string()));

        tree.edit_array(tags, ArrayEdit::Add).unwrap();
        assert_eq!(tree.children(tags).len(), 5);

        assert!(matches!(
            tree.edit_array(tags, ArrayEdit::Delete(5)),
            Err(Error::IndexOutOfBounds { index: 5, len: 5, .. })
        ));

        tree.edit_array(tags, ArrayEdit::Empty).unwrap();
        assert_eq!(tree.value_text(tags), DisplayValue::Value("()".to_string()));
        assert!(tree.children(tags).is_empty());
        assert!(tree.is_all_data_valid());
    }

    #[test]
    fn test_duplicate_deep_copies_nested_arrays() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        let loadouts = tree.find_node_by_path("Stats.Loadouts").unwrap();
        tree.set_value_text(loadouts, "((Items=(1,2)))").unwrap();
        tree.edit_array(loadouts, ArrayEdit::Duplicate(0)).unwrap();

        let first: crate::memory::ArrayHeader = fx.world.get(pawn, "Loadouts[0].Items").unwrap();
        let second: crate::memory::ArrayHeader = fx.world.get(pawn, "Loadouts[1].Items").unwrap();
        assert_eq!(second.len(), 2);
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn test_index_edits_need_uniform_arrays() {
        let fx = Fixture::new();
        let a = fx.pawn("A");
        let b = fx.pawn("B");
        fx.world.set_array_len(a, "Tags", 3).unwrap();
        fx.world.set_array_len(b, "Tags", 5).unwrap();
        let mut tree = fx.tree(&[a, b]);

        let tags = tree.find_node_by_path("Stats.Tags").unwrap();
        assert!(matches!(
            tree.edit_array(tags, ArrayEdit::Delete(0)),
            Err(Error::ArrayShapeMismatch(_))
        ));

        tree.edit_array(tags, ArrayEdit::Add).unwrap();
        assert_eq!(fx.world.array_len(a, "Tags").unwrap(), 4);
        assert_eq!(fx.world.array_len(b, "Tags").unwrap(), 6);
    }

    #[test]
    fn test_fixed_size_and_non_arrays() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        let fixed = tree.find_node_by_path("Stats.FixedTags").unwrap();
        assert!(matches!(
            tree.edit_array(fixed, ArrayEdit::Add),
            Err(Error::FixedSizeArray(_))
        ));

        let health = tree.find_node_by_path("Stats.Health").unwrap();
        assert!(matches!(
            tree.edit_array(health, ArrayEdit::Add),
            Err(Error::NotAnArray(_))
        ));
    }

    #[test]
    fn test_reset_to_default() {
        let fx = Fixture::new();
        let archetype = fx.pawn("Default__Pawn");
        fx.world.set(archetype, "Health", 100i32).unwrap();
        let pawn = fx.world.instantiate(archetype, "Pawn_0").unwrap();
        fx.world.set(pawn, "Health", 5i32).unwrap();

        let mut tree = fx.tree(&[pawn]);
        let health = tree.find_node_by_path("Stats.Health").unwrap();

        assert!(tree.reset_to_default(health).unwrap());
        assert_eq!(fx.world.get::<i32>(pawn, "Health").unwrap(), 100);
        assert!(!tree.reset_to_default(health).unwrap());
    }

    #[test]
    fn test_setting_reference_builds_nested_root() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let _other = fx.pawn("Other");
        let mut tree = fx.tree(&[pawn]);

        let target = tree.find_node_by_path("Stats.Target").unwrap();
        tree.set_value_text(target, "Other").unwrap();

        assert_eq!(tree.value_text(target), DisplayValue::Value("Other".to_string()));
        assert!(tree.find_node_by_path("Stats.Target.Stats.Health").is_some());
        assert!(tree.is_all_data_valid());
    }
}
