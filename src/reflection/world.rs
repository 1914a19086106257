//! In-process object host
//!
//! [`ObjectWorld`] owns a [`TypeRegistry`], a [`MemoryArena`] and a table of
//! live objects. It is the reference implementation of [`ObjectHost`](super::ObjectHost)
//! and what tests and benches bind trees to.

use super::{ObjectRef, PropertyDescriptor, PropertyKind, Reflection, TypeDescriptor, TypeRegistry};
use crate::memory::{Address, ArrayHeader, MemoryArena, MemoryError, MemoryReader, MemoryWriter};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct ObjectRecord {
    class: String,
    name: String,
    archetype: Option<ObjectRef>,
}

/// Live objects laid out in arena memory
pub struct ObjectWorld {
    registry: TypeRegistry,
    memory: MemoryArena,
    objects: RwLock<HashMap<ObjectRef, ObjectRecord>>,
}

impl ObjectWorld {
    /// Create a world over a finished registry
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            memory: MemoryArena::new(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// The backing memory
    pub fn memory(&self) -> &MemoryArena {
        &self.memory
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Create a zero-initialized object without an archetype
    pub fn spawn(&self, class: &str, name: impl Into<String>) -> Result<ObjectRef> {
        let ty = self.class(class)?;
        let object = ObjectRef::from_address(self.memory.allocate(ty.size));

        self.objects.write().insert(
            object,
            ObjectRecord {
                class: ty.name.clone(),
                name: name.into(),
                archetype: None,
            },
        );
        Ok(object)
    }

    /// Create an object of the archetype's class, initialized from it
    pub fn instantiate(&self, archetype: ObjectRef, name: impl Into<String>) -> Result<ObjectRef> {
        let class = self
            .class_of(archetype)
            .ok_or(Error::Memory(MemoryError::InvalidAddress(archetype.address())))?;
        self.instantiate_as(&class.name, archetype, name)
    }

    /// Create an object of `class` whose leading storage is copied from `archetype`
    ///
    /// The archetype may be of a super type; members it does not have stay
    /// zeroed. Dynamic arrays are deep-copied so the two never share storage.
    pub fn instantiate_as(
        &self,
        class: &str,
        archetype: ObjectRef,
        name: impl Into<String>,
    ) -> Result<ObjectRef> {
        let ty = self.class(class)?;
        let archetype_ty = self
            .class_of(archetype)
            .ok_or(Error::Memory(MemoryError::InvalidAddress(archetype.address())))?;

        let object = ObjectRef::from_address(self.memory.allocate(ty.size));
        let shared = ty.size.min(archetype_ty.size);
        let bytes = self.memory.read_bytes(archetype.address(), shared)?;
        self.memory.write_bytes(object.address(), &bytes)?;

        for property in self.registry.all_properties(&archetype_ty.name) {
            if property.offset + property.total_size() <= shared {
                self.duplicate_arrays(&property, object.address() + property.offset)?;
            }
        }

        self.objects.write().insert(
            object,
            ObjectRecord {
                class: ty.name.clone(),
                name: name.into(),
                archetype: Some(archetype),
            },
        );
        Ok(object)
    }

    /// Destroy an object; its memory stops resolving immediately
    pub fn destroy(&self, object: ObjectRef) -> Result<()> {
        self.objects.write().remove(&object);
        self.memory.release(object.address())?;
        Ok(())
    }

    /// Resolve a dotted, optionally indexed path such as `Location.X` or `Tags[2]`
    pub fn property_address(
        &self,
        object: ObjectRef,
        path: &str,
    ) -> Result<(Address, Arc<PropertyDescriptor>)> {
        let mut type_name = self
            .class_of(object)
            .ok_or(Error::Memory(MemoryError::InvalidAddress(object.address())))?
            .name
            .clone();
        let mut base = object.address();
        let mut resolved: Option<(Address, Arc<PropertyDescriptor>)> = None;

        for segment in path.split('.') {
            if let Some((_, descriptor)) = &resolved {
                type_name = descriptor
                    .kind
                    .struct_name()
                    .ok_or_else(|| not_found(&type_name, path))?
                    .to_string();
            }

            let (name, index) = split_index(segment);
            let property = self
                .registry
                .all_properties(&type_name)
                .into_iter()
                .find(|p| p.name == name)
                .ok_or_else(|| not_found(&type_name, path))?;

            let mut address = base + property.offset;
            let mut descriptor = property;

            if let Some(index) = index {
                match &descriptor.kind {
                    PropertyKind::Array { inner } => {
                        let header = self.memory.read_array_header(address)?;
                        let data = header
                            .data_address()
                            .filter(|_| index < header.len())
                            .ok_or_else(|| not_found(&type_name, path))?;
                        address = data + index * inner.element_size;
                        descriptor = Arc::clone(inner);
                    }
                    _ if index < descriptor.array_dim => {
                        address += index * descriptor.element_size;
                    }
                    _ => return Err(not_found(&type_name, path)),
                }
            }

            base = address;
            resolved = Some((address, descriptor));
        }

        resolved.ok_or_else(|| not_found(&type_name, path))
    }

    /// Write a POD value at a property path
    pub fn set<T: bytemuck::Pod>(&self, object: ObjectRef, path: &str, value: T) -> Result<()> {
        let (address, _) = self.property_address(object, path)?;
        self.memory.write(address, &value)?;
        Ok(())
    }

    /// Read a POD value at a property path
    pub fn get<T: bytemuck::Pod>(&self, object: ObjectRef, path: &str) -> Result<T> {
        let (address, _) = self.property_address(object, path)?;
        Ok(self.memory.read(address)?)
    }

    /// Point an object reference property at `target`
    pub fn set_reference(
        &self,
        object: ObjectRef,
        path: &str,
        target: Option<ObjectRef>,
    ) -> Result<()> {
        let raw = target.map_or(0u64, |t| t.address() as u64);
        self.set(object, path, raw)
    }

    /// Resize a dynamic array property, keeping existing elements
    pub fn set_array_len(&self, object: ObjectRef, path: &str, len: usize) -> Result<()> {
        let (address, descriptor) = self.property_address(object, path)?;
        let PropertyKind::Array { inner } = &descriptor.kind else {
            return Err(Error::NotAnArray(path.to_string()));
        };

        crate::memory::resize_array(&self.memory, address, len, inner.element_size)?;
        Ok(())
    }

    /// Current length of a dynamic array property
    pub fn array_len(&self, object: ObjectRef, path: &str) -> Result<usize> {
        let (address, _) = self.property_address(object, path)?;
        Ok(self.memory.read_array_header(address)?.len())
    }

    fn class(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        self.registry
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TypeNotFound(name.to_string()))
    }

    /// Give every dynamic array reachable from `address` its own storage
    fn duplicate_arrays(&self, property: &PropertyDescriptor, address: Address) -> Result<()> {
        for index in 0..property.array_dim.max(1) {
            let element = address + index * property.element_size;
            match &property.kind {
                PropertyKind::Struct { type_name } => {
                    for member in self.registry.all_properties(type_name) {
                        self.duplicate_arrays(&member, element + member.offset)?;
                    }
                }
                PropertyKind::Array { inner } => {
                    let header = self.memory.read_array_header(element)?;
                    let Some(data) = header.data_address() else {
                        continue;
                    };

                    let size = header.len() * inner.element_size;
                    let bytes = self.memory.read_bytes(data, size)?;
                    let copy = self.memory.allocate(size);
                    self.memory.write_bytes(copy, &bytes)?;
                    self.memory.write(
                        element,
                        &ArrayHeader {
                            data: copy as u64,
                            num: header.num,
                            max: header.num,
                        },
                    )?;

                    for i in 0..header.len() {
                        self.duplicate_arrays(inner, copy + i * inner.element_size)?;
                    }
                }
                PropertyKind::Scalar(_) | PropertyKind::Object { .. } | PropertyKind::Interface { .. } => {}
            }
        }
        Ok(())
    }
}

fn split_index(segment: &str) -> (&str, Option<usize>) {
    match segment.strip_suffix(']').and_then(|s| s.split_once('[')) {
        Some((name, index)) => (name, index.parse().ok()),
        None => (segment, None),
    }
}

fn not_found(type_name: &str, path: &str) -> Error {
    Error::PropertyNotFound {
        type_name: type_name.to_string(),
        path: path.to_string(),
    }
}

impl Reflection for ObjectWorld {
    fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    fn class_of(&self, object: ObjectRef) -> Option<Arc<TypeDescriptor>> {
        let objects = self.objects.read();
        let record = objects.get(&object)?;
        self.registry.get(&record.class).cloned()
    }

    fn archetype_of(&self, object: ObjectRef) -> Option<ObjectRef> {
        self.objects.read().get(&object)?.archetype
    }

    fn object_name(&self, object: ObjectRef) -> Option<String> {
        self.objects.read().get(&object).map(|r| r.name.clone())
    }

    fn find_object(&self, name: &str) -> Option<ObjectRef> {
        self.objects
            .read()
            .iter()
            .find(|(_, record)| record.name == name)
            .map(|(&object, _)| object)
    }
}

impl MemoryReader for ObjectWorld {
    fn read_bytes(&self, address: Address, size: usize) -> Result<Vec<u8>, MemoryError> {
        self.memory.read_bytes(address, size)
    }

    fn is_valid_address(&self, address: Address) -> bool {
        self.memory.is_valid_address(address)
    }
}

impl MemoryWriter for ObjectWorld {
    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<(), MemoryError> {
        self.memory.write_bytes(address, data)
    }

    fn allocate(&self, size: usize) -> Address {
        self.memory.allocate(size)
    }

    fn release(&self, address: Address) -> Result<(), MemoryError> {
        self.memory.release(address)
    }
}
