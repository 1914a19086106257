//! Per-kind value semantics
//!
//! Equality, text export and text import for every [`PropertyKind`]. These
//! are the functions the comparator, the default-value diff and the host's
//! value read/write requests go through.
//!
//! Text forms:
//! - bools: `True` / `False`
//! - integers: decimal
//! - floats: six decimals
//! - structs: `(X=1.000000,Y=2.000000)`
//! - arrays: `(e0,e1,e2)`
//! - object references: the object's name, or `None`

use crate::memory::{resize_array, Address, MemoryError, MemoryReader, MemoryWriter};
use crate::reflection::{ObjectHost, ObjectRef, PropertyDescriptor, PropertyKind, ScalarKind};
use crate::{Error, Result};

/// Text used for a null object reference
pub const NULL_REFERENCE_TEXT: &str = "None";

/// Compare `count` consecutive elements of `property` at two addresses
pub fn identical<H: ObjectHost>(
    host: &H,
    property: &PropertyDescriptor,
    a: Address,
    b: Address,
    count: usize,
) -> Result<bool, MemoryError> {
    for index in 0..count.max(1) {
        let offset = index * property.element_size;
        if !identical_value(host, &property.kind, property.element_size, a + offset, b + offset)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn identical_value<H: ObjectHost>(
    host: &H,
    kind: &PropertyKind,
    element_size: usize,
    a: Address,
    b: Address,
) -> Result<bool, MemoryError> {
    match kind {
        PropertyKind::Scalar(ScalarKind::Float) => Ok(host.read::<u32>(a)? == host.read::<u32>(b)?),
        PropertyKind::Scalar(ScalarKind::Bool) => {
            Ok((host.read::<u8>(a)? != 0) == (host.read::<u8>(b)? != 0))
        }
        PropertyKind::Scalar(scalar) => {
            Ok(host.read_bytes(a, scalar.size())? == host.read_bytes(b, scalar.size())?)
        }
        PropertyKind::Struct { type_name } => {
            let members = host.registry().all_properties(type_name);
            if members.is_empty() {
                return Ok(host.read_bytes(a, element_size)? == host.read_bytes(b, element_size)?);
            }
            for member in members {
                if !identical(host, &member, a + member.offset, b + member.offset, member.array_dim)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        PropertyKind::Array { inner } => {
            let left = host.read_array_header(a)?;
            let right = host.read_array_header(b)?;
            if left.len() != right.len() {
                return Ok(false);
            }
            match (left.data_address(), right.data_address()) {
                (Some(l), Some(r)) => identical(host, inner, l, r, left.len()),
                _ => Ok(left.is_empty()),
            }
        }
        PropertyKind::Object { .. } | PropertyKind::Interface { .. } => {
            Ok(host.read_pointer(a)? == host.read_pointer(b)?)
        }
    }
}

/// Export `count` elements; a single element exports bare, several as a list
pub fn export_text<H: ObjectHost>(
    host: &H,
    property: &PropertyDescriptor,
    address: Address,
    count: usize,
) -> Result<String, MemoryError> {
    if count <= 1 {
        return export_value(host, &property.kind, address);
    }

    let items = (0..count)
        .map(|i| export_value(host, &property.kind, address + i * property.element_size))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", items.join(",")))
}

/// Export one value of `kind`
pub fn export_value<H: ObjectHost>(
    host: &H,
    kind: &PropertyKind,
    address: Address,
) -> Result<String, MemoryError> {
    Ok(match kind {
        PropertyKind::Scalar(ScalarKind::Bool) => {
            let text = if host.read::<u8>(address)? != 0 { "True" } else { "False" };
            text.to_string()
        }
        PropertyKind::Scalar(ScalarKind::Byte) => host.read::<u8>(address)?.to_string(),
        PropertyKind::Scalar(ScalarKind::Int) => host.read::<i32>(address)?.to_string(),
        PropertyKind::Scalar(ScalarKind::Float) => format!("{:.6}", host.read::<f32>(address)?),
        PropertyKind::Struct { type_name } => {
            let fields = host
                .registry()
                .all_properties(type_name)
                .iter()
                .map(|member| {
                    let value = export_text(host, member, address + member.offset, member.array_dim)?;
                    Ok(format!("{}={}", member.name, value))
                })
                .collect::<Result<Vec<_>, MemoryError>>()?;
            format!("({})", fields.join(","))
        }
        PropertyKind::Array { inner } => {
            let header = host.read_array_header(address)?;
            match header.data_address() {
                Some(data) => {
                    let items = (0..header.len())
                        .map(|i| export_value(host, &inner.kind, data + i * inner.element_size))
                        .collect::<Result<Vec<_>, _>>()?;
                    format!("({})", items.join(","))
                }
                None => "()".to_string(),
            }
        }
        PropertyKind::Object { .. } | PropertyKind::Interface { .. } => {
            match host.read_pointer(address)? {
                Some(target) => {
                    let target = ObjectRef::from_address(target);
                    host.object_name(target).unwrap_or_else(|| target.to_string())
                }
                None => NULL_REFERENCE_TEXT.to_string(),
            }
        }
    })
}

/// Import `text` into `count` elements of `property`
///
/// The whole text is parsed before anything is written, so a rejected
/// value leaves memory untouched.
pub fn import_text<H: ObjectHost>(
    host: &H,
    property: &PropertyDescriptor,
    address: Address,
    count: usize,
    text: &str,
) -> Result<()> {
    check_text(host, property, count, text)?;
    store_text(host, property, Some(address), count, text)
}

/// Parse `text` as `count` elements of `property` without writing it
pub fn check_text<H: ObjectHost>(
    host: &H,
    property: &PropertyDescriptor,
    count: usize,
    text: &str,
) -> Result<()> {
    store_text(host, property, None, count, text)
}

/// Import one value of `kind`
pub fn import_value<H: ObjectHost>(
    host: &H,
    kind: &PropertyKind,
    address: Address,
    text: &str,
) -> Result<()> {
    store_value(host, kind, None, text)?;
    store_value(host, kind, Some(address), text)
}

// With no address the text is only parsed
fn store_text<H: ObjectHost>(
    host: &H,
    property: &PropertyDescriptor,
    address: Option<Address>,
    count: usize,
    text: &str,
) -> Result<()> {
    if count <= 1 {
        return store_value(host, &property.kind, address, text);
    }

    let items = list_items(text)?;
    if items.len() > count {
        return Err(import_error(text, format!("expected at most {count} elements")));
    }
    for (i, item) in items.into_iter().enumerate() {
        let element = address.map(|a| a + i * property.element_size);
        store_value(host, &property.kind, element, item)?;
    }
    Ok(())
}

fn store_value<H: ObjectHost>(
    host: &H,
    kind: &PropertyKind,
    address: Option<Address>,
    text: &str,
) -> Result<()> {
    let text = text.trim();
    match kind {
        PropertyKind::Scalar(ScalarKind::Bool) => {
            let value = match text.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => 1u8,
                "false" | "0" | "no" => 0u8,
                _ => return Err(import_error(text, "expected True or False")),
            };
            write(host, address, &value)?;
        }
        PropertyKind::Scalar(ScalarKind::Byte) => {
            let value: u8 = text.parse().map_err(|e| import_error(text, e))?;
            write(host, address, &value)?;
        }
        PropertyKind::Scalar(ScalarKind::Int) => {
            let value: i32 = text.parse().map_err(|e| import_error(text, e))?;
            write(host, address, &value)?;
        }
        PropertyKind::Scalar(ScalarKind::Float) => {
            let value: f32 = text
                .trim_end_matches(['f', 'F'])
                .parse()
                .map_err(|e| import_error(text, e))?;
            write(host, address, &value)?;
        }
        PropertyKind::Struct { type_name } => {
            let members = host.registry().all_properties(type_name);
            for field in list_items(text)? {
                let (name, value) = field
                    .split_once('=')
                    .ok_or_else(|| import_error(field, "expected Name=Value"))?;
                let member = members
                    .iter()
                    .find(|m| m.name.eq_ignore_ascii_case(name.trim()))
                    .ok_or_else(|| import_error(field, format!("{type_name} has no member {name}")))?;
                let field_address = address.map(|a| a + member.offset);
                store_text(host, member, field_address, member.array_dim, value)?;
            }
        }
        PropertyKind::Array { inner } => {
            let items = list_items(text)?;
            match address {
                Some(address) => {
                    let header = resize_array(host, address, items.len(), inner.element_size)?;
                    if let Some(data) = header.data_address() {
                        for (i, item) in items.into_iter().enumerate() {
                            store_value(host, &inner.kind, Some(data + i * inner.element_size), item)?;
                        }
                    }
                }
                None => {
                    for item in items {
                        store_value(host, &inner.kind, None, item)?;
                    }
                }
            }
        }
        PropertyKind::Object { class } | PropertyKind::Interface { class } => {
            let pointer = if text.is_empty() || text.eq_ignore_ascii_case(NULL_REFERENCE_TEXT) {
                0u64
            } else {
                let target = host
                    .find_object(text)
                    .ok_or_else(|| import_error(text, "no such object"))?;
                let target_class = host
                    .class_of(target)
                    .ok_or_else(|| import_error(text, "object is not live"))?;
                if !host.registry().is_child_of(&target_class.name, class) {
                    return Err(import_error(text, format!("{} is not a {class}", target_class.name)));
                }
                target.address() as u64
            };
            write(host, address, &pointer)?;
        }
    }
    Ok(())
}

fn write<H: ObjectHost, T: bytemuck::Pod>(host: &H, address: Option<Address>, value: &T) -> Result<()> {
    if let Some(address) = address {
        host.write(address, value)?;
    }
    Ok(())
}

/// Split `(a,b,(c,d))` into its top-level items
fn list_items(text: &str) -> Result<Vec<&str>> {
    let inner = text
        .trim()
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| import_error(text, "expected a parenthesized list"))?;

    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;

    for (i, c) in inner.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| import_error(text, "unbalanced parentheses"))?;
            }
            ',' if !quoted && depth == 0 => {
                items.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 || quoted {
        return Err(import_error(text, "unbalanced parentheses"));
    }

    let last = inner[start..].trim();
    if !last.is_empty() || !items.is_empty() {
        items.push(last);
    }
    Ok(items)
}

fn import_error(text: &str, reason: impl ToString) -> Error {
    Error::ValueImport {
        text: text.to_string(),
        reason: reason.to_string(),
    }
}
