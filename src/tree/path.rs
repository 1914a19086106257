//! Qualified paths and display names
//!
//! A qualified path names a node by the categories and property names above
//! it, e.g. `Movement.Location.X` or `Stats.Tags[2]`. Object roots add no
//! segment, so the members of a referenced object continue the path of the
//! reference. Paths are what expanded-state and favorites persist.

use super::node::{ItemRole, NodeId, NodeKind};
use super::PropertyTree;
use crate::reflection::ObjectHost;

/// Turn a property name into a display name
///
/// `DrawScale3D` becomes `Draw Scale 3D`, `bHidden` (a bool) becomes
/// `Hidden`, and underscores become spaces.
pub fn sanitize_display_name(name: &str, is_bool: bool) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut in_run = false;

    let mut chars = name.chars();
    if is_bool && name.starts_with('b') {
        let mut rest = name.chars().skip(1);
        if rest.next().is_some_and(|c| c.is_uppercase()) {
            chars.next();
        }
    }

    for c in chars {
        if c == '_' {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            in_run = true;
            continue;
        }

        if c.is_uppercase() || c.is_ascii_digit() {
            if !in_run && !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            in_run = true;
        } else if c.is_lowercase() {
            in_run = false;
        }

        if out.is_empty() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Whether a stored path keeps `path` expanded: it names the node itself or
/// one of its descendants
pub(super) fn path_covers(stored: &str, path: &str) -> bool {
    match stored.strip_prefix(path) {
        Some("") => true,
        Some(rest) => rest.starts_with('.') || rest.starts_with('['),
        None => false,
    }
}

impl<H: ObjectHost> PropertyTree<H> {
    /// Qualified path of a node; empty for object roots
    pub fn qualified_path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);

        while let Some(node_id) = current {
            let Some(node) = self.nodes.get(node_id) else {
                break;
            };

            match (&node.kind, &node.property, node.array_index) {
                (NodeKind::Object(_), _, _) => {}
                (NodeKind::Category { name }, _, _) => {
                    segments.push(name.rsplit('.').next().unwrap_or(name).to_string());
                }
                (NodeKind::Item(ItemRole::Member), Some(property), _) => {
                    segments.push(property.name.clone());
                }
                (NodeKind::Item(_), _, Some(index)) => segments.push(format!("[{index}]")),
                (NodeKind::Item(_), _, None) => {}
            }

            current = node.parent;
        }

        let mut path = String::new();
        for segment in segments.iter().rev() {
            if !path.is_empty() && !segment.starts_with('[') {
                path.push('.');
            }
            path.push_str(segment);
        }
        path
    }

    /// Find a node by qualified path
    pub fn find_node_by_path(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return None;
        }

        self.descendants(self.root)
            .into_iter()
            .find(|&id| self.nodes.get(id).is_some_and(|n| !n.is_object()) && self.qualified_path(id) == path)
    }

    /// First node below `start`, in display order, whose property is `name`
    ///
    /// Array elements are skipped; the match is the property as a whole.
    pub fn find_node_by_property_name(&self, start: NodeId, name: &str) -> Option<NodeId> {
        self.descendants(start).into_iter().skip(1).find(|&id| {
            self.nodes.get(id).is_some_and(|n| {
                n.array_index.is_none() && n.property.as_ref().is_some_and(|p| p.name == name)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::Fixture;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sanitize_display_name() {
        assert_eq!(sanitize_display_name("DrawScale3D", false), "Draw Scale 3D");
        assert_eq!(sanitize_display_name("bHidden", true), "Hidden");
        assert_eq!(sanitize_display_name("bHidden", false), "B Hidden");
        assert_eq!(sanitize_display_name("bounce", true), "Bounce");
        assert_eq!(sanitize_display_name("Max_Speed", false), "Max Speed");
        assert_eq!(sanitize_display_name("health", false), "Health");
        assert_eq!(sanitize_display_name("HP", false), "HP");
        assert_eq!(sanitize_display_name("Location_X", false), "Location X");
    }

    #[test]
    fn test_path_covers() {
        assert!(path_covers("Stats", "Stats"));
        assert!(path_covers("Stats.Tags[1]", "Stats"));
        assert!(path_covers("Stats.Tags[1]", "Stats.Tags"));
        assert!(!path_covers("Stats.TagsExtra", "Stats.Tags"));
        assert!(!path_covers("Stats", "Stats.Tags"));
    }

    #[test]
    fn test_qualified_paths() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        fx.world.set_array_len(pawn, "Points", 2).unwrap();
        let tree = fx.tree(&[pawn]);

        let point_y = tree.find_node_by_path("Stats.Points[1].Y").unwrap();
        assert_eq!(tree.display_name(point_y), Some("Y"));
        assert_eq!(tree.qualified_path(point_y), "Stats.Points[1].Y");

        let brightness = tree.find_node_by_path("Display.Lighting.Brightness").unwrap();
        assert_eq!(tree.qualified_path(brightness), "Display.Lighting.Brightness");
        assert_eq!(tree.qualified_path(tree.root()), "");
    }

    #[test]
    fn test_find_by_property_name() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let tree = fx.tree(&[pawn]);

        let location = tree.find_node_by_property_name(tree.root(), "Location").unwrap();
        assert_eq!(tree.qualified_path(location), "Movement.Location");

        let movement = tree.find_node_by_path("Movement").unwrap();
        let x = tree.find_node_by_property_name(movement, "X").unwrap();
        assert_eq!(tree.qualified_path(x), "Movement.Location.X");

        assert!(tree.find_node_by_property_name(tree.root(), "Missing").is_none());
    }
}
