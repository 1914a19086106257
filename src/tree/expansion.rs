//! Expansion state
//!
//! Expanding a node shows its children; the first expansion of an
//! on-demand node also builds them. The set of expanded nodes is saved as
//! the deepest expanded qualified paths, per root type, and restored when
//! a tree of that type is bound again.

use super::node::{NodeId, NodeKind};
use super::path::path_covers;
use super::PropertyTree;
use crate::reflection::{ObjectHost, Reflection};
use crate::{Error, Result};

impl<H: ObjectHost> PropertyTree<H> {
    /// Expand or collapse one node
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) -> Result<()> {
        self.nodes.get(id).ok_or(Error::InvalidNode)?;
        self.set_expanded_internal(id, expanded, false, false);
        self.save_expanded();
        self.refresh();
        Ok(())
    }

    /// Expand or collapse a node and everything below it
    pub fn set_expanded_recursive(&mut self, id: NodeId, expanded: bool) -> Result<()> {
        self.nodes.get(id).ok_or(Error::InvalidNode)?;
        self.set_expanded_internal(id, expanded, true, false);
        self.save_expanded();
        self.refresh();
        Ok(())
    }

    /// Expand every node
    pub fn expand_all(&mut self) {
        self.set_expanded_internal(self.root, true, true, false);
        self.save_expanded();
        self.refresh();
    }

    /// Collapse every node
    pub fn collapse_all(&mut self) {
        self.set_expanded_internal(self.root, false, true, false);
        self.save_expanded();
        self.refresh();
    }

    /// Expand or collapse the first property named `property_name`
    ///
    /// With an index, the matching array element is used instead. Expanding
    /// also expands every ancestor so the node becomes visible. Returns
    /// whether a node was found.
    pub fn expand_item(&mut self, property_name: &str, index: Option<usize>, expand: bool) -> bool {
        let Some(mut target) = self.find_node_by_property_name(self.root, property_name) else {
            return false;
        };

        if let Some(index) = index {
            let element = self
                .children(target)
                .iter()
                .copied()
                .find(|&c| self.nodes.get(c).is_some_and(|n| n.array_index == Some(index)));
            match element {
                Some(element) => target = element,
                None => return false,
            }
        }

        self.set_expanded_internal(target, expand, false, expand);
        self.save_expanded();
        self.refresh();
        true
    }

    pub(super) fn set_expanded_internal(
        &mut self,
        id: NodeId,
        expanded: bool,
        recursive: bool,
        expand_parents: bool,
    ) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };

        // Object roots are transparent and always open
        if node.is_expandable() && !node.is_object() {
            let first_expansion = expanded && !node.expansion.ever_expanded;
            node.expansion.expanded = expanded;
            if expanded {
                node.expansion.ever_expanded = true;
            }
            if first_expansion && node.expansion.on_demand && !node.expansion.materialized {
                self.rebuild_children(id);
            }
        }

        if recursive {
            for child in self.children(id).to_vec() {
                self.set_expanded_internal(child, expanded, true, false);
            }
        }

        if expand_parents {
            let mut current = self.nodes.get(id).and_then(|n| n.parent);
            while let Some(parent) = current {
                let Some(node) = self.nodes.get_mut(parent) else {
                    break;
                };
                if node.is_expandable() {
                    node.expansion.expanded = true;
                    node.expansion.ever_expanded = true;
                }
                current = node.parent;
            }
        }
    }

    /// Deepest expanded paths, descending only through expanded nodes
    pub fn remember_expanded(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_expanded(self.root, &mut paths);
        paths
    }

    /// Returns whether anything at or below `id` was recorded
    fn collect_expanded(&self, id: NodeId, paths: &mut Vec<String>) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if !node.is_expanded() {
            return false;
        }

        let mut recorded = false;
        for &child in &node.children {
            recorded |= self.collect_expanded(child, paths);
        }

        if !recorded && !node.is_object() {
            paths.push(self.qualified_path(id));
            return true;
        }
        recorded
    }

    /// Expand exactly the nodes some stored path covers
    pub fn restore_expanded(&mut self, paths: &[String]) {
        self.apply_expanded_paths(paths);
        self.refresh();
    }

    pub(super) fn apply_expanded_paths(&mut self, paths: &[String]) {
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            let is_object = match self.nodes.get(id) {
                Some(node) => node.is_object(),
                None => continue,
            };

            if !is_object {
                let path = self.qualified_path(id);
                let expand = paths.iter().any(|stored| path_covers(stored, &path));

                if expand {
                    self.set_expanded_internal(id, true, false, false);
                } else if let Some(node) = self.nodes.get_mut(id) {
                    node.expansion.expanded = false;
                }
            }

            // Children are read after expanding so lazily built ones are visited
            let expanded = self.nodes.get(id).is_some_and(|n| n.is_expanded());
            if expanded {
                stack.extend(self.children(id).iter().rev().copied());
            }
        }
    }

    /// Type names the expanded state is saved under
    ///
    /// The bound type, plus its super types up to the configured layout
    /// root so related types share one layout.
    fn layout_keys(&self) -> Vec<String> {
        let Some(base) = self.base_type() else {
            return Vec::new();
        };

        match &self.ctx.config.layout_root_type {
            Some(root) => self
                .ctx
                .host
                .registry()
                .ancestors(&base.name)
                .take_while(|ty| &ty.name != root)
                .map(|ty| ty.name.clone())
                .collect(),
            None => vec![base.name.clone()],
        }
    }

    pub(super) fn save_expanded(&mut self) {
        let keys = self.layout_keys();
        if keys.is_empty() {
            return;
        }

        let paths = self.remember_expanded();
        for key in keys {
            if let Err(e) = self.ctx.store.set_expanded_paths(&key, paths.clone()) {
                tracing::warn!("Failed to save expanded state for {}: {}", key, e);
            }
        }
    }

    pub(super) fn restore_saved_expansion(&mut self) {
        let saved = self
            .layout_keys()
            .iter()
            .find_map(|key| self.ctx.store.expanded_paths(key));

        match saved {
            Some(paths) => self.apply_expanded_paths(&paths),
            None if self.ctx.config.expand_categories_by_default => {
                for id in self.descendants(self.root) {
                    let is_category = self
                        .nodes
                        .get(id)
                        .is_some_and(|n| matches!(n.kind, NodeKind::Category { .. }));
                    if is_category {
                        self.set_expanded_internal(id, true, false, false);
                    }
                }
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::Fixture;
    use super::*;
    use crate::persistence::LayoutStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_categories_expanded_by_default() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");

        let tree = fx.tree(&[pawn]);
        let stats = tree.find_node_by_path("Stats").unwrap();
        assert!(tree.node(stats).unwrap().is_expanded());

        let tree = fx.tree_with(&[pawn], |config| config.expand_categories_by_default = false);
        let stats = tree.find_node_by_path("Stats").unwrap();
        assert!(!tree.node(stats).unwrap().is_expanded());
    }

    #[test]
    fn test_remember_deepest_paths() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        let location = tree.find_node_by_path("Movement.Location").unwrap();
        tree.set_expanded(location, true).unwrap();

        let paths = tree.remember_expanded();
        assert!(paths.contains(&"Movement.Location".to_string()));
        assert!(!paths.contains(&"Movement".to_string()));
        assert!(paths.contains(&"Stats".to_string()));
    }

    #[test]
    fn test_collapsed_parent_hides_expanded_child() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        let location = tree.find_node_by_path("Movement.Location").unwrap();
        let movement = tree.find_node_by_path("Movement").unwrap();
        tree.set_expanded(location, true).unwrap();
        tree.set_expanded(movement, false).unwrap();

        let paths = tree.remember_expanded();
        assert!(!paths.iter().any(|p| p.starts_with("Movement")));
    }

    #[test]
    fn test_expansion_survives_rebind() {
        let fx = Fixture::new();
        let a = fx.pawn("A");
        let b = fx.pawn("B");
        let mut tree = fx.tree(&[a]);

        let location = tree.find_node_by_path("Movement.Location").unwrap();
        let display = tree.find_node_by_path("Display").unwrap();
        tree.set_expanded(location, true).unwrap();
        tree.set_expanded(display, false).unwrap();

        tree.bind(&[b]);
        let location = tree.find_node_by_path("Movement.Location").unwrap();
        let display = tree.find_node_by_path("Display").unwrap();
        assert!(tree.node(location).unwrap().is_expanded());
        assert!(!tree.node(display).unwrap().is_expanded());

        // A second tree over the same store picks the layout up as well
        let other = fx.tree(&[a]);
        let location = other.find_node_by_path("Movement.Location").unwrap();
        assert!(other.node(location).unwrap().is_expanded());
    }

    #[test]
    fn test_layout_shared_up_to_layout_root() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree_with(&[pawn], |config| {
            config.layout_root_type = Some("Object".to_string());
        });

        let location = tree.find_node_by_path("Movement.Location").unwrap();
        tree.set_expanded(location, true).unwrap();

        let store = fx.store.clone();
        let saved = store.expanded_paths("Actor").unwrap();
        assert!(saved.contains(&"Movement.Location".to_string()));
        assert_eq!(store.expanded_paths("Pawn"), Some(saved));
        assert_eq!(store.expanded_paths("Object"), None);
    }

    #[test]
    fn test_on_demand_node_builds_on_first_expansion() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree_with(&[pawn], |config| config.show_non_editable = true);

        let cache = tree.find_node_by_path("Stats.Cache").unwrap();
        assert!(tree.children(cache).is_empty());

        tree.set_expanded(cache, true).unwrap();
        let expansion = tree.node(cache).unwrap().expansion();
        assert!(expansion.ever_expanded);
        assert!(expansion.materialized);
        assert_eq!(tree.children(cache).len(), 3);
    }

    #[test]
    fn test_expand_item_by_name_and_index() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        fx.world.set_array_len(pawn, "Points", 2).unwrap();
        let mut tree = fx.tree_with(&[pawn], |config| config.expand_categories_by_default = false);

        assert!(tree.expand_item("Points", Some(1), true));
        let element = tree.find_node_by_path("Stats.Points[1]").unwrap();
        let stats = tree.find_node_by_path("Stats").unwrap();
        assert!(tree.node(element).unwrap().is_expanded());
        assert!(tree.node(stats).unwrap().is_expanded());
        assert!(tree.visible_nodes().contains(&element));

        assert!(!tree.expand_item("Points", Some(9), true));
        assert!(!tree.expand_item("Missing", None, true));
    }

    #[test]
    fn test_expand_and_collapse_all() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        tree.expand_all();
        let x = tree.find_node_by_path("Movement.Location.X").unwrap();
        assert!(tree.visible_nodes().contains(&x));

        tree.collapse_all();
        assert_eq!(tree.visible_nodes().len(), 3);
    }
}
