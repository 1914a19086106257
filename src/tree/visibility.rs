//! Filtering and visibility
//!
//! A refresh runs two passes over the tree. The filter pass marks nodes
//! that match the active filter, nodes with a matching descendant, and
//! nodes whose parent matched. The seen pass then combines those flags with
//! expansion state into the final `seen` flag. The visible list is every
//! seen node in depth-first order, object roots excluded.

use super::compare::ReadOptions;
use super::favorites::ViewMode;
use super::node::NodeId;
use super::PropertyTree;
use crate::reflection::ObjectHost;
use std::collections::HashSet;

/// Active filter state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSettings {
    /// Lowercased search terms; every term must match
    pub terms: Vec<String>,
    /// Only show values that differ from their archetype
    pub modified_only: bool,
    /// Only show values that differ across the bound instances
    pub differing_only: bool,
}

impl<H: ObjectHost> PropertyTree<H> {
    /// Set the text filter; whitespace separates terms
    pub fn set_filter_text(&mut self, text: &str) {
        self.filter.terms = text.split_whitespace().map(str::to_lowercase).collect();
        tracing::debug!("Filter terms: {:?}", self.filter.terms);
        self.refresh();
    }

    /// The text filter as entered, normalized
    pub fn filter_text(&self) -> String {
        self.filter.terms.join(" ")
    }

    /// Enable or disable the modified-only and differing-only filters
    pub fn set_filter_mode(&mut self, modified_only: bool, differing_only: bool) {
        self.filter.modified_only = modified_only;
        self.filter.differing_only = differing_only;
        self.refresh();
    }

    /// Current filter settings
    pub fn filter(&self) -> &FilterSettings {
        &self.filter
    }

    /// Whether any filter restricts the tree
    ///
    /// The differing-only filter has no effect on a single instance.
    pub fn is_filter_active(&self) -> bool {
        !self.filter.terms.is_empty()
            || self.filter.modified_only
            || (self.filter.differing_only && self.instances().len() > 1)
    }

    /// Whether the filter lets a node expand and collapse as usual
    pub fn is_normal_expansion_allowed(&self, id: NodeId) -> bool {
        if self.filter.terms.is_empty() {
            return self.nodes.get(id).is_some();
        }
        self.nodes.get(id).is_some_and(|n| {
            let vis = n.visibility;
            (vis.seen_due_to_filter || vis.parent_seen_due_to_filter) && !vis.seen_due_to_child_filter
        })
    }

    pub(super) fn filter_tree(&mut self) {
        let active = self.is_filter_active();
        self.filter_node(self.root, false, active);
    }

    fn filter_node(&mut self, id: NodeId, parent_seen: bool, active: bool) {
        let accepted = active && self.passes_filter(id);

        let children = match self.nodes.get_mut(id) {
            Some(node) => {
                node.visibility.seen_due_to_filter = accepted;
                node.visibility.seen_due_to_child_filter = false;
                node.visibility.parent_seen_due_to_filter = !active || parent_seen;
                node.children.clone()
            }
            None => return,
        };

        // A matching node first offers its children nothing; if one of them
        // matches on its own the subtree is trimmed to the matches
        let first_pass = u8::from(accepted);
        for pass in (0..=first_pass).rev() {
            let forward = pass == 0 && (parent_seen || accepted);
            let mut child_matched = false;
            for &child in &children {
                self.filter_node(child, forward, active);
                child_matched |= self.nodes.get(child).is_some_and(|c| {
                    c.visibility.seen_due_to_filter || c.visibility.seen_due_to_child_filter
                });
            }

            if child_matched {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.visibility.seen_due_to_child_filter = true;
                }
                break;
            }
        }
    }

    fn passes_filter(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if node.is_object() {
            return false;
        }

        if self.filter.modified_only && !self.differs_from_default(id) {
            return false;
        }

        if self.filter.differing_only && self.instances().len() > 1 {
            let options = ReadOptions {
                compare_contents: true,
                force_object_compare: true,
                ..ReadOptions::default()
            };
            match self.resolve_read_addresses(id, options) {
                Ok(read) if !read.all_identical => {}
                _ => return false,
            }
        }

        let display_name = node.display_name.to_lowercase();
        let property_name = node
            .property
            .as_ref()
            .map(|p| p.name.to_lowercase())
            .filter(|name| *name != display_name);

        self.filter.terms.iter().all(|term| {
            display_name.contains(term.as_str())
                || property_name.as_deref().is_some_and(|name| name.contains(term.as_str()))
        })
    }

    pub(super) fn compute_seen(&mut self) {
        self.clear_favorite_ancestors();
        match self.view {
            ViewMode::Normal => self.process_seen(self.root, true),
            ViewMode::Favorites => {
                self.process_seen_for_favorites(self.root);
            }
        }
    }

    fn process_seen(&mut self, id: NodeId, parent_allows: bool) {
        let (children, allow_children) = match self.nodes.get_mut(id) {
            Some(node) => {
                let vis = node.visibility;
                node.visibility.seen = if vis.seen_due_to_filter || vis.seen_due_to_child_filter {
                    true
                } else {
                    parent_allows && vis.parent_seen_due_to_filter
                };

                let open = node.expansion.expanded || node.is_object() || vis.seen_due_to_child_filter;
                (node.children.clone(), parent_allows && open)
            }
            None => return,
        };

        for child in children {
            self.process_seen(child, allow_children);
        }
    }

    /// Only favorites and what they show are seen; ancestors of a favorite
    /// are marked instead. Returns whether `id` is or contains a favorite
    fn process_seen_for_favorites(&mut self, id: NodeId) -> bool {
        let (children, favorite) = match self.nodes.get_mut(id) {
            Some(node) => {
                node.visibility.seen = false;
                (node.children.clone(), node.favorite.favorite)
            }
            None => return false,
        };

        if favorite {
            self.process_seen(id, true);
            return true;
        }

        let mut any_child = false;
        for child in children {
            any_child |= self.process_seen_for_favorites(child);
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.visibility.seen_due_to_child_favorite = any_child;
        }
        any_child
    }

    fn clear_favorite_ancestors(&mut self) {
        for id in self.descendants(self.root) {
            if let Some(node) = self.nodes.get_mut(id) {
                node.visibility.seen_due_to_child_favorite = false;
            }
        }
    }

    /// Build children of seen, expanded nodes that have never been built
    pub(super) fn materialize_seen(&mut self) -> bool {
        let mut built = false;

        for id in self.descendants(self.root) {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };

            let e = node.expansion;
            let wanted = (node.visibility.seen || node.is_object())
                && e.expanded
                && e.expandable
                && !e.materialized
                && e.truncation.is_none();

            if wanted {
                node.expansion.ever_expanded = true;
                self.rebuild_children(id);
                built = true;
            }
        }

        built
    }

    pub(super) fn collect_visible(&mut self) {
        let visible: Vec<NodeId> = match self.view {
            ViewMode::Normal => self
                .descendants(self.root)
                .into_iter()
                .filter(|&id| self.is_listed(id))
                .collect(),
            ViewMode::Favorites => {
                let mut listed = HashSet::new();
                let mut out = Vec::new();
                for favorite in self.favorites() {
                    for id in self.descendants(favorite) {
                        if self.is_listed(id) && listed.insert(id) {
                            out.push(id);
                        }
                    }
                }
                out
            }
        };
        self.visible = visible;
    }

    fn is_listed(&self, id: NodeId) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| n.visibility.seen && !n.is_object())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::Fixture;
    use super::*;
    use pretty_assertions::assert_eq;

    fn visible_paths<H: ObjectHost>(tree: &PropertyTree<H>) -> Vec<String> {
        tree.visible_nodes()
            .iter()
            .map(|&id| tree.qualified_path(id))
            .collect()
    }

    #[test]
    fn test_unfiltered_tree_shows_expanded_levels() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let tree = fx.tree(&[pawn]);

        let paths = visible_paths(&tree);
        assert!(paths.contains(&"Stats".to_string()));
        assert!(paths.contains(&"Stats.Health".to_string()));
        // Location is collapsed, so its members are hidden
        assert!(paths.contains(&"Movement.Location".to_string()));
        assert!(!paths.contains(&"Movement.Location.X".to_string()));
    }

    #[test]
    fn test_filter_shows_matches_and_their_ancestors() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        tree.set_filter_text("health");
        assert_eq!(visible_paths(&tree), ["Stats", "Stats.Health"]);
        assert!(tree.is_filter_active());

        let stats = tree.find_node_by_path("Stats").unwrap();
        let vis = tree.node(stats).unwrap().visibility();
        assert!(vis.seen_due_to_child_filter);
        assert!(!vis.seen_due_to_filter);
    }

    #[test]
    fn test_filter_reaches_collapsed_descendants() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        tree.set_filter_text("roll");
        assert_eq!(
            visible_paths(&tree),
            ["Movement", "Movement.Rotation", "Movement.Rotation.Roll"]
        );
    }

    #[test]
    fn test_all_terms_must_match() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        tree.set_filter_text("draw 3d");
        assert_eq!(visible_paths(&tree), ["Display", "Display.DrawScale3D"]);

        tree.set_filter_text("draw health");
        assert!(tree.visible_nodes().is_empty());
    }

    #[test]
    fn test_matching_parent_shows_children_when_expanded() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        let location = tree.find_node_by_path("Movement.Location").unwrap();
        tree.set_expanded(location, true).unwrap();
        tree.set_filter_text("location");

        assert_eq!(
            visible_paths(&tree),
            [
                "Movement",
                "Movement.Location",
                "Movement.Location.X",
                "Movement.Location.Y",
                "Movement.Location.Z",
            ]
        );
    }

    #[test]
    fn test_matching_parent_is_trimmed_to_matching_children() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        // "Stats" matches, and so do most of its properties
        tree.set_filter_text("a");
        let paths = visible_paths(&tree);
        assert!(paths.contains(&"Stats".to_string()));
        assert!(paths.contains(&"Stats.Health".to_string()));
        assert!(paths.contains(&"Stats.Loadouts".to_string()));
        assert!(!paths.contains(&"Stats.Slots".to_string()));
        assert!(!paths.contains(&"Stats.Points".to_string()));

        let stats = tree.find_node_by_path("Stats").unwrap();
        let vis = tree.node(stats).unwrap().visibility();
        assert!(vis.seen_due_to_filter);
        assert!(vis.seen_due_to_child_filter);

        let slots = tree.find_node_by_path("Stats.Slots").unwrap();
        assert!(!tree.node(slots).unwrap().visibility().parent_seen_due_to_filter);
    }

    #[test]
    fn test_matching_category_shows_expanded_grandchildren() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        let location = tree.find_node_by_path("Movement.Location").unwrap();
        tree.set_expanded(location, true).unwrap();
        tree.set_filter_text("movement");

        let paths = visible_paths(&tree);
        for path in [
            "Movement",
            "Movement.Location",
            "Movement.Location.X",
            "Movement.Location.Y",
            "Movement.Location.Z",
            "Movement.Rotation",
        ] {
            assert!(paths.contains(&path.to_string()), "{path} missing from {paths:?}");
        }
        // Rotation is collapsed
        assert!(!paths.contains(&"Movement.Rotation.Pitch".to_string()));
        assert!(!paths.contains(&"Stats".to_string()));
    }

    #[test]
    fn test_normal_expansion_only_outside_filter_paths() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        let stats = tree.find_node_by_path("Stats").unwrap();
        let health = tree.find_node_by_path("Stats.Health").unwrap();
        let armor = tree.find_node_by_path("Stats.Armor").unwrap();
        assert!(tree.is_normal_expansion_allowed(stats));

        tree.set_filter_text("health");
        // Shown only because a descendant matched
        assert!(!tree.is_normal_expansion_allowed(stats));
        assert!(tree.is_normal_expansion_allowed(health));
        assert!(!tree.is_normal_expansion_allowed(armor));

        tree.set_filter_text("movement");
        let location = tree.find_node_by_path("Movement.Location").unwrap();
        assert!(tree.is_normal_expansion_allowed(location));
    }

    #[test]
    fn test_favorites_view_marks_only_favorites_seen() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);

        let health = tree.find_node_by_path("Stats.Health").unwrap();
        tree.set_favorite(health, true).unwrap();
        tree.set_view_mode(ViewMode::Favorites);

        let seen = |tree: &PropertyTree<_>, path: &str| {
            let id = tree.find_node_by_path(path).unwrap();
            tree.node(id).unwrap().visibility().seen
        };
        assert!(seen(&tree, "Stats.Health"));
        assert!(!seen(&tree, "Stats"));
        assert!(!seen(&tree, "Stats.Armor"));
        assert!(!seen(&tree, "Movement.Location"));

        let stats = tree.find_node_by_path("Stats").unwrap();
        let movement = tree.find_node_by_path("Movement").unwrap();
        assert!(tree.node(stats).unwrap().visibility().seen_due_to_child_favorite);
        assert!(!tree.node(movement).unwrap().visibility().seen_due_to_child_favorite);

        tree.set_view_mode(ViewMode::Normal);
        assert!(seen(&tree, "Stats.Armor"));
        assert!(!tree.node(stats).unwrap().visibility().seen_due_to_child_favorite);
    }

    #[test]
    fn test_clearing_filter_restores_view() {
        let fx = Fixture::new();
        let pawn = fx.pawn("Pawn_0");
        let mut tree = fx.tree(&[pawn]);
        let before = tree.visible_nodes().to_vec();

        tree.set_filter_text("tint");
        assert_ne!(tree.visible_nodes(), before.as_slice());

        tree.set_filter_text("");
        assert!(!tree.is_filter_active());
        assert_eq!(tree.visible_nodes(), before.as_slice());
    }

    #[test]
    fn test_differing_only_filter() {
        let fx = Fixture::new();
        let a = fx.pawn("A");
        let b = fx.pawn("B");
        fx.world.set(a, "Health", 1i32).unwrap();
        fx.world.set(b, "Health", 2i32).unwrap();

        let mut tree = fx.tree(&[a, b]);
        tree.set_filter_mode(false, true);

        assert_eq!(visible_paths(&tree), ["Stats", "Stats.Health"]);

        // With one instance the filter does nothing
        let mut single = fx.tree(&[a]);
        single.set_filter_mode(false, true);
        assert!(!single.is_filter_active());
        assert!(single.visible_nodes().len() > 2);
    }

    #[test]
    fn test_modified_only_filter() {
        let fx = Fixture::new();
        let archetype = fx.pawn("Default__Pawn");
        let pawn = fx.world.instantiate(archetype, "Pawn_0").unwrap();
        fx.world.set(pawn, "Brightness", 4.0f32).unwrap();

        let mut tree = fx.tree(&[pawn]);
        tree.set_filter_mode(true, false);

        assert_eq!(
            visible_paths(&tree),
            ["Display", "Display.Lighting", "Display.Lighting.Brightness"]
        );
    }
}
