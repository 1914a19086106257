//! Favorites
//!
//! Favorites are stored per root type as a map from qualified path to sort
//! index. Every time they are applied to a tree the indices are compacted
//! to `0..n`: indexed entries keep their relative order, unindexed entries
//! present in the tree follow in display order, and entries for paths the
//! tree does not have come last.

use super::node::{NodeId, NodeKind};
use super::PropertyTree;
use crate::persistence::FavoritesMap;
use crate::reflection::ObjectHost;
use crate::{Error, Result};
use std::collections::HashMap;

/// Which nodes the visible list is built from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    /// The whole tree
    #[default]
    Normal,
    /// Favorites only, in favorite order, each with its visible subtree
    Favorites,
}

/// Direction for [`PropertyTree::move_favorite`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    /// Towards index zero
    Up,
    /// Away from index zero
    Down,
}

/// Compact stored favorites against the paths present in a tree
///
/// `present` lists the tree's paths in display order.
fn compact(stored: &FavoritesMap, present: &[(String, NodeId)]) -> FavoritesMap {
    let mut indexed: Vec<(u32, &String)> = stored
        .iter()
        .filter_map(|(path, index)| index.map(|i| (i, path)))
        .collect();
    indexed.sort();

    let mut ordered: Vec<&String> = indexed.into_iter().map(|(_, path)| path).collect();

    for (path, _) in present {
        if stored.get(path) == Some(&None) && !ordered.contains(&path) {
            ordered.push(path);
        }
    }
    for (path, index) in stored {
        if index.is_none() && !ordered.contains(&path) {
            ordered.push(path);
        }
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, path)| (path.clone(), Some(i as u32)))
        .collect()
}

impl<H: ObjectHost> PropertyTree<H> {
    /// Switch between the normal and the favorites view
    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view = mode;
        self.refresh();
    }

    /// Current view mode
    pub fn view_mode(&self) -> ViewMode {
        self.view
    }

    /// Mark or unmark a property node as a favorite
    ///
    /// New favorites go to the end of the list.
    pub fn set_favorite(&mut self, id: NodeId, favorite: bool) -> Result<()> {
        let node = self.nodes.get(id).ok_or(Error::InvalidNode)?;
        if !matches!(node.kind, NodeKind::Item(_)) {
            return Err(Error::NotAFavorite(node.display_name.clone()));
        }
        let Some(key) = self.favorites_key() else {
            return Err(Error::NoInstances);
        };

        let path = self.qualified_path(id);
        let mut map = self.ctx.store.favorites(&key);

        if favorite {
            if !map.contains_key(&path) {
                let next = map.values().flatten().max().map_or(0, |i| i + 1);
                map.insert(path, Some(next));
            }
        } else {
            map.remove(&path);
        }

        self.ctx.store.set_favorites(&key, map)?;
        self.apply_favorites();
        self.refresh();
        Ok(())
    }

    /// Favorite nodes in favorite order
    pub fn favorites(&self) -> Vec<NodeId> {
        let mut favorites: Vec<(u32, NodeId)> = self
            .descendants(self.root)
            .into_iter()
            .filter_map(|id| {
                let node = self.nodes.get(id)?;
                node.favorite
                    .favorite
                    .then(|| (node.favorite.sort_index.unwrap_or(u32::MAX), id))
            })
            .collect();
        favorites.sort_by_key(|(index, _)| *index);
        favorites.into_iter().map(|(_, id)| id).collect()
    }

    /// Exchange the positions of two favorites
    pub fn swap_favorites(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        let key = self.favorites_key().ok_or(Error::NoInstances)?;
        let path_a = self.favorite_path(a)?;
        let path_b = self.favorite_path(b)?;

        let mut map = self.ctx.store.favorites(&key);
        let index_a = map.get(&path_a).copied().flatten();
        let index_b = map.get(&path_b).copied().flatten();
        map.insert(path_a, index_b);
        map.insert(path_b, index_a);

        self.ctx.store.set_favorites(&key, map)?;
        self.apply_favorites();
        self.refresh();
        Ok(())
    }

    /// Move a favorite one place up or down; returns whether it moved
    pub fn move_favorite(&mut self, id: NodeId, direction: MoveDirection) -> Result<bool> {
        self.favorite_path(id)?;

        let favorites = self.favorites();
        let Some(position) = favorites.iter().position(|&f| f == id) else {
            return Ok(false);
        };

        let neighbor = match direction {
            MoveDirection::Up => position.checked_sub(1),
            MoveDirection::Down => Some(position + 1).filter(|&p| p < favorites.len()),
        };

        match neighbor {
            Some(neighbor) => {
                self.swap_favorites(id, favorites[neighbor])?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether any ancestor of the node is a favorite
    pub fn is_child_of_favorite(&self, id: NodeId) -> bool {
        let mut current = self.nodes.get(id).and_then(|n| n.parent);
        while let Some(ancestor) = current {
            let Some(node) = self.nodes.get(ancestor) else {
                return false;
            };
            if node.favorite.favorite {
                return true;
            }
            current = node.parent;
        }
        false
    }

    fn favorites_key(&self) -> Option<String> {
        self.base_type().map(|ty| ty.name.clone())
    }

    fn favorite_path(&self, id: NodeId) -> Result<String> {
        let node = self.nodes.get(id).ok_or(Error::InvalidNode)?;
        if !node.favorite.favorite {
            return Err(Error::NotAFavorite(node.display_name.clone()));
        }
        Ok(self.qualified_path(id))
    }

    /// Load stored favorites, compact them and mark matching nodes
    pub(super) fn apply_favorites(&mut self) {
        let present: Vec<(String, NodeId)> = self
            .descendants(self.root)
            .into_iter()
            .filter(|&id| self.nodes.get(id).is_some_and(|n| matches!(n.kind, NodeKind::Item(_))))
            .map(|id| (self.qualified_path(id), id))
            .collect();

        for &(_, id) in &present {
            if let Some(node) = self.nodes.get_mut(id) {
                node.favorite = Default::default();
            }
        }

        let Some(key) = self.favorites_key() else {
            return;
        };

        let stored = self.ctx.store.favorites(&key);
        let compacted = compact(&stored, &present);

        let mut by_path: HashMap<&str, NodeId> = HashMap::with_capacity(present.len());
        for (path, id) in &present {
            by_path.entry(path.as_str()).or_insert(*id);
        }

        for (path, index) in &compacted {
            if let Some(node) = by_path.get(path.as_str()).and_then(|&id| self.nodes.get_mut(id)) {
                node.favorite.favorite = true;
                node.favorite.sort_index = *index;
            }
        }

        if compacted != stored {
            tracing::debug!("Compacted {} favorites for {}", compacted.len(), key);
            if let Err(e) = self.ctx.store.set_favorites(&key, compacted) {
                tracing::warn!("Failed to save favorites for {}: {}", key, e);
            }
        }
    }
}
