//! Shared test types and helpers for the tree tests

use super::{EditorContext, PropertyTree};
use crate::config::InspectorConfig;
use crate::persistence::MemoryLayoutStore;
use crate::reflection::{
    ObjectRef, ObjectWorld, PropertyFlags, PropertyKind, PropertyMeta, PropertySpec, ScalarKind,
    TypeBuilder, TypeRegistry,
};
use std::sync::Arc;

pub(crate) const ACTOR: &str = "Actor";
pub(crate) const PAWN: &str = "Pawn";

fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    let float = |name: &str| PropertySpec::scalar(name, ScalarKind::Float);
    let byte = |name: &str| PropertySpec::scalar(name, ScalarKind::Byte);
    let int = |name: &str| PropertySpec::scalar(name, ScalarKind::Int);

    TypeBuilder::structure("Vector")
        .property(float("X"))
        .property(float("Y"))
        .property(float("Z"))
        .register(&mut registry)
        .unwrap();
    TypeBuilder::structure("Rotator")
        .property(float("Pitch"))
        .property(float("Yaw"))
        .property(float("Roll"))
        .register(&mut registry)
        .unwrap();
    TypeBuilder::structure("Color")
        .property(byte("R"))
        .property(byte("G"))
        .property(byte("B"))
        .property(byte("A"))
        .register(&mut registry)
        .unwrap();
    TypeBuilder::structure("Transform")
        .property(PropertySpec::structure("Origin", "Vector"))
        .property(float("Scale"))
        .register(&mut registry)
        .unwrap();
    TypeBuilder::structure("Loadout")
        .property(PropertySpec::array("Items", PropertyKind::Scalar(ScalarKind::Int)))
        .register(&mut registry)
        .unwrap();

    TypeBuilder::class("Object").register(&mut registry).unwrap();

    TypeBuilder::class(ACTOR)
        .extends("Object")
        .hide_category("Internal")
        .property(PropertySpec::scalar("bHidden", ScalarKind::Bool).category("Display"))
        .property(PropertySpec::structure("DrawScale3D", "Vector").category("Display"))
        .property(PropertySpec::structure("Tint", "Color").category("Display"))
        .property(float("Brightness").category("Display.Lighting"))
        .property(PropertySpec::structure("Location", "Vector").category("Movement"))
        .property(PropertySpec::structure("Rotation", "Rotator").category("Movement"))
        .property(
            PropertySpec::structure("Shallow", "Transform")
                .category("Movement")
                .meta(PropertyMeta {
                    max_depth: Some(1),
                    ..PropertyMeta::default()
                }),
        )
        .property(int("Debug").category("Internal"))
        .register(&mut registry)
        .unwrap();

    TypeBuilder::class(PAWN)
        .extends(ACTOR)
        .property(int("Health").category("Stats"))
        .property(int("Armor").category("Stats").flags(PropertyFlags::EDIT | PropertyFlags::EDIT_CONST))
        .property(int("Slots").category("Stats").dim(4))
        .property(PropertySpec::array("Tags", PropertyKind::Scalar(ScalarKind::Int)).category("Stats"))
        .property(
            PropertySpec::array("FixedTags", PropertyKind::Scalar(ScalarKind::Int))
                .category("Stats")
                .flags(PropertyFlags::EDIT | PropertyFlags::EDIT_FIXED_SIZE),
        )
        .property(PropertySpec::object("Target", ACTOR).category("Stats"))
        .property(
            PropertySpec::array(
                "Points",
                PropertyKind::Struct {
                    type_name: "Vector".to_string(),
                },
            )
            .category("Stats"),
        )
        .property(
            PropertySpec::array(
                "Loadouts",
                PropertyKind::Struct {
                    type_name: "Loadout".to_string(),
                },
            )
            .category("Stats"),
        )
        .property(int("Secret").category("Stats").flags(PropertyFlags::empty()))
        .property(
            PropertySpec::structure("Cache", "Vector")
                .category("Stats")
                .flags(PropertyFlags::empty()),
        )
        .register(&mut registry)
        .unwrap();

    registry
}

/// A world with the test types and a layout store shared by every tree it
/// creates
pub(crate) struct Fixture {
    pub world: Arc<ObjectWorld>,
    pub store: MemoryLayoutStore,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            world: Arc::new(ObjectWorld::new(registry())),
            store: MemoryLayoutStore::new(),
        }
    }

    pub fn pawn(&self, name: &str) -> ObjectRef {
        self.world.spawn(PAWN, name).unwrap()
    }

    pub fn actor(&self, name: &str) -> ObjectRef {
        self.world.spawn(ACTOR, name).unwrap()
    }

    pub fn tree(&self, objects: &[ObjectRef]) -> PropertyTree<ObjectWorld> {
        self.tree_with(objects, |_| {})
    }

    pub fn tree_with(
        &self,
        objects: &[ObjectRef],
        configure: impl FnOnce(&mut InspectorConfig),
    ) -> PropertyTree<ObjectWorld> {
        let mut config = InspectorConfig::default();
        configure(&mut config);

        let ctx = EditorContext::new(Arc::clone(&self.world), config, Box::new(self.store.clone()));
        let mut tree = PropertyTree::new(ctx);
        tree.bind(objects);
        tree
    }
}
