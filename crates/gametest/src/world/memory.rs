use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::types::{
    BlockPos, BoundingBox, ChunkPos, EntityId, EntitySnapshot, Extent, Rotation,
    StructureTemplate, Weather,
};
use super::{StructureLibrary, World, WorldError};

pub const STRUCTURE_FLOOR_BLOCK: &str = "minecraft:smooth_stone";
pub const PLAYER_ENTITY_KIND: &str = "minecraft:player";

#[derive(Debug, Default, Clone)]
pub struct MemoryStructureLibrary {
    templates: HashMap<String, StructureTemplate>,
}

impl MemoryStructureLibrary {
    pub fn insert(&mut self, id: impl Into<String>, size: Extent) {
        let id = id.into();
        self.templates.insert(id.clone(), StructureTemplate { id, size });
    }
}

impl StructureLibrary for MemoryStructureLibrary {
    fn template(&self, id: &str) -> Option<StructureTemplate> {
        self.templates.get(id).cloned()
    }
}

#[derive(Debug, Default)]
struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone)]
struct EntityRecord {
    id: EntityId,
    kind: String,
    pos: BlockPos,
}

#[derive(Debug, Clone)]
struct PlacedStructure {
    origin: BlockPos,
    bounds: BoundingBox,
}

#[derive(Debug, Default)]
pub struct InMemoryWorld {
    game_time: u64,
    time_of_day: u64,
    weather: Weather,
    game_rules: BTreeMap<String, String>,
    structures: MemoryStructureLibrary,
    rejected_templates: HashSet<String>,
    placed: Vec<PlacedStructure>,
    blocks: HashMap<BlockPos, String>,
    allocator: EntityIdAllocator,
    entities: Vec<EntityRecord>,
    unloaded_chunks: HashSet<ChunkPos>,
    forced_chunks: BTreeSet<ChunkPos>,
}

impl InMemoryWorld {
    pub fn with_structure(mut self, id: impl Into<String>, size: Extent) -> Self {
        self.structures.insert(id, size);
        self
    }

    pub fn reject_placement_of(&mut self, id: impl Into<String>) {
        self.rejected_templates.insert(id.into());
    }

    pub fn set_chunks_loaded(&mut self, bounds: BoundingBox, loaded: bool) {
        for chunk in bounds.chunks() {
            if loaded {
                self.unloaded_chunks.remove(&chunk);
            } else {
                self.unloaded_chunks.insert(chunk);
            }
        }
    }

    pub fn forced_chunk_count(&self) -> usize {
        self.forced_chunks.len()
    }

    pub fn placed_structure_count(&self) -> usize {
        self.placed.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn spawn_player(&mut self, pos: BlockPos) -> EntityId {
        self.spawn_entity(PLAYER_ENTITY_KIND, pos)
    }

    pub fn time_of_day(&self) -> u64 {
        self.time_of_day
    }

    pub fn weather(&self) -> Weather {
        self.weather
    }

    pub fn game_rule(&self, rule: &str) -> Option<&str> {
        self.game_rules.get(rule).map(String::as_str)
    }
}

impl World for InMemoryWorld {
    fn game_time(&self) -> u64 {
        self.game_time
    }

    fn advance_time(&mut self) {
        self.game_time = self.game_time.saturating_add(1);
        self.time_of_day = self.time_of_day.saturating_add(1);
    }

    fn structures(&self) -> &dyn StructureLibrary {
        &self.structures
    }

    fn place_structure(
        &mut self,
        template: &StructureTemplate,
        origin: BlockPos,
        rotation: Rotation,
    ) -> Result<BoundingBox, WorldError> {
        if template.size.is_empty() {
            return Err(WorldError::EmptyStructure {
                id: template.id.clone(),
            });
        }
        if self.rejected_templates.contains(&template.id) {
            return Err(WorldError::PlacementRejected {
                id: template.id.clone(),
                origin,
                reason: "template data could not be loaded".to_string(),
            });
        }

        let bounds = BoundingBox::of_structure(origin, template.size, rotation);
        self.clear_structure(bounds);
        for x in bounds.min().x..=bounds.max().x {
            for z in bounds.min().z..=bounds.max().z {
                self.blocks.insert(
                    BlockPos::new(x, bounds.min().y, z),
                    STRUCTURE_FLOOR_BLOCK.to_string(),
                );
            }
        }
        self.forced_chunks.extend(bounds.chunks());
        self.placed.push(PlacedStructure { origin, bounds });
        Ok(bounds)
    }

    fn structure_at(&self, origin: BlockPos) -> Option<BoundingBox> {
        self.placed
            .iter()
            .rev()
            .find(|placed| placed.origin == origin)
            .map(|placed| placed.bounds)
    }

    fn clear_structure(&mut self, bounds: BoundingBox) {
        self.blocks.retain(|pos, _| !bounds.contains(*pos));
        self.entities.retain(|entity| !bounds.contains(entity.pos));
        self.placed.retain(|placed| !placed.bounds.intersects(&bounds));
    }

    fn chunks_loaded(&self, bounds: BoundingBox) -> bool {
        bounds
            .chunks()
            .all(|chunk| !self.unloaded_chunks.contains(&chunk))
    }

    fn release_forced_chunks(&mut self) {
        self.forced_chunks.clear();
    }

    fn block_at(&self, pos: BlockPos) -> Option<String> {
        self.blocks.get(&pos).cloned()
    }

    fn set_block(&mut self, pos: BlockPos, block: Option<&str>) {
        match block {
            Some(block) => {
                self.blocks.insert(pos, block.to_string());
            }
            None => {
                self.blocks.remove(&pos);
            }
        }
    }

    fn spawn_entity(&mut self, kind: &str, pos: BlockPos) -> EntityId {
        let id = self.allocator.allocate();
        self.entities.push(EntityRecord {
            id,
            kind: kind.to_string(),
            pos,
        });
        id
    }

    fn entities_in(&self, bounds: BoundingBox) -> Vec<EntitySnapshot> {
        self.entities
            .iter()
            .filter(|entity| bounds.contains(entity.pos))
            .map(|entity| EntitySnapshot {
                id: entity.id,
                kind: entity.kind.clone(),
                pos: entity.pos,
                is_player: entity.kind == PLAYER_ENTITY_KIND,
            })
            .collect()
    }

    fn remove_entity(&mut self, id: EntityId) -> bool {
        let before = self.entities.len();
        self.entities.retain(|entity| entity.id != id);
        self.entities.len() != before
    }

    fn set_time_of_day(&mut self, time: u64) {
        self.time_of_day = time;
    }

    fn set_weather(&mut self, weather: Weather) {
        self.weather = weather;
    }

    fn set_game_rule(&mut self, rule: &str, value: &str) {
        self.game_rules.insert(rule.to_string(), value.to_string());
    }

    fn reset_game_rule(&mut self, rule: &str) {
        self.game_rules.remove(rule);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_box() -> InMemoryWorld {
        InMemoryWorld::default().with_structure("test:box", Extent::new(3, 3, 3))
    }

    #[test]
    fn allocator_never_reuses_ids() {
        let mut world = InMemoryWorld::default();
        let first = world.spawn_entity("minecraft:pig", BlockPos::ORIGIN);
        world.remove_entity(first);
        let second = world.spawn_entity("minecraft:pig", BlockPos::ORIGIN);

        assert_eq!(first, EntityId(0));
        assert_eq!(second, EntityId(1));
    }

    #[test]
    fn placing_structure_records_bounds_and_forces_chunks() {
        let mut world = world_with_box();
        let template = world.structures().template("test:box").expect("template");
        let bounds = world
            .place_structure(&template, BlockPos::new(14, 0, 0), Rotation::None)
            .expect("place");

        assert_eq!(world.structure_at(BlockPos::new(14, 0, 0)), Some(bounds));
        assert_eq!(world.forced_chunk_count(), 2);
        assert_eq!(
            world.block_at(BlockPos::new(15, 0, 1)).as_deref(),
            Some(STRUCTURE_FLOOR_BLOCK)
        );

        world.release_forced_chunks();
        assert_eq!(world.forced_chunk_count(), 0);
    }

    #[test]
    fn rejected_template_fails_placement() {
        let mut world = world_with_box();
        world.reject_placement_of("test:box");
        let template = world.structures().template("test:box").expect("template");

        let result = world.place_structure(&template, BlockPos::ORIGIN, Rotation::None);
        assert!(matches!(result, Err(WorldError::PlacementRejected { .. })));
        assert_eq!(world.placed_structure_count(), 0);
    }

    #[test]
    fn clear_structure_removes_blocks_entities_and_record() {
        let mut world = world_with_box();
        let template = world.structures().template("test:box").expect("template");
        let bounds = world
            .place_structure(&template, BlockPos::ORIGIN, Rotation::None)
            .expect("place");
        world.spawn_entity("minecraft:pig", BlockPos::new(1, 1, 1));
        world.spawn_entity("minecraft:pig", BlockPos::new(10, 1, 1));

        world.clear_structure(bounds);

        assert!(world.structure_at(BlockPos::ORIGIN).is_none());
        assert!(world.block_at(BlockPos::ORIGIN).is_none());
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn unloaded_chunk_blocks_bounds_check() {
        let mut world = world_with_box();
        let bounds = BoundingBox::from_corners(BlockPos::ORIGIN, BlockPos::new(20, 0, 0));
        assert!(world.chunks_loaded(bounds));

        world.set_chunks_loaded(BoundingBox::at(BlockPos::new(17, 0, 0)), false);
        assert!(!world.chunks_loaded(bounds));
        assert!(world.chunks_loaded(BoundingBox::at(BlockPos::ORIGIN)));
    }

    #[test]
    fn game_rules_reset_to_unset() {
        let mut world = InMemoryWorld::default();
        world.set_game_rule("doMobSpawning", "false");
        assert_eq!(world.game_rule("doMobSpawning"), Some("false"));

        world.reset_game_rule("doMobSpawning");
        assert_eq!(world.game_rule("doMobSpawning"), None);
    }
}
