mod memory;
mod types;

use thiserror::Error;

pub use memory::{
    InMemoryWorld, MemoryStructureLibrary, PLAYER_ENTITY_KIND, STRUCTURE_FLOOR_BLOCK,
};
pub use types::{
    BlockPos, BoundingBox, ChunkPos, EntityId, EntitySnapshot, Extent, Rotation,
    StructureTemplate, Weather, CHUNK_SIZE,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("structure template {id} has an empty footprint")]
    EmptyStructure { id: String },
    #[error("structure {id} could not be placed at {origin}: {reason}")]
    PlacementRejected {
        id: String,
        origin: BlockPos,
        reason: String,
    },
}

pub trait StructureLibrary {
    fn template(&self, id: &str) -> Option<StructureTemplate>;
}

pub trait World {
    fn game_time(&self) -> u64;
    fn advance_time(&mut self);

    fn structures(&self) -> &dyn StructureLibrary;
    fn place_structure(
        &mut self,
        template: &StructureTemplate,
        origin: BlockPos,
        rotation: Rotation,
    ) -> Result<BoundingBox, WorldError>;
    fn structure_at(&self, origin: BlockPos) -> Option<BoundingBox>;
    fn clear_structure(&mut self, bounds: BoundingBox);

    fn chunks_loaded(&self, bounds: BoundingBox) -> bool;
    fn release_forced_chunks(&mut self);

    fn block_at(&self, pos: BlockPos) -> Option<String>;
    fn set_block(&mut self, pos: BlockPos, block: Option<&str>);

    fn spawn_entity(&mut self, kind: &str, pos: BlockPos) -> EntityId;
    fn entities_in(&self, bounds: BoundingBox) -> Vec<EntitySnapshot>;
    fn remove_entity(&mut self, id: EntityId) -> bool;

    fn set_time_of_day(&mut self, time: u64);
    fn set_weather(&mut self, weather: Weather);
    fn set_game_rule(&mut self, rule: &str, value: &str);
    fn reset_game_rule(&mut self, rule: &str);
}
