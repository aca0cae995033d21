use tracing::debug;

use crate::world::{BlockPos, BoundingBox, World};

use super::error::GameTestError;
use super::info::GameTestInfo;

pub const DEFAULT_TESTS_PER_ROW: usize = 8;
const SPACE_BETWEEN_COLUMNS: i32 = 5;
const SPACE_BETWEEN_ROWS: i32 = 6;

pub trait StructureSpawner {
    /// Returns the placed bounds, or `None` if the test cannot run in this
    /// batch. Failures are recorded on the test itself.
    fn spawn_structure(&mut self, info: &mut GameTestInfo, world: &mut dyn World)
        -> Option<BoundingBox>;

    fn on_batch_start(&mut self, _world: &mut dyn World) {}
}

fn place_and_arm(info: &mut GameTestInfo, world: &mut dyn World) -> Option<BoundingBox> {
    let bounds = info.place_structure(world).ok()?;
    info.start_execution(1);
    Some(bounds)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InPlaceSpawner;

impl StructureSpawner for InPlaceSpawner {
    fn spawn_structure(
        &mut self,
        info: &mut GameTestInfo,
        world: &mut dyn World,
    ) -> Option<BoundingBox> {
        info.origin()?;
        place_and_arm(info, world)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NotSetSpawner;

impl StructureSpawner for NotSetSpawner {
    fn spawn_structure(
        &mut self,
        info: &mut GameTestInfo,
        _world: &mut dyn World,
    ) -> Option<BoundingBox> {
        info.fail(GameTestError::Placement {
            structure: info.structure_name().to_string(),
            reason: "no structure spawner is configured for unpositioned tests".to_string(),
        });
        None
    }
}

#[derive(Debug, Clone)]
pub struct StructureGridSpawner {
    origin: BlockPos,
    tests_per_row: usize,
    clear_on_batch_start: bool,
    next_corner: BlockPos,
    row_bounds: Option<BoundingBox>,
    placed_in_row: usize,
    all_bounds: Option<BoundingBox>,
}

impl StructureGridSpawner {
    pub fn new(origin: BlockPos, tests_per_row: usize, clear_on_batch_start: bool) -> Self {
        Self {
            origin,
            tests_per_row: tests_per_row.max(1),
            clear_on_batch_start,
            next_corner: origin,
            row_bounds: None,
            placed_in_row: 0,
            all_bounds: None,
        }
    }

    pub fn next_corner(&self) -> BlockPos {
        self.next_corner
    }

    pub fn max_x(&self) -> Option<i32> {
        self.all_bounds.map(|bounds| bounds.max().x)
    }

    fn reset_cursor(&mut self) {
        self.next_corner = self.origin;
        self.row_bounds = None;
        self.placed_in_row = 0;
        self.all_bounds = None;
    }
}

impl StructureSpawner for StructureGridSpawner {
    fn spawn_structure(
        &mut self,
        info: &mut GameTestInfo,
        world: &mut dyn World,
    ) -> Option<BoundingBox> {
        info.set_origin(self.next_corner);
        let bounds = place_and_arm(info, world)?;

        self.row_bounds = Some(match self.row_bounds {
            Some(row) => row.encapsulate(&bounds),
            None => bounds,
        });
        self.all_bounds = Some(match self.all_bounds {
            Some(all) => all.encapsulate(&bounds),
            None => bounds,
        });

        self.next_corner = self
            .next_corner
            .offset(bounds.x_size() + SPACE_BETWEEN_COLUMNS, 0, 0);
        self.placed_in_row += 1;
        if self.placed_in_row >= self.tests_per_row {
            let row_depth = self.row_bounds.map(|row| row.z_size()).unwrap_or(0);
            self.next_corner = BlockPos::new(
                self.origin.x,
                self.next_corner.y,
                self.next_corner.z + row_depth + SPACE_BETWEEN_ROWS,
            );
            self.placed_in_row = 0;
            self.row_bounds = None;
        }
        Some(bounds)
    }

    fn on_batch_start(&mut self, world: &mut dyn World) {
        if !self.clear_on_batch_start {
            return;
        }
        if let Some(all) = self.all_bounds {
            debug!(bounds = %all, "grid_cleared");
            world.clear_structure(all);
        }
        self.reset_cursor();
    }
}
