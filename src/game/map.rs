//! Seeded arena generation

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::ws::protocol::{MapData, SpawnPoint, Wall};

/// Arena width in world units
pub const MAP_WIDTH: f32 = 800.0;
/// Arena height in world units
pub const MAP_HEIGHT: f32 = 600.0;
/// Thickness of the border walls
pub const BORDER_THICKNESS: f32 = 10.0;

const INTERIOR_WALL_ATTEMPTS: usize = 8;
const CENTER_CLEARANCE: f32 = 100.0;
const SPAWN_INSET: f32 = 80.0;

/// Deterministic map provider; the same seed always yields the same layout
pub struct MapGenerator;

impl MapGenerator {
    pub fn generate(seed: u64) -> MapData {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut walls = Self::border_walls();

        for _ in 0..INTERIOR_WALL_ATTEMPTS {
            let wall = if rng.gen_bool(0.5) {
                // Horizontal segment
                Wall {
                    x: rng.gen_range(50.0..650.0),
                    y: rng.gen_range(50.0..550.0),
                    width: rng.gen_range(80.0..150.0),
                    height: rng.gen_range(15.0..25.0),
                }
            } else {
                // Vertical segment
                Wall {
                    x: rng.gen_range(50.0..650.0),
                    y: rng.gen_range(50.0..450.0),
                    width: rng.gen_range(15.0..25.0),
                    height: rng.gen_range(80.0..150.0),
                }
            };

            // Keep the central meeting area open
            if Self::intrudes_center(&wall) {
                continue;
            }

            walls.push(wall);
        }

        MapData {
            width: MAP_WIDTH,
            height: MAP_HEIGHT,
            walls,
            spawn_points: Self::spawn_points(),
            seed,
        }
    }

    fn border_walls() -> Vec<Wall> {
        vec![
            // Top
            Wall { x: 0.0, y: 0.0, width: MAP_WIDTH, height: BORDER_THICKNESS },
            // Bottom
            Wall {
                x: 0.0,
                y: MAP_HEIGHT - BORDER_THICKNESS,
                width: MAP_WIDTH,
                height: BORDER_THICKNESS,
            },
            // Left
            Wall { x: 0.0, y: 0.0, width: BORDER_THICKNESS, height: MAP_HEIGHT },
            // Right
            Wall {
                x: MAP_WIDTH - BORDER_THICKNESS,
                y: 0.0,
                width: BORDER_THICKNESS,
                height: MAP_HEIGHT,
            },
        ]
    }

    fn intrudes_center(wall: &Wall) -> bool {
        let cx = MAP_WIDTH / 2.0;
        let cy = MAP_HEIGHT / 2.0;
        wall.x < cx + CENTER_CLEARANCE
            && wall.x + wall.width > cx - CENTER_CLEARANCE
            && wall.y < cy + CENTER_CLEARANCE
            && wall.y + wall.height > cy - CENTER_CLEARANCE
    }

    fn spawn_points() -> Vec<SpawnPoint> {
        vec![
            SpawnPoint { x: SPAWN_INSET, y: SPAWN_INSET },
            SpawnPoint { x: MAP_WIDTH - SPAWN_INSET, y: SPAWN_INSET },
            SpawnPoint { x: SPAWN_INSET, y: MAP_HEIGHT - SPAWN_INSET },
            SpawnPoint { x: MAP_WIDTH - SPAWN_INSET, y: MAP_HEIGHT - SPAWN_INSET },
            SpawnPoint { x: MAP_WIDTH / 2.0, y: MAP_HEIGHT / 2.0 },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_map() {
        let a = MapGenerator::generate(42);
        let b = MapGenerator::generate(42);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_differ() {
        let a = MapGenerator::generate(1);
        let b = MapGenerator::generate(2);
        // Border walls are fixed; interior layout should diverge
        assert_ne!(a.walls, b.walls);
    }

    #[test]
    fn has_four_borders_and_five_spawns() {
        let map = MapGenerator::generate(7);
        assert!(map.walls.len() >= 4);
        assert_eq!(map.spawn_points.len(), 5);

        let top = &map.walls[0];
        assert_eq!(top.width, MAP_WIDTH);
        assert_eq!(top.height, BORDER_THICKNESS);
    }

    #[test]
    fn interior_walls_leave_center_open() {
        for seed in 0..32 {
            let map = MapGenerator::generate(seed);
            for wall in &map.walls[4..] {
                assert!(
                    !MapGenerator::intrudes_center(wall),
                    "seed {seed} placed a wall in the central clearing"
                );
            }
        }
    }

    #[test]
    fn spawn_points_are_in_bounds() {
        let map = MapGenerator::generate(3);
        for spawn in &map.spawn_points {
            assert!(spawn.x >= BORDER_THICKNESS && spawn.x <= MAP_WIDTH - BORDER_THICKNESS);
            assert!(spawn.y >= BORDER_THICKNESS && spawn.y <= MAP_HEIGHT - BORDER_THICKNESS);
        }
    }
}
