use thiserror::Error;

use epi_runtime::{Area, Position};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("cannot partition the world between zero shards")]
    NoShards,
    #[error("world {world} is too small for a {columns}x{rows} shard layout")]
    WorldTooSmall {
        world: Position,
        columns: i32,
        rows: i32,
    },
}

/// Number of shard columns and rows for `shards` workers. The divisor is the
/// largest `d <= sqrt(shards)` that divides `shards`; the shorter world edge
/// gets `d` strips and the longer one `shards / d`.
pub fn shard_layout(world: Position, shards: usize) -> Result<Position, PartitionError> {
    if shards == 0 {
        return Err(PartitionError::NoShards);
    }
    let divisor = (2..)
        .take_while(|d| d * d <= shards)
        .filter(|d| shards % d == 0)
        .last()
        .unwrap_or(1);
    let short = divisor as i32;
    let long = (shards / divisor) as i32;
    Ok(if world.x < world.y {
        Position::new(short, long)
    } else {
        Position::new(long, short)
    })
}

/// Splits the world anchored at the origin into disjoint blocks covering it.
/// The last column and the last row absorb the remainders. Shard `i` of the
/// result sits at column `i / rows`, row `i % rows`.
pub fn partition_world(world: Position, shards: usize) -> Result<Vec<Area>, PartitionError> {
    let layout = shard_layout(world, shards)?;
    let block = Position::new(world.x / layout.x, world.y / layout.y);
    if block.x <= 0 || block.y <= 0 {
        return Err(PartitionError::WorldTooSmall {
            world,
            columns: layout.x,
            rows: layout.y,
        });
    }

    let mut areas = Vec::with_capacity(shards);
    for column in 0..layout.x {
        for row in 0..layout.y {
            let top_left = Position::new(column * block.x, row * block.y);
            let mut size = block;
            if column == layout.x - 1 {
                size.x += world.x - layout.x * block.x;
            }
            if row == layout.y - 1 {
                size.y += world.y - layout.y * block.y;
            }
            areas.push(Area::new(top_left, size));
        }
    }
    Ok(areas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_prefers_square_blocks() {
        assert_eq!(shard_layout(Position::new(10, 10), 1), Ok(Position::new(1, 1)));
        assert_eq!(shard_layout(Position::new(10, 10), 4), Ok(Position::new(2, 2)));
        assert_eq!(shard_layout(Position::new(10, 10), 7), Ok(Position::new(7, 1)));
        assert_eq!(shard_layout(Position::new(30, 10), 6), Ok(Position::new(3, 2)));
        assert_eq!(shard_layout(Position::new(10, 30), 6), Ok(Position::new(2, 3)));
        assert_eq!(shard_layout(Position::new(10, 10), 0), Err(PartitionError::NoShards));
    }

    #[test]
    fn two_shards_split_the_long_edge() {
        let areas = partition_world(Position::new(10, 10), 2).unwrap();
        assert_eq!(
            areas,
            vec![
                Area::new(Position::new(0, 0), Position::new(5, 10)),
                Area::new(Position::new(5, 0), Position::new(5, 10)),
            ]
        );
    }

    #[test]
    fn remainders_go_to_the_last_row_and_column() {
        let areas = partition_world(Position::new(11, 7), 4).unwrap();
        assert_eq!(areas[0], Area::new(Position::new(0, 0), Position::new(5, 3)));
        assert_eq!(areas[1], Area::new(Position::new(0, 3), Position::new(5, 4)));
        assert_eq!(areas[2], Area::new(Position::new(5, 0), Position::new(6, 3)));
        assert_eq!(areas[3], Area::new(Position::new(5, 3), Position::new(6, 4)));
    }

    #[test]
    fn tiny_world_is_rejected() {
        assert!(matches!(
            partition_world(Position::new(2, 2), 9),
            Err(PartitionError::WorldTooSmall { .. })
        ));
    }
}
