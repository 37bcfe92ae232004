use epi_runtime::{Area, ExtractEntry, LocationKind, Position, Stats};

/// What the coordinator knows about one cell of the extract window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLocation {
    pub kind: LocationKind,
    pub stats: Stats,
}

/// Aggregated snapshot of a world window, assembled from the shards'
/// `Extract` replies. Cells no shard reported stay `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extract {
    window: Area,
    cells: Vec<Option<ExtractLocation>>,
}

impl Extract {
    pub fn new(window: Area) -> Self {
        Self {
            window,
            cells: vec![None; window.cell_count()],
        }
    }

    /// New extract for `window` that keeps `previous` data where the two
    /// windows overlap.
    pub fn resized_from(previous: &Extract, window: Area) -> Self {
        let mut extract = Extract::new(window);
        for (position, location) in previous.iter() {
            if let Some(slot) = extract.slot_mut(position) {
                *slot = Some(*location);
            }
        }
        extract
    }

    pub fn window(&self) -> Area {
        self.window
    }

    /// Stores one reported cell. Cells outside the window are ignored.
    pub fn insert(&mut self, entry: &ExtractEntry) -> bool {
        match self.slot_mut(entry.position) {
            Some(slot) => {
                *slot = Some(ExtractLocation {
                    kind: entry.kind,
                    stats: entry.stats,
                });
                true
            }
            None => false,
        }
    }

    pub fn get(&self, position: Position) -> Option<&ExtractLocation> {
        self.window
            .index_of(position)
            .and_then(|index| self.cells.get(index))
            .and_then(Option::as_ref)
    }

    /// Filled cells in column-major window order.
    pub fn iter(&self) -> impl Iterator<Item = (Position, &ExtractLocation)> {
        self.window
            .positions()
            .filter_map(|position| self.get(position).map(|cell| (position, cell)))
    }

    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub fn total(&self) -> Stats {
        self.iter().map(|(_, cell)| cell.stats).sum()
    }

    pub fn entries(&self) -> Vec<ExtractEntry> {
        self.iter()
            .map(|(position, cell)| ExtractEntry {
                position,
                kind: cell.kind,
                stats: cell.stats,
            })
            .collect()
    }

    fn slot_mut(&mut self, position: Position) -> Option<&mut Option<ExtractLocation>> {
        let index = self.window.index_of(position)?;
        self.cells.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(x: i32, y: i32, infected: u64) -> ExtractEntry {
        ExtractEntry {
            position: Position::new(x, y),
            kind: LocationKind::Default,
            stats: Stats {
                infected,
                ..Stats::default()
            },
        }
    }

    #[test]
    fn insert_respects_the_window() {
        let mut extract = Extract::new(Area::new(Position::new(2, 2), Position::new(2, 2)));
        assert!(extract.insert(&entry(3, 3, 4)));
        assert!(!extract.insert(&entry(4, 3, 1)));
        assert_eq!(extract.filled(), 1);
        assert!(!extract.is_complete());
        assert_eq!(extract.get(Position::new(3, 3)).map(|c| c.stats.infected), Some(4));
        assert_eq!(extract.total().infected, 4);
    }

    #[test]
    fn resize_carries_overlapping_cells() {
        let mut old = Extract::new(Area::new(Position::new(0, 0), Position::new(3, 3)));
        old.insert(&entry(0, 0, 1));
        old.insert(&entry(2, 2, 2));
        let moved = Extract::resized_from(&old, Area::new(Position::new(2, 2), Position::new(3, 3)));
        assert_eq!(moved.filled(), 1);
        assert_eq!(moved.get(Position::new(2, 2)).map(|c| c.stats.infected), Some(2));
        assert!(moved.get(Position::new(0, 0)).is_none());
        assert_eq!(moved.entries(), vec![entry(2, 2, 2)]);
    }
}
