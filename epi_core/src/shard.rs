use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use epi_runtime::{
    Area, ContagionParameters, ExtractEntry, HealthState, LocationDef, PersonId, PersonRecord,
    Position, Stats, HOURS_PER_DAY,
};

use crate::location::Location;
use crate::person::Person;

/// A resident that wants to cross into another shard's area. It stays in
/// the origin roster until the coordinator relays the destination's verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Migrant {
    pub person: PersonRecord,
    pub target: Position,
}

/// The worker-side grid: every cell of one rectangle plus the roster of
/// people standing on them.
#[derive(Debug, Default)]
pub struct ShardGrid {
    area: Area,
    cells: Vec<Location>,
    residents: BTreeMap<PersonId, Person>,
    awaiting: BTreeSet<PersonId>,
    hour: u64,
    params: ContagionParameters,
}

impl ShardGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the grid to `area` with plain cells and no residents. The
    /// hour counter restarts; contagion parameters are kept.
    pub fn set_up(&mut self, area: Area) {
        self.area = area;
        self.cells = area.positions().map(Location::new).collect();
        self.residents.clear();
        self.awaiting.clear();
        self.hour = 0;
        tracing::debug!(
            target: "epigrid::shard",
            area = %area,
            cells = self.cells.len(),
            "shard.set_up"
        );
    }

    pub fn area(&self) -> Area {
        self.area
    }

    pub fn hour(&self) -> u64 {
        self.hour
    }

    pub fn parameters(&self) -> &ContagionParameters {
        &self.params
    }

    pub fn set_parameters(&mut self, params: ContagionParameters) {
        self.params = params;
    }

    pub fn location(&self, position: Position) -> Option<&Location> {
        self.area
            .index_of(position)
            .and_then(|index| self.cells.get(index))
    }

    pub fn resident(&self, id: PersonId) -> Option<&Person> {
        self.residents.get(&id)
    }

    pub fn residents(&self) -> impl Iterator<Item = &Person> {
        self.residents.values()
    }

    pub fn resident_count(&self) -> usize {
        self.residents.len()
    }

    pub fn awaiting_count(&self) -> usize {
        self.awaiting.len()
    }

    pub fn is_awaiting(&self, id: PersonId) -> bool {
        self.awaiting.contains(&id)
    }

    /// Installs a cell definition. Definitions outside the area are dropped.
    pub fn add_location(&mut self, def: &LocationDef) -> bool {
        let Some(cell) = self
            .area
            .index_of(def.position)
            .and_then(|index| self.cells.get_mut(index))
        else {
            tracing::warn!(
                target: "epigrid::shard",
                position = %def.position,
                area = %self.area,
                "shard.location_out_of_area"
            );
            return false;
        };
        cell.redefine(def);
        true
    }

    /// Places an incoming person on `target`. Nothing changes on rejection.
    pub fn add_person(&mut self, record: PersonRecord, target: Position) -> bool {
        let id = record.id;
        if self.residents.contains_key(&id) {
            tracing::warn!(target: "epigrid::shard", id, "shard.person_already_resident");
            return false;
        }
        let Some(cell) = self
            .area
            .index_of(target)
            .and_then(|index| self.cells.get_mut(index))
        else {
            tracing::warn!(
                target: "epigrid::shard",
                id,
                target_position = %target,
                "shard.person_out_of_area"
            );
            return false;
        };
        if !cell.admits(id, &self.params) {
            return false;
        }
        cell.insert_visitor(id);
        let mut person = Person::from_record(record);
        person.set_cell(Some(target));
        self.residents.insert(id, person);
        true
    }

    /// Advances the clock one hour and moves every living resident. Moves
    /// inside the area happen immediately (a refused cell leaves the person
    /// where they are); moves outside are returned as migrants and recorded
    /// as awaiting confirmation.
    pub fn move_people<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<Migrant> {
        self.hour += 1;
        let hour = self.hour % HOURS_PER_DAY as u64;
        let ids: Vec<PersonId> = self.residents.keys().copied().collect();
        let mut migrants = Vec::new();

        for id in ids {
            if self.awaiting.contains(&id) {
                continue;
            }
            let target = match self.residents.get(&id) {
                Some(person) if person.health() != HealthState::Deceased => {
                    person.next_position(hour, &self.params, rng)
                }
                _ => continue,
            };
            if self.area.contains(target) {
                self.visit(id, target);
            } else if let Some(person) = self.residents.get(&id) {
                migrants.push(Migrant {
                    person: person.to_record(),
                    target,
                });
                self.awaiting.insert(id);
            }
        }

        tracing::debug!(
            target: "epigrid::shard",
            hour = self.hour,
            migrants = migrants.len(),
            "shard.people_moved"
        );
        migrants
    }

    /// Applies the destination's verdict on an emigrant. Accepted people
    /// leave their cell and the roster; rejected ones stay where they were.
    /// Returns false for ids that were not awaiting a verdict.
    pub fn confirm(&mut self, id: PersonId, accepted: bool) -> bool {
        if !self.awaiting.remove(&id) {
            tracing::warn!(target: "epigrid::shard", id, "shard.unknown_confirmation");
            return false;
        }
        if accepted {
            if let Some(person) = self.residents.remove(&id) {
                if let Some(cell) = person.cell() {
                    self.leave(id, cell);
                }
            }
        }
        true
    }

    /// One spread-and-progress pass per cell. Infectious people are fixed
    /// when the cell's pass starts, so someone infected in this pass does
    /// not spread until the next one.
    pub fn calculate_health<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for index in 0..self.cells.len() {
            let cell = &self.cells[index];
            if cell.visitor_count() == 0 {
                continue;
            }
            let chance = self.params.effective_spread(cell.kind());
            let visitors: Vec<PersonId> = cell.visitors().collect();
            let infectious: Vec<PersonId> = visitors
                .iter()
                .copied()
                .filter(|id| {
                    self.residents
                        .get(id)
                        .is_some_and(|person| person.health().is_infectious())
                })
                .collect();

            for source in infectious {
                for contact in &visitors {
                    if let Some(person) = self.residents.get_mut(contact) {
                        person.try_infect(chance, rng);
                    }
                }
                if let Some(person) = self.residents.get_mut(&source) {
                    person.progress_disease(&self.params, rng);
                }
            }
        }
    }

    pub fn stats(&self) -> Stats {
        self.residents.values().map(Person::health).collect()
    }

    pub fn cell_stats(&self, cell: &Location) -> Stats {
        cell.visitors()
            .filter_map(|id| self.residents.get(&id))
            .map(Person::health)
            .collect()
    }

    /// Per-cell tallies for the overlap of `window` with this shard, in
    /// column-major order. Empty when they do not overlap.
    pub fn extract(&self, window: &Area) -> Vec<ExtractEntry> {
        let overlap = self.area.intersection(window);
        if overlap.is_empty() {
            return Vec::new();
        }
        overlap
            .positions()
            .filter_map(|position| self.location(position))
            .map(|cell| ExtractEntry {
                position: cell.position(),
                kind: cell.kind(),
                stats: self.cell_stats(cell),
            })
            .collect()
    }

    fn visit(&mut self, id: PersonId, target: Position) -> bool {
        let Some(index) = self.area.index_of(target) else {
            return false;
        };
        let admitted = self
            .cells
            .get(index)
            .is_some_and(|cell| cell.admits(id, &self.params));
        if !admitted {
            return false;
        }
        let previous = self.residents.get(&id).and_then(Person::cell);
        if let Some(previous) = previous {
            self.leave(id, previous);
        }
        if let Some(cell) = self.cells.get_mut(index) {
            cell.insert_visitor(id);
        }
        if let Some(person) = self.residents.get_mut(&id) {
            person.set_cell(Some(target));
        }
        true
    }

    fn leave(&mut self, id: PersonId, position: Position) {
        if let Some(cell) = self
            .area
            .index_of(position)
            .and_then(|index| self.cells.get_mut(index))
        {
            cell.remove_visitor(id);
        }
        if let Some(person) = self.residents.get_mut(&id) {
            person.set_cell(None);
        }
    }
}
