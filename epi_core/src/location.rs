use std::collections::BTreeSet;

use epi_runtime::{ContagionParameters, LocationDef, LocationKind, PersonId, Position};

/// One world cell owned by a shard: its type, its admission list and the
/// people currently standing on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    position: Position,
    kind: LocationKind,
    whitelist: BTreeSet<PersonId>,
    visitors: BTreeSet<PersonId>,
}

impl Location {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            kind: LocationKind::Default,
            whitelist: BTreeSet::new(),
            visitors: BTreeSet::new(),
        }
    }

    pub fn from_def(def: &LocationDef) -> Self {
        Self {
            position: def.position,
            kind: def.kind,
            whitelist: def.whitelist.iter().copied().collect(),
            visitors: BTreeSet::new(),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    pub fn is_whitelisted(&self, id: PersonId) -> bool {
        self.whitelist.contains(&id)
    }

    /// Admission check: the cell's policy switch must be on, whitelisted
    /// kinds must list the person, and nobody enters a cell twice.
    pub fn admits(&self, id: PersonId, params: &ContagionParameters) -> bool {
        if self.visitors.contains(&id) {
            return false;
        }
        let policy = self.kind.policy();
        if let Some(switch) = policy.switch {
            if !params.is_open(switch) {
                return false;
            }
        }
        !policy.whitelisted || self.is_whitelisted(id)
    }

    pub fn contains(&self, id: PersonId) -> bool {
        self.visitors.contains(&id)
    }

    pub fn visitors(&self) -> impl Iterator<Item = PersonId> + '_ {
        self.visitors.iter().copied()
    }

    pub fn visitor_count(&self) -> usize {
        self.visitors.len()
    }

    pub(crate) fn insert_visitor(&mut self, id: PersonId) -> bool {
        self.visitors.insert(id)
    }

    pub(crate) fn remove_visitor(&mut self, id: PersonId) -> bool {
        self.visitors.remove(&id)
    }

    /// Replaces the cell definition, keeping whoever is already standing here.
    pub(crate) fn redefine(&mut self, def: &LocationDef) {
        self.kind = def.kind;
        self.whitelist = def.whitelist.iter().copied().collect();
    }
}
