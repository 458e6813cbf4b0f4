//! Catalog: the named relations of one program
//!
//! Relations are registered once, before evaluation, and addressed afterwards
//! by a dense [`RelationId`]. Name lookups happen only while a plan is being
//! compiled; the driver works on ids.

use crate::error::{EngineError, EngineResult};
use crate::relation::{Relation, RelationSpec};
use crate::statistics::EngineStatistics;
use crate::tuple::Word;
use std::collections::HashMap;
use std::fmt;

/// Dense handle of a relation in its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(usize);

impl RelationId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Catalog tracks every relation of a program
#[derive(Debug, Default)]
pub struct Catalog {
    relations: Vec<Relation>,
    by_name: HashMap<String, RelationId>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register a relation
    pub fn register(&mut self, spec: RelationSpec) -> EngineResult<RelationId> {
        if self.by_name.contains_key(&spec.name) {
            return Err(EngineError::DuplicateRelation(spec.name));
        }
        let relation = Relation::new(spec)?;
        let id = RelationId(self.relations.len());
        self.by_name.insert(relation.name().to_string(), id);
        self.relations.push(relation);
        Ok(id)
    }

    pub fn id(&self, name: &str) -> Option<RelationId> {
        self.by_name.get(name).copied()
    }

    /// Like [`Catalog::id`] but an unknown name is an error
    pub fn resolve(&self, name: &str) -> EngineResult<RelationId> {
        self.id(name)
            .ok_or_else(|| EngineError::UnknownRelation(name.to_string()))
    }

    /// Relation behind an id issued by this catalog
    pub fn get(&self, id: RelationId) -> &Relation {
        &self.relations[id.0]
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.id(name).map(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Relations in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    /// Exchange the contents of two relations. Names stay put.
    pub fn swap(&mut self, a: RelationId, b: RelationId) -> EngineResult<()> {
        if a == b {
            return Ok(());
        }
        let (low, high) = if a.0 < b.0 { (a.0, b.0) } else { (b.0, a.0) };
        let (head, tail) = self.relations.split_at_mut(high);
        let (left, right) = (&mut head[low], &mut tail[0]);
        if !left.same_shape(right) {
            return Err(EngineError::ShapeMismatch {
                left: left.name().to_string(),
                right: right.name().to_string(),
            });
        }
        left.swap_contents(right);
        Ok(())
    }

    /// Load literal facts into `name`. Returns how many were new.
    pub fn insert_facts<I, T>(&self, name: &str, facts: I) -> EngineResult<usize>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[Word]>,
    {
        let relation = self.get(self.resolve(name)?);
        let mut ctx = relation.create_context();
        let mut inserted = 0;
        for fact in facts {
            if relation.try_insert_with(fact.as_ref(), &mut ctx)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    pub fn statistics(&self) -> EngineStatistics {
        EngineStatistics {
            relations: self.relations.iter().map(Relation::statistics).collect(),
        }
    }
}
