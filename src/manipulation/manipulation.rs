//! Invertible manipulations
//!
//! Every manipulation is created together with its inverse. `inverse()` swaps
//! the two sides, so the inverse of the inverse is the original manipulation
//! with the same identity.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::{Entity, Value, ValueMap};

static NEXT_MANIPULATION_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_MANIPULATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// A property of a specific entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyOwner {
    pub entity: Entity,
    pub property: String,
}

impl PropertyOwner {
    pub fn new(entity: Entity, property: impl Into<String>) -> Self {
        Self {
            entity,
            property: property.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManipulationType {
    Instantiation,
    Delete,
    ChangeValue,
    Add,
    Remove,
    Compound,
}

/// Payload of a manipulation.
///
/// Collection items are keyed per collection kind: list index → element,
/// set element → element, map key → value.
#[derive(Debug)]
pub enum ManipulationKind {
    Instantiation { entity: Entity },
    Delete { entity: Entity },
    ChangeValue { owner: PropertyOwner, new_value: Value },
    Add { owner: PropertyOwner, items: ValueMap },
    Remove { owner: PropertyOwner, items: ValueMap },
    Compound { manipulations: Vec<Manipulation> },
}

impl ManipulationKind {
    pub fn manipulation_type(&self) -> ManipulationType {
        match self {
            ManipulationKind::Instantiation { .. } => ManipulationType::Instantiation,
            ManipulationKind::Delete { .. } => ManipulationType::Delete,
            ManipulationKind::ChangeValue { .. } => ManipulationType::ChangeValue,
            ManipulationKind::Add { .. } => ManipulationType::Add,
            ManipulationKind::Remove { .. } => ManipulationType::Remove,
            ManipulationKind::Compound { .. } => ManipulationType::Compound,
        }
    }

    /// The entity a leaf manipulation touches.
    pub fn touched_entity(&self) -> Option<&Entity> {
        match self {
            ManipulationKind::Instantiation { entity } | ManipulationKind::Delete { entity } => {
                Some(entity)
            }
            ManipulationKind::ChangeValue { owner, .. }
            | ManipulationKind::Add { owner, .. }
            | ManipulationKind::Remove { owner, .. } => Some(&owner.entity),
            ManipulationKind::Compound { .. } => None,
        }
    }
}

#[derive(Clone)]
pub struct Manipulation {
    id: u64,
    kind: Rc<ManipulationKind>,
    inverse_id: u64,
    inverse: Rc<ManipulationKind>,
}

impl Manipulation {
    pub(crate) fn with_inverse(kind: ManipulationKind, inverse: ManipulationKind) -> Self {
        Self {
            id: next_id(),
            kind: Rc::new(kind),
            inverse_id: next_id(),
            inverse: Rc::new(inverse),
        }
    }

    pub fn instantiation(entity: Entity) -> Self {
        Self::with_inverse(
            ManipulationKind::Instantiation {
                entity: entity.clone(),
            },
            ManipulationKind::Delete { entity },
        )
    }

    pub fn delete(entity: Entity) -> Self {
        Self::with_inverse(
            ManipulationKind::Delete {
                entity: entity.clone(),
            },
            ManipulationKind::Instantiation { entity },
        )
    }

    pub fn change_value(owner: PropertyOwner, new_value: Value, old_value: Value) -> Self {
        Self::with_inverse(
            ManipulationKind::ChangeValue {
                owner: owner.clone(),
                new_value,
            },
            ManipulationKind::ChangeValue {
                owner,
                new_value: old_value,
            },
        )
    }

    pub fn add(owner: PropertyOwner, items: ValueMap) -> Self {
        Self::with_inverse(
            ManipulationKind::Add {
                owner: owner.clone(),
                items: items.clone(),
            },
            ManipulationKind::Remove { owner, items },
        )
    }

    pub fn remove(owner: PropertyOwner, items: ValueMap) -> Self {
        Self::with_inverse(
            ManipulationKind::Remove {
                owner: owner.clone(),
                items: items.clone(),
            },
            ManipulationKind::Add { owner, items },
        )
    }

    /// Groups manipulations into one unit. The inverse undoes the members
    /// last-to-first.
    pub fn compound(manipulations: Vec<Manipulation>) -> Self {
        let inverses = manipulations.iter().rev().map(Manipulation::inverse).collect();
        Self::with_inverse(
            ManipulationKind::Compound { manipulations },
            ManipulationKind::Compound {
                manipulations: inverses,
            },
        )
    }

    /// Identity of this manipulation (stable across clones).
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &ManipulationKind {
        &self.kind
    }

    pub fn manipulation_type(&self) -> ManipulationType {
        self.kind.manipulation_type()
    }

    pub fn inverse(&self) -> Manipulation {
        Manipulation {
            id: self.inverse_id,
            kind: Rc::clone(&self.inverse),
            inverse_id: self.id,
            inverse: Rc::clone(&self.kind),
        }
    }

    pub fn is_same(&self, other: &Manipulation) -> bool {
        self.id == other.id
    }

    pub fn is_compound(&self) -> bool {
        matches!(*self.kind, ManipulationKind::Compound { .. })
    }

    /// Direct members of a compound; empty for leaves.
    pub fn members(&self) -> &[Manipulation] {
        match &*self.kind {
            ManipulationKind::Compound { manipulations } => manipulations,
            _ => &[],
        }
    }

    /// Leaf manipulations in application order.
    pub fn leaves(&self) -> Vec<Manipulation> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves(&self, out: &mut Vec<Manipulation>) {
        match &*self.kind {
            ManipulationKind::Compound { manipulations } => {
                for member in manipulations {
                    member.collect_leaves(out);
                }
            }
            _ => out.push(self.clone()),
        }
    }
}

impl fmt::Debug for Manipulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {:?}", self.id, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityTypeBuilder, GenericModelType, TypeRegistry};

    fn entity() -> Entity {
        let mut registry = TypeRegistry::new();
        let ty = registry
            .register_entity_type(
                EntityTypeBuilder::new("test.Item").property("name", GenericModelType::String),
            )
            .unwrap();
        Entity::new(ty)
    }

    #[test]
    fn test_inverse_of_inverse_is_same() {
        let m = Manipulation::instantiation(entity());
        let inverse = m.inverse();
        assert_eq!(inverse.manipulation_type(), ManipulationType::Delete);
        assert!(!inverse.is_same(&m));
        assert!(inverse.inverse().is_same(&m));
    }

    #[test]
    fn test_change_value_inverse_carries_old_value() {
        let e = entity();
        let m = Manipulation::change_value(
            PropertyOwner::new(e, "name"),
            Value::from("new"),
            Value::from("old"),
        );
        match m.inverse().kind() {
            ManipulationKind::ChangeValue { new_value, .. } => {
                assert_eq!(new_value, &Value::from("old"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_compound_inverse_reverses_members() {
        let e = entity();
        let first = Manipulation::instantiation(e.clone());
        let second = Manipulation::change_value(
            PropertyOwner::new(e, "name"),
            Value::from("x"),
            Value::Null,
        );
        let compound = Manipulation::compound(vec![first.clone(), second.clone()]);

        let inverse = compound.inverse();
        let members = inverse.members();
        assert_eq!(members.len(), 2);
        assert!(members[0].inverse().is_same(&second));
        assert!(members[1].inverse().is_same(&first));
        assert_eq!(compound.leaves().len(), 2);
    }
}
