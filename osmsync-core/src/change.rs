//! Replication change records and the ordered apply plan.
//!
//! A diff is a list of [`Change`] values. [`ApplyPlan::from_changes`]
//! partitions it so that every deletion runs before any upsert, and upserts
//! run nodes first, then ways, then relations. Within each pass the file order
//! is preserved, which keeps later records of the same kind authoritative.

use std::fmt;

use log::debug;

use crate::entity::{ElementKind, Entity, Node, Relation, Way};

/// What a change record does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// The entity did not exist before.
    Create,
    /// The entity replaces an earlier version.
    Modify,
    /// The entity is removed.
    Delete,
}

impl ChangeAction {
    /// Whether a previous version of the entity may exist in the store.
    #[must_use]
    pub const fn touches_previous(self) -> bool {
        matches!(self, Self::Modify | Self::Delete)
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        })
    }
}

/// A single record of a replication diff.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Action applied to `entity`.
    pub action: ChangeAction,
    /// Entity payload.
    pub entity: Entity,
}

impl Change {
    /// Construct a change record.
    pub fn new(action: ChangeAction, entity: impl Into<Entity>) -> Self {
        Self {
            action,
            entity: entity.into(),
        }
    }
}

/// Reference to an element removed by a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Deletion {
    /// Kind of the removed element.
    pub kind: ElementKind,
    /// Id of the removed element.
    pub id: i64,
}

/// Ordered passes derived from a change list.
///
/// # Examples
/// ```
/// use osmsync_core::{ApplyPlan, Change, ChangeAction, Node};
///
/// let plan = ApplyPlan::from_changes([
///     Change::new(ChangeAction::Create, Node::new(4, 1.0, 1.0)),
///     Change::new(ChangeAction::Delete, Node::new(4, 0.0, 0.0)),
/// ]);
/// assert_eq!(plan.deletes.len(), 1);
/// assert_eq!(plan.nodes.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyPlan {
    /// Deletions, all kinds, in file order.
    pub deletes: Vec<Deletion>,
    /// Created or modified nodes in file order.
    pub nodes: Vec<Node>,
    /// Created or modified ways in file order.
    pub ways: Vec<Way>,
    /// Created or modified relations in file order.
    pub relations: Vec<Relation>,
}

impl ApplyPlan {
    /// Partition `changes` into the apply passes.
    ///
    /// Header and Bound records carry no feature data and are skipped.
    pub fn from_changes<I>(changes: I) -> Self
    where
        I: IntoIterator<Item = Change>,
    {
        let mut plan = Self::default();
        for Change { action, entity } in changes {
            if action == ChangeAction::Delete {
                match entity.element_ref() {
                    Some((kind, id)) => plan.deletes.push(Deletion { kind, id }),
                    None => debug!("ignoring {} record in delete block", entity.kind()),
                }
                continue;
            }
            match entity {
                Entity::Node(node) => plan.nodes.push(node),
                Entity::Way(way) => plan.ways.push(way),
                Entity::Relation(relation) => plan.relations.push(relation),
                other @ (Entity::Header(_) | Entity::Bound(_)) => {
                    debug!("ignoring {} record in {action} block", other.kind());
                }
            }
        }
        plan
    }

    /// Total number of operations in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deletes.len() + self.nodes.len() + self.ways.len() + self.relations.len()
    }

    /// Whether the plan contains no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
