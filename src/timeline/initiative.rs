//! Initiative order over placements
//!
//! Placements with initiative > 0 act in descending initiative. Ties go to the
//! lower placement id; ids are UUIDv7 so that is the earlier placement.

use serde::Serialize;

use crate::db::tokens::MapToken;

/// Ordered placement ids for one map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitiativeOrder {
    order: Vec<String>,
}

impl InitiativeOrder {
    /// Derive the order from a map's placements
    pub fn from_placements<'a>(placements: impl IntoIterator<Item = &'a MapToken>) -> Self {
        Self::from_scores(placements.into_iter().map(|p| (p.id.as_str(), p.initiative)))
    }

    /// Derive the order from (placement id, initiative) pairs
    pub fn from_scores<'a>(scores: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
        let mut eligible: Vec<(&str, i64)> =
            scores.into_iter().filter(|(_, score)| *score > 0).collect();
        eligible.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        Self {
            order: eligible.into_iter().map(|(id, _)| id.to_string()).collect(),
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Who acts on `turn`. Turn 1 is the first actor; turn 0 and an empty
    /// order have no actor.
    pub fn actor_for_turn(&self, turn: i64) -> Option<&str> {
        if self.order.is_empty() || turn <= 0 {
            return None;
        }
        let index = ((turn - 1) as usize) % self.order.len();
        self.order.get(index).map(String::as_str)
    }
}
