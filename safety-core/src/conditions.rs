//! Escalation conditions: admin-authored rules grouped by tier
//!
//! Conditions are data, not code: clinical/policy content is edited by admin
//! tooling and only read here. The flat list coming out of a repository is
//! grouped once into a [`ConditionSet`] keyed by [`RiskTier`], so prompt
//! rendering never re-filters the list per tier.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;
use crate::escalation::RiskTier;

/// An admin-authored escalation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationCondition {
    pub id: String,
    pub tier: RiskTier,
    /// Slug, e.g. `self-harm`, `disordered-eating`.
    pub category: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub example_phrases: Vec<String>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    /// Higher wins within a tier.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Sort conditions by (tier ascending, priority descending), id as final tie-break.
pub fn sort_conditions(conditions: &mut [EscalationCondition]) {
    conditions.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Active conditions grouped by the tiers that carry rules (1–3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    by_tier: BTreeMap<RiskTier, Vec<EscalationCondition>>,
}

impl ConditionSet {
    /// An empty set. The prompt falls back to generic guidance.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Group conditions by tier. Inactive and tier-0 conditions are dropped;
    /// each group is ordered by priority descending.
    pub fn from_conditions(conditions: impl IntoIterator<Item = EscalationCondition>) -> Self {
        let mut by_tier: BTreeMap<RiskTier, Vec<EscalationCondition>> = BTreeMap::new();
        for condition in conditions {
            if !condition.is_active || condition.tier == RiskTier::None {
                continue;
            }
            by_tier.entry(condition.tier).or_default().push(condition);
        }
        for group in by_tier.values_mut() {
            sort_conditions(group);
        }
        Self { by_tier }
    }

    /// Conditions for one tier, highest priority first.
    pub fn for_tier(&self, tier: RiskTier) -> &[EscalationCondition] {
        self.by_tier.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty tier groups, lowest tier first.
    pub fn groups(&self) -> impl Iterator<Item = (RiskTier, &[EscalationCondition])> {
        self.by_tier
            .iter()
            .filter(|(_, group)| !group.is_empty())
            .map(|(tier, group)| (*tier, group.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.by_tier.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load a JSON array of conditions from disk (seed files, CLI).
pub fn load_conditions_file(path: &Path) -> Result<Vec<EscalationCondition>, RepositoryError> {
    let json = std::fs::read_to_string(path).map_err(|e| RepositoryError::Query {
        collection: path.display().to_string(),
        detail: e.to_string(),
    })?;
    serde_json::from_str(&json).map_err(|e| RepositoryError::Corrupt {
        collection: path.display().to_string(),
        id: "*".to_string(),
        detail: e.to_string(),
    })
}
