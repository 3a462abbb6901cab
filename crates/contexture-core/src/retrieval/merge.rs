//! Auto-merging resolution: collapse retrieved siblings into their parent.
//!
//! When enough of one parent's children are retrieved together, the
//! fragments are evidence that the whole parent passage matters, so the
//! resolver substitutes the parent for the group. Substitution repeats one
//! level up per round until no group clears the threshold, then the set is
//! deduplicated so an ancestor and its descendant never both contribute
//! text.
//!
//! The resolver is a pure function over an immutable store: same retrieved
//! set and threshold in, same resolved set out, and output spans never
//! overlap in source text.

use crate::corpus::store::UnitStore;
use crate::corpus::types::{ContextSpan, ScoredUnit, UnitId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

/// One member of a resolved set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ResolvedUnit {
    /// A unit kept exactly as retrieved.
    Retrieved {
        id: UnitId,
        score: f32,
    },
    /// A parent substituted for its retrieved children.
    Merged {
        id: UnitId,
        /// Max score among the members this parent replaced.
        score: f32,
        /// The replaced members, in resolved-set order.
        replaced: Vec<UnitId>,
    },
}

impl ResolvedUnit {
    /// The unit contributing text to the context.
    pub fn id(&self) -> UnitId {
        match self {
            Self::Retrieved { id, .. } | Self::Merged { id, .. } => *id,
        }
    }

    /// Ranking score carried by this member.
    pub fn score(&self) -> f32 {
        match self {
            Self::Retrieved { score, .. } | Self::Merged { score, .. } => *score,
        }
    }

    /// True when this member replaced retrieved children.
    pub fn is_merged(&self) -> bool {
        matches!(self, Self::Merged { .. })
    }
}

/// Resolves a retrieved set against the hierarchy.
///
/// Each round groups the current members by parent and computes per-parent
/// coverage, the fraction of that parent's children present in the set. A
/// group at or above `merge_threshold` is replaced by its parent, scored
/// with the group's max, at the position of the group's first member. A
/// parent that was itself retrieved folds into its own merge, keeping the
/// higher score, never standing beside it. Rounds repeat until nothing
/// merges. A final pass drops any member whose ancestor is also in the set.
///
/// `merge_threshold` is assumed validated to (0, 1] by the caller's
/// configuration.
pub fn auto_merge(
    store: &UnitStore,
    retrieved: &[ScoredUnit],
    merge_threshold: f32,
) -> Vec<ResolvedUnit> {
    let mut current: Vec<ResolvedUnit> = retrieved
        .iter()
        .map(|hit| ResolvedUnit::Retrieved {
            id: hit.id,
            score: hit.score,
        })
        .collect();

    loop {
        // Group the current members under their parents. BTreeMap keeps
        // round evaluation order independent of hash state.
        let mut groups: BTreeMap<UnitId, Vec<usize>> = BTreeMap::new();
        for (position, member) in current.iter().enumerate() {
            let Some(unit) = store.unit(member.id()) else {
                continue;
            };
            if let Some(parent_id) = unit.parent_id {
                groups.entry(parent_id).or_default().push(position);
            }
        }

        // Coverage check per group.
        let mut absorbed: HashMap<UnitId, UnitId> = HashMap::new();
        let mut merges: HashMap<UnitId, (f32, Vec<UnitId>)> = HashMap::new();
        for (parent_id, members) in &groups {
            let Some(parent) = store.unit(*parent_id) else {
                continue;
            };
            if parent.child_ids.is_empty() {
                continue;
            }
            let distinct: HashSet<UnitId> =
                members.iter().map(|&i| current[i].id()).collect();
            let coverage = distinct.len() as f32 / parent.child_ids.len() as f32;
            trace!(parent = %parent_id, coverage, "group evaluated");
            if coverage >= merge_threshold {
                let score = members
                    .iter()
                    .map(|&i| current[i].score())
                    .fold(f32::NEG_INFINITY, f32::max);
                let replaced: Vec<UnitId> =
                    members.iter().map(|&i| current[i].id()).collect();
                for &i in members {
                    absorbed.insert(current[i].id(), *parent_id);
                }
                merges.insert(*parent_id, (score, replaced));
            }
        }
        if merges.is_empty() {
            break;
        }

        // A merge target already present as its own hit joins the merge;
        // the rebuilt set never carries a unit id twice.
        for member in &current {
            let id = member.id();
            if absorbed.contains_key(&id) {
                continue;
            }
            if let Some((score, _)) = merges.get_mut(&id) {
                *score = score.max(member.score());
                absorbed.insert(id, id);
            }
        }

        // Rebuild the set: a merged parent takes the position of its
        // group's first member, later members just disappear.
        let mut emitted: HashSet<UnitId> = HashSet::new();
        let mut next: Vec<ResolvedUnit> = Vec::with_capacity(current.len());
        for member in current {
            match absorbed.get(&member.id()) {
                Some(parent_id) => {
                    if emitted.insert(*parent_id) {
                        if let Some((score, replaced)) = merges.get(parent_id) {
                            next.push(ResolvedUnit::Merged {
                                id: *parent_id,
                                score: *score,
                                replaced: replaced.clone(),
                            });
                        }
                    }
                }
                None => next.push(member),
            }
        }
        debug!(merged = emitted.len(), members = next.len(), "merge round applied");
        current = next;
    }

    // Ancestor-preferred dedup: a descendant never contributes text an
    // ancestor in the set already covers.
    let selected: HashSet<UnitId> = current.iter().map(|m| m.id()).collect();
    current.retain(|member| {
        let mut ancestor = store.unit(member.id()).and_then(|u| u.parent_id);
        while let Some(id) = ancestor {
            if selected.contains(&id) {
                debug!(dropped = %member.id(), kept = %id, "descendant shadowed by ancestor");
                return false;
            }
            ancestor = store.unit(id).and_then(|u| u.parent_id);
        }
        true
    });
    current
}

/// Expands a resolved set into context spans, one per member.
pub fn resolved_spans(store: &UnitStore, resolved: &[ResolvedUnit]) -> Vec<ContextSpan> {
    resolved
        .iter()
        .filter_map(|member| {
            store
                .unit(member.id())
                .map(|unit| ContextSpan::for_unit(unit, member.score()))
        })
        .collect()
}
