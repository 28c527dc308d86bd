use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::FlatBatch;
use crate::model::{Batch, BatchRole, CatchTree, MethodId, NodeId, PmfmId, PmfmValue, Weight};
use crate::rounding;
use crate::schema::{label, method};

// ── Reference-data collaborators ────────────────────────────────────────────

/// Descriptor of one weight parameter from reference data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightPmfm {
    pub id: PmfmId,
    pub max_decimals: u32,
    pub required: bool,
    pub method_id: Option<MethodId>,
}

/// One enumerated category of a qualitative parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualitativeValue {
    pub id: i32,
    pub label: String,
}

/// Pre-fetched table of weight-parameter descriptors, the only reference-data
/// question the aggregator asks.
#[derive(Clone, Debug, Default)]
pub struct PmfmRegistry {
    weight_pmfms: Vec<WeightPmfm>,
}

impl PmfmRegistry {
    pub fn new(weight_pmfms: Vec<WeightPmfm>) -> Self {
        Self { weight_pmfms }
    }

    pub fn weight_pmfms(&self) -> &[WeightPmfm] {
        &self.weight_pmfms
    }

    /// Decimal places for summed weights: the first descriptor decides,
    /// defaulting to the two decimals weights carry everywhere else.
    pub fn max_decimals(&self) -> u32 {
        self.weight_pmfms.first().map_or(2, |p| p.max_decimals)
    }

    /// Weight carried by a measured sub-batch: the first weight-parameter
    /// value found in its measurements, else its own weight when that weight
    /// is machine-derived.
    pub fn measured_weight(&self, sub_batch: &FlatBatch) -> Option<f64> {
        for pmfm in &self.weight_pmfms {
            if let Some(value) = sub_batch
                .measurement_values
                .get(&pmfm.id)
                .and_then(PmfmValue::as_number)
            {
                return Some(value);
            }
        }
        sub_batch
            .weight
            .as_ref()
            .filter(|w| w.computed)
            .and_then(|w| w.value)
    }
}

// ── Batch groups ────────────────────────────────────────────────────────────

/// Taxon-group view carrying the observed-count aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchGroup {
    pub node: NodeId,
    /// Individuals actually measured on descendant sub-batches, as opposed
    /// to the group's `individual_count`, which may be an estimate.
    pub observed_individual_count: u32,
}

/// The taxon groups directly under the catch root, each with its observed
/// individual count.
pub fn split_into_groups(tree: &CatchTree) -> Vec<BatchGroup> {
    tree.children(tree.root())
        .iter()
        .copied()
        .filter(|&child| tree.get(child).role == BatchRole::TaxonGroup)
        .map(|child| BatchGroup {
            node: child,
            observed_individual_count: sum_observed_individual_count(tree, tree.children(child)),
        })
        .collect()
}

/// Leaf-sum of individual counts: a leaf contributes its own count, an
/// internal node contributes the sum over its children and its own count is
/// ignored.
pub fn sum_observed_individual_count(tree: &CatchTree, nodes: &[NodeId]) -> u32 {
    nodes
        .iter()
        .map(|&node| {
            let batch = tree.get(node);
            if batch.is_leaf() {
                batch.individual_count.unwrap_or(0)
            } else {
                sum_observed_individual_count(tree, batch.children())
            }
        })
        .sum()
}

/// Give `group` one child per declared qualitative value, reusing children
/// that already carry the value (numeric-tolerant) or its label suffix, and
/// creating the rest. Returned in declared-value order.
pub fn split_by_qualitative_value(
    tree: &mut CatchTree,
    group: NodeId,
    qv_pmfm: PmfmId,
    values: &[QualitativeValue],
) -> Vec<NodeId> {
    let mut out = Vec::with_capacity(values.len());
    for qv in values {
        let expected = PmfmValue::from(qv.id);
        let suffix = format!(".{}", qv.label);
        let found = tree.children(group).iter().copied().find(|&child| {
            let batch = tree.get(child);
            if batch.role == BatchRole::Sampling {
                return false;
            }
            let value_match = batch
                .measurement(qv_pmfm)
                .is_some_and(|v| v.loose_eq(&expected));
            value_match || batch.label.ends_with(&suffix)
        });
        let node = match found {
            Some(child) => {
                let batch = tree.get_mut(child);
                if batch.measurement(qv_pmfm).is_none() {
                    batch.set_measurement(qv_pmfm, qv.id);
                }
                child
            }
            None => {
                let child_label = label::qualitative(&tree.get(group).label, &qv.label);
                let rank_order = tree.next_rank_order(group);
                let mut batch = Batch::new(child_label, rank_order);
                batch.set_measurement(qv_pmfm, qv.id);
                tree.push_child(group, batch)
            }
        };
        out.push(node);
    }
    out
}

/// Roll-up policy switches.
#[derive(Clone, Copy, Debug, Default)]
pub struct RollUpOptions {
    /// Sum weight-length derived weights of sub-batches into the sampling
    /// child's `children_weight`.
    pub enable_weight_length_conversion: bool,
}

/// Carry individually-measured sub-batches back up into `group`.
///
/// Sub-batches are partitioned by the qualitative-value child their
/// `parent_id` resolves under (or the group itself when no qualitative split
/// exists). Each partition's sampling child receives the summed individual
/// count, and optionally the summed derived weight. Sub-batches that do not
/// resolve into the group's subtree stay out of every sum; that is a normal
/// transient state while editing, not an error.
pub fn roll_up_from_sub_batches(
    tree: &mut CatchTree,
    group: NodeId,
    sub_batches: &[FlatBatch],
    opts: &RollUpOptions,
    pmfms: &PmfmRegistry,
) -> BatchGroup {
    let qv_children: Vec<NodeId> = tree
        .children(group)
        .iter()
        .copied()
        .filter(|&child| tree.get(child).role == BatchRole::QualitativeGroup)
        .collect();

    let mut matched: HashMap<NodeId, Vec<usize>> = HashMap::new();
    let mut dropped = 0usize;
    for (pos, sub) in sub_batches.iter().enumerate() {
        let target = sub
            .parent_id
            .and_then(|id| tree.find_by_id(id))
            .and_then(|node| partition_target(tree, group, &qv_children, node));
        match target {
            Some(target) => matched.entry(target).or_default().push(pos),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!(dropped, "sub-batches outside the group stay out of the roll-up");
    }

    let targets = if qv_children.is_empty() {
        vec![group]
    } else {
        qv_children
    };

    let mut observed = 0u32;
    for target in targets {
        let positions = matched.remove(&target).unwrap_or_default();
        if positions.is_empty() && tree.sampling_child(target).is_none() {
            // nothing measured here and no stale sampling data to reset
            continue;
        }

        let count: u32 = positions
            .iter()
            .map(|&pos| sub_batches[pos].individual_count.unwrap_or(0))
            .sum();
        let mut weight_sum: Option<f64> = None;
        if opts.enable_weight_length_conversion {
            for &pos in &positions {
                if let Some(weight) = pmfms.measured_weight(&sub_batches[pos]) {
                    *weight_sum.get_or_insert(0.0) += weight;
                }
            }
        }
        debug!(
            batch = %tree.get(target).label,
            sub_batches = positions.len(),
            count,
            "rolled up sub-batches"
        );

        let sampling = tree.ensure_sampling_child(target);
        let sampling_batch = tree.get_mut(sampling);
        sampling_batch.individual_count = Some(count);
        sampling_batch.children_weight = weight_sum.map(|sum| {
            Weight::computed(
                rounding::decimals(sum, pmfms.max_decimals()),
                method::CALCULATED_WEIGHT_LENGTH_SUM,
            )
        });
        observed += count;
    }

    BatchGroup {
        node: group,
        observed_individual_count: observed,
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

/// The partition a node under `group` belongs to: the qualitative-value child
/// on its ancestry path, or `group` itself when no split exists. `None` for
/// nodes outside the group's subtree (and, once split, for nodes under none
/// of the qualitative children).
fn partition_target(
    tree: &CatchTree,
    group: NodeId,
    qv_children: &[NodeId],
    node: NodeId,
) -> Option<NodeId> {
    let mut cur = node;
    let mut below_group: Option<NodeId> = None;
    while cur != group {
        below_group = Some(cur);
        cur = tree.parent(cur)?;
    }
    if qv_children.is_empty() {
        return Some(group);
    }
    below_group.filter(|n| qv_children.contains(n))
}
