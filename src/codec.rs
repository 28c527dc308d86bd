use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MissingIdError;
use crate::model::{
    Batch, BatchId, CatchTree, MethodId, NodeId, PmfmId, PmfmValue, Provenance, ReferenceRef,
    SamplingRatio, Weight,
};
use crate::schema::{label, method, unit};

// ── Wire records ────────────────────────────────────────────────────────────

/// A weight as persisted: bare value plus provenance flags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatWeight {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub estimated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_id: Option<MethodId>,
}

fn default_unit() -> String {
    unit::KILOGRAM.to_string()
}

impl FlatWeight {
    fn from_weight(weight: &Weight) -> Self {
        let (computed, estimated, method_id) = match weight.provenance {
            Provenance::UserEntered => (false, false, None),
            Provenance::Computed { method } => (true, false, Some(method)),
            Provenance::Estimated { method } => (false, true, Some(method)),
        };
        Self {
            value: Some(weight.value),
            unit: default_unit(),
            computed,
            estimated,
            method_id,
        }
    }

    /// Typed reading of the record. Valueless weights and foreign units read
    /// as absent.
    fn to_weight(&self) -> Option<Weight> {
        let value = self.value?;
        if self.unit != unit::KILOGRAM {
            debug!(unit = %self.unit, "dropping weight with an unexpected unit");
            return None;
        }
        let provenance = if self.computed {
            Provenance::Computed {
                method: self.method_id.unwrap_or(method::CALCULATED),
            }
        } else if self.estimated {
            Provenance::Estimated {
                method: self.method_id.unwrap_or(method::ESTIMATED_BY_OBSERVER),
            }
        } else {
            Provenance::UserEntered
        };
        Some(Weight { value, provenance })
    }
}

/// One batch as persisted: children are linked by `parentId`, never nested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BatchId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<BatchId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    pub rank_order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon_group: Option<ReferenceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon_name: Option<ReferenceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<FlatWeight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhaustive_inventory: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_ratio_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children_weight: Option<FlatWeight>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub measurement_values: BTreeMap<PmfmId, PmfmValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

// ── Tree to flat list ───────────────────────────────────────────────────────

/// Flatten a tree into persistence records, pre-order, so every parent
/// precedes its children and the table layer can insert rows as they come.
///
/// Fails when a batch with children has no id, since its children would have
/// nothing to point their `parentId` at. Ids on leaves are optional.
pub fn tree_to_flat_list(tree: &CatchTree) -> Result<Vec<FlatBatch>, MissingIdError> {
    let mut out = Vec::new();
    let mut stack = vec![(tree.root(), None::<BatchId>)];
    while let Some((node, parent_id)) = stack.pop() {
        let batch = tree.get(node);
        out.push(encode_batch(batch, parent_id));
        if batch.is_leaf() {
            continue;
        }
        let id = batch.id.ok_or_else(|| MissingIdError {
            label: batch.label.clone(),
        })?;
        // reversed so the first child is emitted first
        for &child in batch.children().iter().rev() {
            stack.push((child, Some(id)));
        }
    }
    Ok(out)
}

// ── Flat list to tree ───────────────────────────────────────────────────────

/// Rebuild a tree from persistence records, in any record order.
///
/// The root is the first record with no `parentId` and a catch label (or no
/// label at all); without one the list is malformed and `None` comes back.
/// Records whose `parentId` never resolves to a reachable batch are dropped,
/// not fatal. Sibling order follows record order.
pub fn flat_list_to_tree(records: &[FlatBatch]) -> Option<CatchTree> {
    let root_pos = records
        .iter()
        .position(|r| r.parent_id.is_none() && label::is_catch(&r.label))?;

    // first occurrence wins when an id appears twice
    let mut by_id: HashMap<BatchId, usize> = HashMap::new();
    for (pos, record) in records.iter().enumerate() {
        if let Some(id) = record.id {
            by_id.entry(id).or_insert(pos);
        }
    }

    // children of each record position, in input order
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    for (pos, record) in records.iter().enumerate() {
        if pos == root_pos {
            continue;
        }
        match record.parent_id.and_then(|id| by_id.get(&id).copied()) {
            // a record naming itself as parent counts as unresolved
            Some(parent_pos) if parent_pos != pos => children[parent_pos].push(pos),
            _ => {}
        }
    }

    let mut tree = CatchTree::new(decode_batch(&records[root_pos]));
    let mut linked = 1usize;
    let mut pending: Vec<(usize, NodeId)> = vec![(root_pos, tree.root())];
    while let Some((pos, node)) = pending.pop() {
        for &child_pos in &children[pos] {
            let child = tree.push_child(node, decode_batch(&records[child_pos]));
            linked += 1;
            pending.push((child_pos, child));
        }
    }

    let dropped = records.len() - linked;
    if dropped > 0 {
        debug!(
            records = records.len(),
            dropped, "dropped records not reachable from the catch root"
        );
    }
    Some(tree)
}

// ── Record conversion ───────────────────────────────────────────────────────

fn encode_batch(batch: &Batch, parent_id: Option<BatchId>) -> FlatBatch {
    FlatBatch {
        id: batch.id,
        parent_id,
        label: batch.label.clone(),
        rank_order: batch.rank_order,
        taxon_group: batch.taxon_group.clone(),
        taxon_name: batch.taxon_name.clone(),
        weight: batch.weight.as_ref().map(FlatWeight::from_weight),
        individual_count: batch.individual_count,
        exhaustive_inventory: batch.exhaustive_inventory,
        sampling_ratio: batch.sampling_ratio.map(|r| r.pct),
        sampling_ratio_text: batch.sampling_ratio.map(|r| r.text()),
        children_weight: batch.children_weight.as_ref().map(FlatWeight::from_weight),
        measurement_values: batch.measurements.clone(),
        operation_id: batch.operation_id,
        sale_id: batch.sale_id,
        comments: batch.comments.clone(),
    }
}

fn decode_batch(record: &FlatBatch) -> Batch {
    let mut batch = Batch::new(record.label.clone(), record.rank_order);
    batch.id = record.id;
    batch.taxon_group = record.taxon_group.clone();
    batch.taxon_name = record.taxon_name.clone();
    batch.weight = record.weight.as_ref().and_then(FlatWeight::to_weight);
    batch.individual_count = record.individual_count;
    batch.exhaustive_inventory = record.exhaustive_inventory;
    batch.sampling_ratio = decode_ratio(record);
    batch.children_weight = record.children_weight.as_ref().and_then(FlatWeight::to_weight);
    batch.measurements = record.measurement_values.clone();
    batch.operation_id = record.operation_id;
    batch.sale_id = record.sale_id;
    batch.comments = record.comments.clone();
    batch
}

/// `"<a>/<b>"` ratio text marks a ratio derived from weights; any other text
/// (or none) reads as user entered.
fn decode_ratio(record: &FlatBatch) -> Option<SamplingRatio> {
    let pct = record.sampling_ratio?;
    if let Some((sampling, total)) = record
        .sampling_ratio_text
        .as_deref()
        .and_then(split_fraction)
    {
        return Some(SamplingRatio::derived(pct, sampling, total));
    }
    Some(SamplingRatio::entered(pct))
}

fn split_fraction(text: &str) -> Option<(f64, f64)> {
    let (sampling, total) = text.split_once('/')?;
    Some((sampling.trim().parse().ok()?, total.trim().parse().ok()?))
}
