use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::label;

// ── Identifiers ─────────────────────────────────────────────────────────────

/// Persisted batch id. Negative values are local placeholders handed out by
/// [`LocalIdAllocator`] before the first save.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub i32);

impl BatchId {
    pub fn is_local(self) -> bool {
        self.0 < 0
    }

    /// Absolute value, used when ordering mixed persisted and local ids.
    pub fn magnitude(self) -> u32 {
        self.0.unsigned_abs()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of a measured parameter (weight, length, qualitative category, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PmfmId(pub i32);

/// Id of the method a measurement was obtained with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodId(pub i32);

/// Pointer into external reference data (taxa, locations, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRef {
    pub id: i32,
    pub label: String,
}

impl ReferenceRef {
    pub fn new(id: i32, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}

// ── Measurement values ──────────────────────────────────────────────────────

/// A measurement value as persisted: numbers and enumerated ids travel as
/// numbers, free text stays text. Legacy rows sometimes store numbers as
/// strings, so comparisons go through [`PmfmValue::loose_eq`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PmfmValue {
    Number(f64),
    Text(String),
}

impl PmfmValue {
    /// Numeric reading of the value, parsing text if needed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PmfmValue::Number(n) => Some(*n),
            PmfmValue::Text(t) => t.trim().parse().ok(),
        }
    }

    /// Equality that treats `"5"` and `5.0` as the same value.
    pub fn loose_eq(&self, other: &PmfmValue) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a == b;
        }
        match (self, other) {
            (PmfmValue::Text(a), PmfmValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for PmfmValue {
    fn from(value: f64) -> Self {
        PmfmValue::Number(value)
    }
}

impl From<i32> for PmfmValue {
    fn from(value: i32) -> Self {
        PmfmValue::Number(value as f64)
    }
}

impl From<&str> for PmfmValue {
    fn from(value: &str) -> Self {
        PmfmValue::Text(value.to_string())
    }
}

impl From<String> for PmfmValue {
    fn from(value: String) -> Self {
        PmfmValue::Text(value)
    }
}

// ── Weights and provenance ──────────────────────────────────────────────────

/// How a stored quantity came to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Typed in by the observer.
    UserEntered,
    /// Derived by the engine; free to overwrite or clear on the next pass.
    Computed { method: MethodId },
    /// Estimated (by eye or by a weight-length relation); kept on reconcile.
    Estimated { method: MethodId },
}

impl Provenance {
    pub fn is_computed(self) -> bool {
        matches!(self, Provenance::Computed { .. })
    }

    pub fn is_estimated(self) -> bool {
        matches!(self, Provenance::Estimated { .. })
    }

    pub fn method(self) -> Option<MethodId> {
        match self {
            Provenance::UserEntered => None,
            Provenance::Computed { method } | Provenance::Estimated { method } => Some(method),
        }
    }
}

/// A weight in kilograms plus its provenance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weight {
    pub value: f64,
    pub provenance: Provenance,
}

impl Weight {
    pub fn entered(value: f64) -> Self {
        Self {
            value,
            provenance: Provenance::UserEntered,
        }
    }

    pub fn computed(value: f64, method: MethodId) -> Self {
        Self {
            value,
            provenance: Provenance::Computed { method },
        }
    }

    pub fn estimated(value: f64, method: MethodId) -> Self {
        Self {
            value,
            provenance: Provenance::Estimated { method },
        }
    }

    pub fn is_computed(&self) -> bool {
        self.provenance.is_computed()
    }

    /// The value when it is finite and non-negative. NaN, infinite and
    /// negative values read as absent.
    pub fn usable_value(&self) -> Option<f64> {
        (self.value.is_finite() && self.value >= 0.0).then_some(self.value)
    }
}

// ── Sampling ratio ──────────────────────────────────────────────────────────

/// Where a sampling ratio came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RatioSource {
    UserEntered,
    /// Derived from the two weights it relates.
    FromWeights { sampling: f64, total: f64 },
}

/// Sampling ratio as a whole percentage in `[0, 100]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingRatio {
    pub pct: f64,
    pub source: RatioSource,
}

impl SamplingRatio {
    pub fn entered(pct: f64) -> Self {
        Self {
            pct,
            source: RatioSource::UserEntered,
        }
    }

    pub fn derived(pct: f64, sampling: f64, total: f64) -> Self {
        Self {
            pct,
            source: RatioSource::FromWeights { sampling, total },
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self.source, RatioSource::FromWeights { .. })
    }

    /// The percentage when it is finite and within `[0, 100]`.
    pub fn usable_pct(&self) -> Option<f64> {
        (self.pct.is_finite() && (0.0..=100.0).contains(&self.pct)).then_some(self.pct)
    }

    /// Display text as persisted alongside the ratio: `"<sampling>/<total>"`
    /// when derived from weights, `"<pct>%"` otherwise.
    pub fn text(&self) -> String {
        match self.source {
            RatioSource::FromWeights { sampling, total } => format!("{sampling}/{total}"),
            RatioSource::UserEntered => format!("{}%", self.pct),
        }
    }
}

// ── Roles ───────────────────────────────────────────────────────────────────

/// Position of a batch in the tree, read from its label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchRole {
    /// Root of the tree, one per fishing operation.
    Catch,
    /// Per-taxon child of the root (`SORTING_BATCH#n`).
    TaxonGroup,
    /// Split of a taxon group by a qualitative value (`SORTING_BATCH#n.LANDING`).
    QualitativeGroup,
    /// Sampling fraction of its parent (`<parent>.%`).
    Sampling,
    /// Individual measure batch, always a leaf from the model's point of view.
    Individual,
}

impl BatchRole {
    /// Labels encode role. Unrecognized labels read as individual measures,
    /// which keeps them out of grouping and sampling logic.
    pub fn from_label(batch_label: &str) -> Self {
        if label::is_catch(batch_label) {
            BatchRole::Catch
        } else if label::is_sampling(batch_label) {
            BatchRole::Sampling
        } else if label::is_taxon_group(batch_label) {
            BatchRole::TaxonGroup
        } else if batch_label.starts_with(label::SORTING_BATCH_PREFIX) {
            BatchRole::QualitativeGroup
        } else {
            BatchRole::Individual
        }
    }
}

// ── Batch ───────────────────────────────────────────────────────────────────

/// One node of a catch tree.
///
/// `weight` is the total weight of everything the batch stands for;
/// `individual_count` the number of individuals it covers. On a sampling
/// batch the weight is the sampled fraction and `sampling_ratio` relates it
/// to the parent's total.
#[derive(Clone, Debug)]
pub struct Batch {
    pub id: Option<BatchId>,
    pub label: String,
    /// 1-based position among siblings.
    pub rank_order: u32,
    pub role: BatchRole,
    pub taxon_group: Option<ReferenceRef>,
    pub taxon_name: Option<ReferenceRef>,
    pub weight: Option<Weight>,
    pub individual_count: Option<u32>,
    /// Whether every individual under this batch was inventoried.
    pub exhaustive_inventory: Option<bool>,
    pub sampling_ratio: Option<SamplingRatio>,
    /// Sum of the weights of child batches, when aggregated upward.
    pub children_weight: Option<Weight>,
    pub measurements: BTreeMap<PmfmId, PmfmValue>,
    pub operation_id: Option<i32>,
    pub sale_id: Option<i32>,
    pub comments: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Batch {
    pub fn new(batch_label: impl Into<String>, rank_order: u32) -> Self {
        let batch_label = batch_label.into();
        let role = BatchRole::from_label(&batch_label);
        Self {
            id: None,
            label: batch_label,
            rank_order,
            role,
            taxon_group: None,
            taxon_name: None,
            weight: None,
            individual_count: None,
            exhaustive_inventory: None,
            sampling_ratio: None,
            children_weight: None,
            measurements: BTreeMap::new(),
            operation_id: None,
            sale_id: None,
            comments: None,
            parent: None,
            children: Vec::new(),
        }
    }

    /// A fresh root batch.
    pub fn catch() -> Self {
        Self::new(label::CATCH_BATCH, 1)
    }

    #[must_use]
    pub fn with_id(mut self, id: BatchId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: Weight) -> Self {
        self.weight = Some(weight);
        self
    }

    #[must_use]
    pub fn with_individual_count(mut self, count: u32) -> Self {
        self.individual_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_taxon_group(mut self, taxon_group: ReferenceRef) -> Self {
        self.taxon_group = Some(taxon_group);
        self
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children ids in sibling order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn measurement(&self, pmfm: PmfmId) -> Option<&PmfmValue> {
        self.measurements.get(&pmfm)
    }

    pub fn set_measurement(&mut self, pmfm: PmfmId, value: impl Into<PmfmValue>) {
        self.measurements.insert(pmfm, value.into());
    }
}

// ── Tree arena ──────────────────────────────────────────────────────────────

/// Handle to a node inside its owning [`CatchTree`].
///
/// Only meaningful for the tree that produced it. Handles stay valid for the
/// lifetime of the tree, including for detached nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A catch tree: one root batch, children ordered, every non-root node with
/// exactly one parent.
///
/// Nodes live in an arena owned by the tree. [`CatchTree::detach`] unlinks a
/// subtree without freeing it; detached nodes are simply unreachable from the
/// root and dropped with the tree.
#[derive(Clone, Debug)]
pub struct CatchTree {
    nodes: Vec<Batch>,
    root: NodeId,
}

impl CatchTree {
    pub fn new(root: Batch) -> Self {
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, node: NodeId) -> &Batch {
        &self.nodes[node.0]
    }

    pub fn get_mut(&mut self, node: NodeId) -> &mut Batch {
        &mut self.nodes[node.0]
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Number of nodes in the arena, detached ones included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Append `batch` as the last child of `parent`.
    pub fn push_child(&mut self, parent: NodeId, batch: Batch) -> NodeId {
        let node = NodeId(self.nodes.len());
        self.nodes.push(batch);
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.push(node);
        node
    }

    /// Unlink `node` from its parent. The subtree keeps its internal
    /// structure but is no longer reachable from the root. Detaching the
    /// root is a no-op.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    /// Whether `node` is reachable from the root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut cur = node;
        while let Some(up) = self.nodes[cur.0].parent {
            cur = up;
        }
        cur == self.root
    }

    /// Pre-order walk of `node` and everything below it.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            // reversed so the first child comes off the stack first
            for &child in self.nodes[cur.0].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// The sampling child of `node`, if one exists.
    pub fn sampling_child(&self, node: NodeId) -> Option<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .find(|&c| self.get(c).role == BatchRole::Sampling)
    }

    /// The sampling child of `node`, created as first child when absent.
    pub fn ensure_sampling_child(&mut self, node: NodeId) -> NodeId {
        if let Some(existing) = self.sampling_child(node) {
            return existing;
        }
        let sampling = Batch::new(label::sampling(&self.nodes[node.0].label), 1);
        let child = NodeId(self.nodes.len());
        self.nodes.push(sampling);
        self.nodes[child.0].parent = Some(node);
        self.nodes[node.0].children.insert(0, child);
        child
    }

    /// Find the attached node carrying the given persisted id.
    pub fn find_by_id(&self, id: BatchId) -> Option<NodeId> {
        self.subtree(self.root)
            .into_iter()
            .find(|&n| self.get(n).id == Some(id))
    }

    /// Next free sibling rank under `parent`.
    pub fn next_rank_order(&self, parent: NodeId) -> u32 {
        self.children(parent)
            .iter()
            .map(|&c| self.get(c).rank_order)
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Check structural and numeric invariants over the attached nodes.
    /// Returns one message per violation; empty means the tree is sound.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let root = self.get(self.root);
        if !label::is_catch(&root.label) {
            violations.push(format!("root label '{}' is not a catch label", root.label));
        }

        for node in self.subtree(self.root) {
            let batch = self.get(node);
            if batch.rank_order == 0 {
                violations.push(format!("batch '{}' has rankOrder 0", batch.label));
            }
            if let Some(weight) = batch.weight {
                if weight.usable_value().is_none() {
                    violations.push(format!(
                        "batch '{}' has an unusable weight {}",
                        batch.label, weight.value
                    ));
                }
            }
            if let Some(ratio) = batch.sampling_ratio {
                if ratio.usable_pct().is_none() {
                    violations.push(format!(
                        "batch '{}' has a sampling ratio {} outside [0, 100]",
                        batch.label, ratio.pct
                    ));
                }
            }

            let mut labels = std::collections::BTreeSet::new();
            let mut sampling_children = 0;
            for &child in batch.children() {
                let child_batch = self.get(child);
                if !labels.insert(child_batch.label.as_str()) {
                    violations.push(format!(
                        "batch '{}' has two children labelled '{}'",
                        batch.label, child_batch.label
                    ));
                }
                if child_batch.role == BatchRole::Sampling {
                    sampling_children += 1;
                    if let (Some(parent_w), Some(child_w)) = (
                        batch.weight.and_then(|w| w.usable_value()),
                        child_batch.weight.and_then(|w| w.usable_value()),
                    ) {
                        if child_w > parent_w {
                            violations.push(format!(
                                "sampling batch '{}' weighs more than its parent ({child_w} > {parent_w})",
                                child_batch.label
                            ));
                        }
                    }
                }
            }
            if sampling_children > 1 {
                violations.push(format!(
                    "batch '{}' has {sampling_children} sampling children",
                    batch.label
                ));
            }
        }
        violations
    }
}

impl Default for CatchTree {
    fn default() -> Self {
        Self::new(Batch::catch())
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

impl CatchTree {
    /// Mutable access to two distinct nodes at once.
    pub(crate) fn pair_mut(&mut self, a: NodeId, b: NodeId) -> (&mut Batch, &mut Batch) {
        debug_assert_ne!(a, b);
        if a.0 < b.0 {
            let (left, right) = self.nodes.split_at_mut(b.0);
            (&mut left[a.0], &mut right[0])
        } else {
            let (left, right) = self.nodes.split_at_mut(a.0);
            (&mut right[0], &mut left[b.0])
        }
    }
}

// ── Local ids ───────────────────────────────────────────────────────────────

/// Hands out placeholder ids `-1, -2, ...` for batches created locally.
/// Persisted ids are positive, so the two ranges never collide.
#[derive(Debug, Default)]
pub struct LocalIdAllocator {
    last: i32,
}

impl LocalIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> BatchId {
        self.last -= 1;
        BatchId(self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::qualitative;

    #[test]
    fn role_is_read_from_the_label() {
        assert_eq!(BatchRole::from_label(""), BatchRole::Catch);
        assert_eq!(BatchRole::from_label("CATCH_BATCH"), BatchRole::Catch);
        assert_eq!(BatchRole::from_label("SORTING_BATCH#2"), BatchRole::TaxonGroup);
        assert_eq!(
            BatchRole::from_label("SORTING_BATCH#2.LANDING"),
            BatchRole::QualitativeGroup
        );
        assert_eq!(BatchRole::from_label("SORTING_BATCH#2.%"), BatchRole::Sampling);
        assert_eq!(
            BatchRole::from_label("SORTING_BATCH#2.LANDING.%"),
            BatchRole::Sampling
        );
        assert_eq!(
            BatchRole::from_label("SORTING_BATCH_INDIVIDUAL#4"),
            BatchRole::Individual
        );
    }

    #[test]
    fn subtree_walks_parent_first_in_sibling_order() {
        let mut tree = CatchTree::default();
        let g1 = tree.push_child(tree.root(), Batch::new(label::sorting_batch(1), 1));
        let g2 = tree.push_child(tree.root(), Batch::new(label::sorting_batch(2), 2));
        let s1 = tree.push_child(g1, Batch::new(label::sampling(&label::sorting_batch(1)), 1));

        assert_eq!(tree.subtree(tree.root()), vec![tree.root(), g1, s1, g2]);
    }

    #[test]
    fn detach_unlinks_but_keeps_handles_valid() {
        let mut tree = CatchTree::default();
        let group = tree.push_child(tree.root(), Batch::new(label::sorting_batch(1), 1));
        let child = tree.push_child(group, Batch::new(label::individual(1), 1));

        tree.detach(group);

        assert!(!tree.is_attached(group));
        assert!(!tree.is_attached(child));
        assert!(tree.children(tree.root()).is_empty());
        // the arena still owns the detached subtree
        assert_eq!(tree.get(child).label, label::individual(1));
        assert_eq!(tree.parent(child), Some(group));
    }

    #[test]
    fn ensure_sampling_child_creates_first_child_once() {
        let mut tree = CatchTree::default();
        let group = tree.push_child(tree.root(), Batch::new(label::sorting_batch(1), 1));
        tree.push_child(group, Batch::new(label::individual(1), 1));

        let sampling = tree.ensure_sampling_child(group);
        assert_eq!(tree.get(sampling).role, BatchRole::Sampling);
        assert_eq!(tree.get(sampling).label, "SORTING_BATCH#1.%");
        assert_eq!(tree.children(group)[0], sampling);

        // idempotent
        assert_eq!(tree.ensure_sampling_child(group), sampling);
        assert_eq!(tree.children(group).len(), 2);
    }

    #[test]
    fn find_by_id_ignores_detached_nodes() {
        let mut tree = CatchTree::default();
        let group = tree.push_child(
            tree.root(),
            Batch::new(label::sorting_batch(1), 1).with_id(BatchId(10)),
        );
        assert_eq!(tree.find_by_id(BatchId(10)), Some(group));

        tree.detach(group);
        assert_eq!(tree.find_by_id(BatchId(10)), None);
    }

    #[test]
    fn next_rank_order_continues_after_the_largest() {
        let mut tree = CatchTree::default();
        assert_eq!(tree.next_rank_order(tree.root()), 1);
        tree.push_child(tree.root(), Batch::new(label::sorting_batch(3), 3));
        assert_eq!(tree.next_rank_order(tree.root()), 4);
    }

    #[test]
    fn validate_reports_sampling_and_label_violations() {
        let mut tree = CatchTree::default();
        let group = tree.push_child(
            tree.root(),
            Batch::new(label::sorting_batch(1), 1).with_weight(Weight::entered(10.0)),
        );
        tree.push_child(
            group,
            Batch::new(label::sampling(&label::sorting_batch(1)), 1)
                .with_weight(Weight::entered(25.0)),
        );
        tree.push_child(group, Batch::new(label::individual(1), 2));
        tree.push_child(group, Batch::new(label::individual(1), 3));

        let violations = tree.validate();
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.contains("weighs more")));
        assert!(violations.iter().any(|v| v.contains("two children")));
    }

    #[test]
    fn validate_accepts_a_regular_tree() {
        let mut tree = CatchTree::default();
        let group = tree.push_child(
            tree.root(),
            Batch::new(label::sorting_batch(1), 1).with_weight(Weight::entered(100.0)),
        );
        let landing = tree.push_child(
            group,
            Batch::new(
                label::qualitative(&label::sorting_batch(1), qualitative::LANDING),
                1,
            ),
        );
        tree.ensure_sampling_child(landing);
        assert!(tree.validate().is_empty());
    }

    #[test]
    fn loose_eq_bridges_text_and_number() {
        assert!(PmfmValue::from(5.0).loose_eq(&PmfmValue::from("5")));
        assert!(PmfmValue::from("5").loose_eq(&PmfmValue::from(5.0)));
        assert!(PmfmValue::from("a").loose_eq(&PmfmValue::from("a")));
        assert!(!PmfmValue::from("a").loose_eq(&PmfmValue::from(5.0)));
        assert!(!PmfmValue::from(5.0).loose_eq(&PmfmValue::from(6.0)));
    }

    #[test]
    fn ratio_text_depends_on_the_source() {
        assert_eq!(SamplingRatio::entered(25.0).text(), "25%");
        assert_eq!(SamplingRatio::derived(25.0, 25.0, 100.0).text(), "25/100");
        assert_eq!(SamplingRatio::derived(33.0, 12.5, 38.0).text(), "12.5/38");
    }

    #[test]
    fn local_ids_count_down_from_minus_one() {
        let mut ids = LocalIdAllocator::new();
        assert_eq!(ids.next_id(), BatchId(-1));
        assert_eq!(ids.next_id(), BatchId(-2));
        assert!(ids.next_id().is_local());
        assert_eq!(BatchId(-3).magnitude(), 3);
    }

    #[test]
    fn unusable_weights_read_as_absent() {
        assert_eq!(Weight::entered(12.5).usable_value(), Some(12.5));
        assert_eq!(Weight::entered(0.0).usable_value(), Some(0.0));
        assert_eq!(Weight::entered(-1.0).usable_value(), None);
        assert_eq!(Weight::entered(f64::NAN).usable_value(), None);
    }
}
