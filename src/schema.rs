//! Label and reference-data vocabulary for catch-batch trees.
//! Single source of truth for the conventions baked into persisted data.

// ── Batch labels ────────────────────────────────────────────────────────────
pub mod label {
    /// Label carried by the root batch of a catch tree.
    pub const CATCH_BATCH: &str = "CATCH_BATCH";
    /// Taxon-group children of the root: `SORTING_BATCH#<rankOrder>`.
    pub const SORTING_BATCH_PREFIX: &str = "SORTING_BATCH#";
    /// Individual measure batches: `SORTING_BATCH_INDIVIDUAL#<rankOrder>`.
    pub const INDIVIDUAL_PREFIX: &str = "SORTING_BATCH_INDIVIDUAL#";
    /// Suffix marking a sampling batch, appended to its parent's label.
    pub const SAMPLING_SUFFIX: &str = ".%";

    pub fn sorting_batch(rank_order: u32) -> String {
        format!("{SORTING_BATCH_PREFIX}{rank_order}")
    }

    pub fn individual(rank_order: u32) -> String {
        format!("{INDIVIDUAL_PREFIX}{rank_order}")
    }

    /// Label of the sampling child under `parent_label`.
    pub fn sampling(parent_label: &str) -> String {
        format!("{parent_label}{SAMPLING_SUFFIX}")
    }

    /// Label of a qualitative-value child, e.g. `SORTING_BATCH#1.LANDING`.
    pub fn qualitative(parent_label: &str, value_label: &str) -> String {
        format!("{parent_label}.{value_label}")
    }

    /// Root batches carry either no label or the catch marker.
    pub fn is_catch(label: &str) -> bool {
        label.is_empty() || label == CATCH_BATCH
    }

    pub fn is_sampling(label: &str) -> bool {
        label.ends_with(SAMPLING_SUFFIX)
    }

    pub fn is_individual(label: &str) -> bool {
        label.starts_with(INDIVIDUAL_PREFIX)
    }

    /// `SORTING_BATCH#<n>` with no qualitative suffix.
    pub fn is_taxon_group(label: &str) -> bool {
        matches!(label.strip_prefix(SORTING_BATCH_PREFIX), Some(rest) if !rest.contains('.'))
    }
}

// ── Measurement method ids ──────────────────────────────────────────────────
pub mod method {
    use crate::model::MethodId;

    pub const UNKNOWN: MethodId = MethodId(0);
    pub const MEASURED_BY_OBSERVER: MethodId = MethodId(1);
    pub const OBSERVED_BY_OBSERVER: MethodId = MethodId(2);
    pub const ESTIMATED_BY_OBSERVER: MethodId = MethodId(3);
    /// Derived by the reconciliation engine from sibling quantities.
    pub const CALCULATED: MethodId = MethodId(4);
    /// Derived from a length measurement through a weight-length relation.
    pub const CALCULATED_WEIGHT_LENGTH: MethodId = MethodId(5);
    /// Sum of weight-length derived weights over sub-batches.
    pub const CALCULATED_WEIGHT_LENGTH_SUM: MethodId = MethodId(6);

    /// Methods whose values come from a weight-length relation rather than a scale.
    pub fn is_weight_length(method: MethodId) -> bool {
        method == CALCULATED_WEIGHT_LENGTH || method == CALCULATED_WEIGHT_LENGTH_SUM
    }
}

// ── Qualitative value labels ────────────────────────────────────────────────
pub mod qualitative {
    pub const LANDING: &str = "LANDING";
    pub const DISCARD: &str = "DISCARD";
}

// ── Weight units ────────────────────────────────────────────────────────────
pub mod unit {
    /// All weights are stored in kilograms.
    pub const KILOGRAM: &str = "kg";
}
