//! Catch-batch trees for fisheries sampling trips.
//!
//! A catch tree decomposes everything caught in one fishing operation: taxon
//! groups under the root, optional qualitative splits (landed vs. discarded)
//! under each group, and sampling children holding the hand-weighed
//! subsamples counts and weights are extrapolated from. This crate owns the
//! in-memory tree, the flat parent-id-linked persistence form, and the
//! reconciliation engine that derives whichever of
//! (total weight, sampling weight, sampling ratio) the observer left blank.

mod aggregation;
mod codec;
mod error;
mod model;
mod ordering;
mod reconcile;
pub mod rounding;
pub mod schema;

pub use aggregation::{
    roll_up_from_sub_batches, split_by_qualitative_value, split_into_groups,
    sum_observed_individual_count, BatchGroup, PmfmRegistry, QualitativeValue, RollUpOptions,
    WeightPmfm,
};
pub use codec::{flat_list_to_tree, tree_to_flat_list, FlatBatch, FlatWeight};
pub use error::{BatchField, MissingIdError, ValidationError};
pub use model::{
    Batch, BatchId, BatchRole, CatchTree, LocalIdAllocator, MethodId, NodeId, PmfmId, PmfmValue,
    Provenance, RatioSource, ReferenceRef, SamplingRatio, Weight,
};
pub use ordering::{id_or_rank_order, same_batch, SortDirection};
pub use reconcile::{compute_round_weight_conversion, reconcile, ReconcileOptions};
