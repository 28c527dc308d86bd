use tracing::debug;

use crate::error::{BatchField, ValidationError};
use crate::model::{Batch, CatchTree, NodeId, Provenance, SamplingRatio, Weight};
use crate::rounding;
use crate::schema::method;

/// Policy switches for [`reconcile`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ReconcileOptions {
    /// Treat a missing sampling weight as a validation failure whenever the
    /// engine cannot derive one.
    pub required_sampling_weight: bool,
}

/// Reconcile the (total weight, sampling weight, sampling ratio) triple of
/// `parent` and its sampling child.
///
/// Call after any of the three quantities changes. Given any two of them the
/// third is derived and marked computed; derived values from earlier passes
/// are overwritten or cleared, user-entered values are never touched.
/// Idempotent: a second call on unchanged inputs changes nothing and returns
/// the same outcome. A parent without a sampling child is a no-op.
pub fn reconcile(
    tree: &mut CatchTree,
    parent: NodeId,
    opts: &ReconcileOptions,
) -> Result<(), ValidationError> {
    let Some(sample) = tree.sampling_child(parent) else {
        return Ok(());
    };
    let (parent_batch, sample_batch) = tree.pair_mut(parent, sample);
    reconcile_pair(parent_batch, sample_batch, opts)
}

fn reconcile_pair(
    parent: &mut Batch,
    sample: &mut Batch,
    opts: &ReconcileOptions,
) -> Result<(), ValidationError> {
    // Case 1: two weighed values fix the ratio.
    if let (Some(total), Some(sampling)) = (
        total_for_ratio(parent.weight),
        sampling_for_ratio(sample.weight),
    ) {
        if sampling > total {
            return Err(ValidationError::SampleExceedsTotal { max: total });
        }
        let pct = rounding::ratio_percent(sampling, total);
        sample.sampling_ratio = Some(SamplingRatio::derived(pct, sampling, total));
        debug!(total, sampling, pct, "ratio derived from weights");
        return Ok(());
    }

    let user_pct = user_ratio_pct(sample.sampling_ratio);

    // Case 2: user ratio and total fix the sampling weight.
    if let (Some(pct), Some(total)) = (user_pct, source_weight(parent.weight)) {
        if engine_owned(sample.weight) {
            let sampling = rounding::sampling_weight(total, pct);
            sample.weight = Some(Weight::computed(sampling, method::CALCULATED));
            debug!(total, pct, sampling, "sampling weight derived from ratio");
            return Ok(());
        }
    }

    // Case 3: user ratio and sampling weight fix the total.
    if let (Some(pct), Some(sampling)) = (user_pct, source_weight(sample.weight)) {
        if engine_owned(parent.weight) {
            let total = rounding::total_weight(sampling, pct);
            parent.weight = Some(Weight::computed(total, method::CALCULATED));
            debug!(sampling, pct, total, "total weight derived from ratio");
            return Ok(());
        }
    }

    // Case 4: under-determined. Drop values derived on earlier passes so the
    // form falls back to empty, editable fields.
    let mut cleared = 0u32;
    if parent.weight.is_some_and(|w| w.is_computed()) {
        parent.weight = None;
        cleared += 1;
    }
    if sample.sampling_ratio.is_some_and(|r| r.is_computed()) {
        sample.sampling_ratio = None;
        cleared += 1;
    }
    if sample.weight.is_some_and(|w| w.is_computed()) {
        sample.weight = None;
        cleared += 1;
    }
    if cleared > 0 {
        debug!(cleared, "cleared derived values in an under-determined state");
    }

    if opts.required_sampling_weight && sample.weight.and_then(|w| w.usable_value()).is_none() {
        return Err(ValidationError::Required {
            field: BatchField::SamplingWeight,
        });
    }
    Ok(())
}

/// Extension point for deriving an estimated round weight from a batch's
/// individual length measurements. Reports whether anything changed; today it
/// never does and never fails.
///
/// TODO: fill the sampling child's `children_weight` from per-taxon
/// weight-length coefficients once the reference-data contract exposes them.
pub fn compute_round_weight_conversion(_tree: &mut CatchTree, _parent: NodeId) -> bool {
    false
}

// ── Usability predicates ────────────────────────────────────────────────────
// None, NaN, infinities and negative weights all read as absent here, never
// as errors.

/// A total weight that may drive the ratio: present, not computed, > 0.
fn total_for_ratio(weight: Option<Weight>) -> Option<f64> {
    let weight = weight?;
    if weight.is_computed() {
        return None;
    }
    weight.usable_value().filter(|v| *v > 0.0)
}

/// A sampling weight that may drive the ratio: present, not computed, not
/// estimated through a weight-length relation, > 0.
fn sampling_for_ratio(weight: Option<Weight>) -> Option<f64> {
    let weight = weight?;
    match weight.provenance {
        Provenance::Computed { .. } => None,
        Provenance::Estimated { method } if method::is_weight_length(method) => None,
        _ => weight.usable_value().filter(|v| *v > 0.0),
    }
}

/// A weight that can serve as a derivation source: present, not computed.
fn source_weight(weight: Option<Weight>) -> Option<f64> {
    let weight = weight?;
    if weight.is_computed() {
        return None;
    }
    weight.usable_value()
}

/// Whether the engine may overwrite this slot: absent, unusable, or its own
/// previous output.
fn engine_owned(weight: Option<Weight>) -> bool {
    source_weight(weight).is_none()
}

/// A ratio that may drive a derivation: user entered, within (0, 100].
fn user_ratio_pct(ratio: Option<SamplingRatio>) -> Option<f64> {
    let ratio = ratio?;
    if ratio.is_computed() {
        return None;
    }
    ratio.usable_pct().filter(|p| *p > 0.0)
}
