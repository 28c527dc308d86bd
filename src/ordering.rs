use std::cmp::Ordering;

use crate::model::Batch;

/// Sort direction for batch comparators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Whether two batch values denote the same batch.
///
/// Two matching persisted ids decide on their own. Otherwise identity falls
/// back to the functional key: same rank among siblings, same operation,
/// same sale, same label (an empty label matches only an empty label).
pub fn same_batch(a: &Batch, b: &Batch) -> bool {
    if let (Some(id_a), Some(id_b)) = (a.id, b.id) {
        if id_a == id_b {
            return true;
        }
    }
    a.rank_order == b.rank_order
        && a.operation_id == b.operation_id
        && a.sale_id == b.sale_id
        && a.label == b.label
}

/// Comparator ordering batches by id magnitude, so rows keep their place
/// when local ids are swapped for persisted ones on save. Batches without
/// two comparable ids fall back to rank order.
pub fn id_or_rank_order(direction: SortDirection) -> impl Fn(&Batch, &Batch) -> Ordering {
    move |a, b| {
        let ordering = match (a.id, b.id) {
            (Some(id_a), Some(id_b)) if id_a.magnitude() != id_b.magnitude() => {
                id_a.magnitude().cmp(&id_b.magnitude())
            }
            _ => a.rank_order.cmp(&b.rank_order),
        };
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}
