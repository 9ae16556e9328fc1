//! Pure page-partitioning math for even-distribution and round-robin
//! rotation modes (§4.3). Kept free of coordinator I/O so the partitioning
//! invariants (§8: even-mode partition, rotation-mode monotonicity) are
//! testable without a backend.

use std::collections::BTreeMap;

/// An inclusive page range `[start, end]`.
pub type PageRange = (u32, u32);

/// Partition `[1..=total_pages]` across `live_ids` (already sorted
/// ascending) by `ceil(total_pages / live_ids.len())`, in deterministic id
/// order. Returns an empty map if there are no live workers or no pages.
#[must_use]
pub fn even_assignment(total_pages: u32, live_ids: &[u32]) -> BTreeMap<u32, PageRange> {
    let mut out = BTreeMap::new();
    if total_pages == 0 || live_ids.is_empty() {
        return out;
    }

    let count = live_ids.len() as u32;
    let chunk = total_pages.div_ceil(count);

    let mut start = 1u32;
    for &id in live_ids {
        if start > total_pages {
            break;
        }
        let end = (start + chunk - 1).min(total_pages);
        out.insert(id, (start, end));
        start = end + 1;
    }
    out
}

/// Round-robin rotation assignment (§4.3). Given the current
/// `(index, last_assigned_page)` state and the live worker set, returns the
/// worker to assign next plus its range, and the updated rotation state.
///
/// Returns `None` if there is nothing left to assign in this cycle
/// (`last_assigned_page >= total_pages`) or there are no live workers.
#[must_use]
pub fn rotation_assignment(
    total_pages: u32,
    batch_size: u32,
    live_ids: &[u32],
    index: u32,
    last_assigned_page: u32,
) -> Option<(u32, PageRange, u32, u32)> {
    if live_ids.is_empty() || last_assigned_page >= total_pages || batch_size == 0 {
        return None;
    }

    let bounded_index = index % (live_ids.len() as u32);
    let worker_id = live_ids[bounded_index as usize];

    let start = last_assigned_page + 1;
    let end = (last_assigned_page + batch_size).min(total_pages);

    let next_index = bounded_index + 1;
    Some((worker_id, (start, end), next_index, end))
}

/// Whether a rotation cycle has completed and must be reset (§4.3, §9).
#[must_use]
pub fn rotation_cycle_complete(total_pages: u32, last_assigned_page: u32) -> bool {
    total_pages > 0 && last_assigned_page >= total_pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split_divides_without_remainder() {
        let assignment = even_assignment(100, &[1, 2, 4]);
        assert_eq!(assignment.len(), 3);
        assert_eq!(assignment[&1], (1, 34));
        assert_eq!(assignment[&2], (35, 68));
        assert_eq!(assignment[&4], (69, 100));
    }

    #[test]
    fn even_split_covers_every_page_exactly_once() {
        let assignment = even_assignment(37, &[1, 2, 3, 5]);
        let mut covered = Vec::new();
        for (start, end) in assignment.values() {
            for p in *start..=*end {
                covered.push(p);
            }
        }
        covered.sort_unstable();
        let expected: Vec<u32> = (1..=37).collect();
        assert_eq!(covered, expected);
    }

    #[test]
    fn even_split_empty_workers_yields_nothing() {
        assert!(even_assignment(100, &[]).is_empty());
    }

    #[test]
    fn even_split_zero_pages_yields_nothing() {
        assert!(even_assignment(0, &[1, 2]).is_empty());
    }

    #[test]
    fn rotation_advances_index_and_cursor() {
        let (worker, range, next_index, next_last) =
            rotation_assignment(120, 50, &[1, 2, 3], 0, 0).unwrap();
        assert_eq!(worker, 1);
        assert_eq!(range, (1, 50));
        assert_eq!(next_index, 1);
        assert_eq!(next_last, 50);

        let (worker2, range2, next_index2, next_last2) =
            rotation_assignment(120, 50, &[1, 2, 3], next_index, next_last).unwrap();
        assert_eq!(worker2, 2);
        assert_eq!(range2, (51, 100));
        assert_eq!(next_index2, 2);
        assert_eq!(next_last2, 100);
    }

    #[test]
    fn rotation_clamps_final_chunk_to_total_pages() {
        let (_, range, _, next_last) = rotation_assignment(120, 50, &[1, 2, 3], 2, 100).unwrap();
        assert_eq!(range, (101, 120));
        assert_eq!(next_last, 120);
    }

    #[test]
    fn rotation_index_wraps_when_membership_shrinks() {
        // index=5 but only 2 live workers now: 5 % 2 == 1
        let (worker, _, _, _) = rotation_assignment(100, 10, &[7, 9], 5, 0).unwrap();
        assert_eq!(worker, 9);
    }

    #[test]
    fn rotation_done_when_cursor_reaches_total() {
        assert!(rotation_assignment(100, 50, &[1], 0, 100).is_none());
        assert!(rotation_cycle_complete(100, 100));
        assert!(!rotation_cycle_complete(100, 99));
    }
}
