//! Pure rebalance math (§4.5): redistribute pages from the busiest Product
//! worker to idle ones. Performed by the waiting General worker during the
//! batch-completion poll.

use std::collections::BTreeMap;

/// Classify live Product workers into busy (non-empty page list) and idle
/// (empty), and compute the single-round rebalance per §4.5: take
/// ceil-half of the busiest worker's pages and distribute them among idle
/// workers by ceil-division.
///
/// Returns the updated page lists for every worker that changed, or an
/// empty map if no rebalance is needed (no idle workers, or no busy
/// workers to take from).
#[must_use]
pub fn rebalance_once(pages_by_worker: &BTreeMap<u32, Vec<u32>>) -> BTreeMap<u32, Vec<u32>> {
    let mut busy: Vec<(u32, usize)> = pages_by_worker
        .iter()
        .filter(|(_, p)| !p.is_empty())
        .map(|(&id, p)| (id, p.len()))
        .collect();
    let idle: Vec<u32> = pages_by_worker
        .iter()
        .filter(|(_, p)| p.is_empty())
        .map(|(&id, _)| id)
        .collect();

    if busy.is_empty() || idle.is_empty() {
        return BTreeMap::new();
    }

    busy.sort_by(|a, b| b.1.cmp(&a.1));
    let (busiest_id, busiest_len) = busy[0];
    let take_count = busiest_len.div_ceil(2);
    if take_count == 0 {
        return BTreeMap::new();
    }

    let busiest_pages = &pages_by_worker[&busiest_id];
    let (to_move, remaining): (Vec<u32>, Vec<u32>) = (
        busiest_pages[busiest_pages.len() - take_count..].to_vec(),
        busiest_pages[..busiest_pages.len() - take_count].to_vec(),
    );

    let per_idle = to_move.len().div_ceil(idle.len());
    let mut out = BTreeMap::new();
    out.insert(busiest_id, remaining);

    let mut chunks = to_move.chunks(per_idle.max(1));
    for &idle_id in &idle {
        let chunk = chunks.next().unwrap_or(&[]).to_vec();
        out.insert(idle_id, chunk);
    }

    out
}
