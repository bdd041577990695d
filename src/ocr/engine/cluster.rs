use crate::ocr::{Fragment, Rect};

use super::geom::horizontal_overlap_ratio;

const MIN_VERTICAL_GAP_PX: i32 = 10;
const LINE_HEIGHT_FACTOR: f32 = 1.6;
const MIN_HORIZONTAL_OVERLAP: f32 = 0.15;

/// Greedily groups fragments that look like lines of the same caption.
///
/// Fragments are visited by (top, left). A candidate joins the current
/// cluster when its top edge lies within `max(10, 1.6 * seed line height)` of
/// the cluster's top or bottom edge and it overlaps the cluster horizontally
/// by at least 15% of the narrower width. Scanning repeats until a pass adds
/// nothing, so a fragment can join after the cluster widened toward it.
pub fn cluster_fragments<'a>(fragments: &[&'a Fragment]) -> Vec<Vec<&'a Fragment>> {
    let mut items: Vec<(Rect, &'a Fragment)> = fragments
        .iter()
        .map(|fragment| (fragment.polygon.aabb(), *fragment))
        .collect();
    items.sort_by_key(|(rect, _)| (rect.y1, rect.x1));

    let mut used = vec![false; items.len()];
    let mut clusters = Vec::new();

    for seed in 0..items.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let (mut extent, seed_fragment) = items[seed];
        let mut members = vec![seed_fragment];
        let max_dy = MIN_VERTICAL_GAP_PX.max((extent.height() as f32 * LINE_HEIGHT_FACTOR) as i32);

        loop {
            let mut grew = false;
            for idx in seed + 1..items.len() {
                if used[idx] {
                    continue;
                }
                let (rect, fragment) = items[idx];
                if !joins(&extent, &rect, max_dy) {
                    continue;
                }
                used[idx] = true;
                members.push(fragment);
                extent = extent.union(&rect);
                grew = true;
            }
            if !grew {
                break;
            }
        }
        clusters.push(members);
    }

    clusters
}

fn joins(cluster: &Rect, candidate: &Rect, max_dy: i32) -> bool {
    let near_bottom = (candidate.y1 - cluster.y2).abs() <= max_dy;
    let near_top = (candidate.y1 - cluster.y1).abs() <= max_dy;
    if !near_bottom && !near_top {
        return false;
    }
    horizontal_overlap_ratio(cluster, candidate) >= MIN_HORIZONTAL_OVERLAP
}
