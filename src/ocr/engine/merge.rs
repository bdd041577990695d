use tracing::debug;

use crate::ocr::{BubbleCandidate, Fragment, TextBlock};

use super::assign::assign_to_bubbles;
use super::cluster::cluster_fragments;
use super::geom::{mean, union_polygons};
use super::text::{has_text, join_texts};

/// Consolidates fragments into one block per bubble or fallback cluster,
/// returned top to bottom.
///
/// Empty-text fragments are dropped first. Members of a bubble are read top
/// to bottom; cluster members keep the order in which they joined.
pub fn merge_fragments(candidates: &[BubbleCandidate], fragments: &[Fragment]) -> Vec<TextBlock> {
    let fragments: Vec<&Fragment> = fragments.iter().filter(|f| has_text(f)).collect();
    if fragments.is_empty() {
        return Vec::new();
    }

    let fragment_count = fragments.len();
    let mut blocks = Vec::new();
    let leftovers = if candidates.is_empty() {
        fragments
    } else {
        let assignment = assign_to_bubbles(candidates, &fragments);
        for (_, mut members) in assignment.groups {
            members.sort_by_key(|fragment| fragment.polygon.aabb().y1);
            blocks.extend(build_block(&members));
        }
        assignment.unassigned
    };

    let bubble_blocks = blocks.len();
    for cluster in cluster_fragments(&leftovers) {
        blocks.extend(build_block(&cluster));
    }
    debug!(
        "merged {} fragments into {} blocks ({} bubble, {} cluster)",
        fragment_count,
        blocks.len(),
        bubble_blocks,
        blocks.len() - bubble_blocks
    );

    blocks.sort_by_key(|block| block.polygon.aabb().y1);
    blocks
}

fn build_block(members: &[&Fragment]) -> Option<TextBlock> {
    let polygon = union_polygons(members.iter().map(|f| &f.polygon))?;
    Some(TextBlock {
        text: join_texts(members.iter().map(|f| f.text.as_str())),
        confidence: mean(members.iter().map(|f| f.confidence)),
        polygon,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::Rect;

    fn fragment(text: &str, confidence: f32, rect: Rect) -> Fragment {
        Fragment::new(text, confidence, rect.to_polygon())
    }

    fn bubble(x1: i32, y1: i32, x2: i32, y2: i32) -> BubbleCandidate {
        BubbleCandidate {
            rect: Rect::new(x1, y1, x2, y2),
        }
    }

    #[test]
    fn bubble_members_join_top_to_bottom() {
        let candidates = [bubble(0, 0, 200, 200)];
        let lower = fragment("there", 0.6, Rect::new(20, 80, 120, 100));
        let upper = fragment("Hi", 0.8, Rect::new(30, 40, 90, 60));
        let blocks = merge_fragments(&candidates, &[lower, upper]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Hi there");
        assert!((blocks[0].confidence - 0.7).abs() < 1e-6);
        assert_eq!(blocks[0].polygon.aabb(), Rect::new(20, 40, 120, 100));
    }

    #[test]
    fn empty_text_is_dropped_before_merging() {
        let fragments = [
            fragment("  ", 0.9, Rect::new(0, 0, 50, 20)),
            fragment("", 0.9, Rect::new(0, 300, 50, 320)),
            fragment("kept", 0.5, Rect::new(0, 100, 50, 120)),
        ];
        let blocks = merge_fragments(&[], &fragments);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "kept");
        assert_eq!(blocks[0].confidence, 0.5);
    }

    #[test]
    fn unassigned_fragments_fall_back_to_clusters() {
        let candidates = [bubble(0, 0, 100, 100)];
        let fragments = [
            fragment("inside", 0.9, Rect::new(10, 10, 80, 30)),
            fragment("caption", 0.9, Rect::new(300, 300, 400, 320)),
            fragment("below", 0.9, Rect::new(310, 325, 390, 345)),
        ];
        let blocks = merge_fragments(&candidates, &fragments);
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, ["inside", "caption below"]);
    }

    #[test]
    fn union_contains_every_member() {
        let fragments = [
            fragment("a", 0.9, Rect::new(40, 10, 90, 30)),
            fragment("b", 0.9, Rect::new(35, 34, 120, 52)),
            fragment("c", 0.9, Rect::new(50, 55, 70, 70)),
        ];
        let blocks = merge_fragments(&[], &fragments);
        assert_eq!(blocks.len(), 1);
        let union = blocks[0].polygon.aabb();
        for member in &fragments {
            let rect = member.polygon.aabb();
            assert!(union.x1 <= rect.x1 && union.x2 >= rect.x2);
            assert!(union.y1 <= rect.y1 && union.y2 >= rect.y2);
        }
        assert_eq!(union, Rect::new(35, 10, 120, 70));
    }

    #[test]
    fn blocks_are_sorted_by_top_edge() {
        let candidates = [bubble(0, 200, 100, 300), bubble(200, 0, 300, 100)];
        let fragments = [
            fragment("late", 0.9, Rect::new(10, 220, 80, 240)),
            fragment("early", 0.9, Rect::new(210, 20, 280, 40)),
        ];
        let blocks = merge_fragments(&candidates, &fragments);
        assert_eq!(blocks[0].text, "early");
        assert_eq!(blocks[1].text, "late");
    }
}
