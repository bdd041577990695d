use crate::ocr::{BubbleCandidate, Fragment};

const ASSIGN_TOLERANCE_PX: i32 = 8;

/// Fragments grouped per bubble, plus the ones no bubble claimed.
#[derive(Debug, Default)]
pub struct Assignment<'a> {
    /// `(candidate index, members)` in the order each bubble first received
    /// a fragment.
    pub groups: Vec<(usize, Vec<&'a Fragment>)>,
    pub unassigned: Vec<&'a Fragment>,
}

/// Assigns each fragment to the first candidate, in scan order, whose bounds
/// (plus a small tolerance) contain the fragment's center. Overlapping
/// candidates resolve to the top-most, then left-most one.
pub fn assign_to_bubbles<'a>(
    candidates: &[BubbleCandidate],
    fragments: &[&'a Fragment],
) -> Assignment<'a> {
    let mut assignment = Assignment::default();
    for &fragment in fragments {
        let center = fragment.polygon.aabb().center();
        let found = candidates
            .iter()
            .position(|candidate| candidate.rect.contains(center, ASSIGN_TOLERANCE_PX));
        match found {
            Some(idx) => {
                match assignment.groups.iter_mut().find(|(group, _)| *group == idx) {
                    Some((_, members)) => members.push(fragment),
                    None => assignment.groups.push((idx, vec![fragment])),
                }
            }
            None => assignment.unassigned.push(fragment),
        }
    }
    assignment
}
