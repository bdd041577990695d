use crate::ocr::{Polygon, Rect};

/// Horizontal overlap as a fraction of the narrower of the two widths.
pub(super) fn horizontal_overlap_ratio(a: &Rect, b: &Rect) -> f32 {
    let overlap = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0);
    let min_w = a.width().min(b.width()).max(1);
    overlap as f32 / min_w as f32
}

pub(super) fn union_polygons<'a, I>(polygons: I) -> Option<Polygon>
where
    I: IntoIterator<Item = &'a Polygon>,
{
    polygons
        .into_iter()
        .map(Polygon::aabb)
        .reduce(|acc, rect| acc.union(&rect))
        .map(|rect| rect.to_polygon())
}

pub(super) fn mean(values: impl IntoIterator<Item = f32>) -> f32 {
    let mut total = 0.0;
    let mut count = 0usize;
    for value in values {
        total += value;
        count += 1;
    }
    if count == 0 { 0.0 } else { total / count as f32 }
}
