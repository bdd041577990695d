use std::collections::BTreeMap;

use crate::ocr::{Fragment, Rect};

struct WordToken {
    text: String,
    rect: Rect,
    conf: f32,
}

/// Groups Tesseract TSV word rows (level 5) into one fragment per text line.
///
/// Rows with negative confidence or blank text are skipped. Polygons are the
/// line's bounding box clamped to `width` x `height`.
pub(super) fn parse_tsv_fragments(tsv: &str, width: u32, height: u32) -> Vec<Fragment> {
    let mut lines: BTreeMap<(i32, i32, i32, i32), Vec<WordToken>> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        let left: i32 = cols[6].parse().unwrap_or(0);
        let top: i32 = cols[7].parse().unwrap_or(0);
        let w: i32 = cols[8].parse().unwrap_or(0);
        let h: i32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        lines.entry(key).or_default().push(WordToken {
            text: text.to_string(),
            rect: Rect::new(left, top, left + w, top + h),
            conf,
        });
    }

    lines
        .into_values()
        .filter_map(|mut words| {
            words.sort_by_key(|word| word.rect.x1);
            build_fragment(&words, width, height)
        })
        .collect()
}

fn build_fragment(words: &[WordToken], width: u32, height: u32) -> Option<Fragment> {
    let rect = words
        .iter()
        .map(|word| word.rect)
        .reduce(|acc, rect| acc.union(&rect))?;
    let text = words
        .iter()
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let conf = words.iter().map(|word| word.conf).sum::<f32>() / words.len() as f32;
    Some(Fragment::new(
        text,
        conf / 100.0,
        rect.to_polygon().clamped(width, height),
    ))
}
