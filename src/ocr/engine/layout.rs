use crate::ocr::{RenderConfig, Rect};

/// Measures text for a font at an integer pixel size.
pub trait TextMetrics {
    fn text_width(&self, text: &str, size: u32) -> f32;
    fn line_height(&self, size: u32) -> f32;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    /// Left edge in image pixels.
    pub x: f32,
    /// Top of the line box in image pixels.
    pub y: f32,
    pub width: f32,
}

/// Result of the font-fit search for one block.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub font_size: u32,
    pub line_height: f32,
    pub lines: Vec<PlacedLine>,
    /// False when even the minimum size overflows the usable rectangle.
    pub fits: bool,
}

/// Usable text rectangle after margins, as `(left, top, width, height)`.
/// Margins are whole pixels, truncated from `box * fraction`.
pub fn usable_area(rect: &Rect, config: &RenderConfig) -> (i32, i32, i32, i32) {
    let width = rect.width();
    let height = rect.height();
    let mx = (width as f32 * config.margin_horizontal) as i32;
    let my = (height as f32 * config.margin_vertical) as i32;
    (rect.x1 + mx, rect.y1 + my, width - 2 * mx, height - 2 * my)
}

/// Finds the largest size in `max_font_size..=min_font_size` whose wrapped
/// lines fit the usable rectangle and positions them centered.
///
/// Returns `None` when there is nothing to draw: blank text or a usable
/// rectangle with no area. When no size fits, the minimum size is used with
/// its own wrap and `fits` is false.
pub fn layout_text(
    text: &str,
    rect: &Rect,
    config: &RenderConfig,
    metrics: &dyn TextMetrics,
) -> Option<TextLayout> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    let (left, top, usable_w, usable_h) = usable_area(rect, config);
    if usable_w <= 0 || usable_h <= 0 {
        return None;
    }
    let (usable_w, usable_h) = (usable_w as f32, usable_h as f32);
    let spacing = config.line_spacing;

    let mut chosen = None;
    for size in (config.min_font_size..=config.max_font_size).rev() {
        let lines = wrap_words(&words, size, usable_w, metrics);
        let line_height = metrics.line_height(size);
        let total = line_height * lines.len() as f32 * spacing;
        if total <= usable_h && lines.iter().all(|(_, width)| *width <= usable_w) {
            chosen = Some((size, lines, true));
            break;
        }
    }
    let (font_size, lines, fits) = chosen.unwrap_or_else(|| {
        let size = config.min_font_size;
        (size, wrap_words(&words, size, usable_w, metrics), false)
    });

    let line_height = metrics.line_height(font_size);
    let advance = line_height * spacing;
    let total = line_height * lines.len() as f32 * spacing;
    let start_y = top as f32 + (usable_h - total) / 2.0;
    let lines = lines
        .into_iter()
        .enumerate()
        .map(|(idx, (text, width))| PlacedLine {
            x: left as f32 + (usable_w - width) / 2.0,
            y: start_y + idx as f32 * advance,
            width,
            text,
        })
        .collect();

    Some(TextLayout {
        font_size,
        line_height,
        lines,
        fits,
    })
}

/// Greedy word wrap. A word wider than `max_width` still gets its own line.
fn wrap_words(
    words: &[&str],
    size: u32,
    max_width: f32,
    metrics: &dyn TextMetrics,
) -> Vec<(String, f32)> {
    let mut lines = Vec::new();
    let Some((first, rest)) = words.split_first() else {
        return lines;
    };
    let mut current = first.to_string();
    for word in rest {
        let candidate = format!("{} {}", current, word);
        if metrics.text_width(&candidate, size) <= max_width {
            current = candidate;
        } else {
            let width = metrics.text_width(&current, size);
            lines.push((std::mem::replace(&mut current, word.to_string()), width));
        }
    }
    let width = metrics.text_width(&current, size);
    lines.push((current, width));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character is half the font size wide; lines are one size tall.
    struct HalfEm;

    impl TextMetrics for HalfEm {
        fn text_width(&self, text: &str, size: u32) -> f32 {
            text.chars().count() as f32 * size as f32 * 0.5
        }

        fn line_height(&self, size: u32) -> f32 {
            size as f32
        }
    }

    fn config() -> RenderConfig {
        RenderConfig::default()
    }

    #[test]
    fn short_text_takes_the_largest_fitting_size() {
        // 250x75 box leaves a 200x61 usable rectangle.
        let rect = Rect::new(0, 0, 250, 75);
        let layout = layout_text("Hi", &rect, &config(), &HalfEm).expect("layout");
        assert!(layout.fits);
        // 50 * 1.2 = 60 fits in 61; 51 * 1.2 does not.
        assert_eq!(layout.font_size, 50);
        assert_eq!(layout.lines.len(), 1);
        let line = &layout.lines[0];
        assert_eq!(line.text, "Hi");
        assert!((line.x - (25.0 + (200.0 - 50.0) / 2.0)).abs() < 1e-4);
        assert!((line.y - (7.0 + (61.0 - 60.0) / 2.0)).abs() < 1e-4);
    }

    #[test]
    fn overlong_text_falls_back_to_minimum_size() {
        // 250x74 box: usable rectangle is exactly 200x60.
        let rect = Rect::new(0, 0, 250, 74);
        assert_eq!(usable_area(&rect, &config()), (25, 7, 200, 60));
        let text = vec!["word"; 200].join(" ");
        let layout = layout_text(&text, &rect, &config(), &HalfEm).expect("layout");
        assert!(!layout.fits);
        assert_eq!(layout.font_size, 8);
        assert!(layout.lines.len() > 1);
        assert!(layout.lines.iter().all(|line| line.width <= 200.0));
    }

    #[test]
    fn chosen_size_never_exceeds_the_box() {
        let rect = Rect::new(100, 100, 400, 260);
        let text = "The quick brown fox jumps over the lazy dog again and again";
        let cfg = config();
        let layout = layout_text(text, &rect, &cfg, &HalfEm).expect("layout");
        assert!(layout.fits);
        let (_, _, usable_w, usable_h) = usable_area(&rect, &cfg);
        for line in &layout.lines {
            assert!(line.width <= usable_w as f32);
        }
        let total = layout.line_height * layout.lines.len() as f32 * cfg.line_spacing;
        assert!(total <= usable_h as f32);
        // One size up must not fit, or the search would have stopped there.
        let mut bigger = cfg.clone();
        bigger.min_font_size = layout.font_size + 1;
        if bigger.min_font_size <= bigger.max_font_size {
            let retry = layout_text(text, &rect, &bigger, &HalfEm).expect("layout");
            assert!(!retry.fits);
        }
    }

    #[test]
    fn wrapped_lines_advance_by_spaced_line_height() {
        let rect = Rect::new(0, 0, 100, 400);
        let layout = layout_text("aaaa bbbb cccc", &rect, &config(), &HalfEm).expect("layout");
        assert!(layout.lines.len() >= 2);
        let step = layout.lines[1].y - layout.lines[0].y;
        assert!((step - layout.line_height * 1.2).abs() < 1e-3);
    }

    #[test]
    fn degenerate_box_or_blank_text_is_skipped() {
        assert!(layout_text("text", &Rect::new(10, 10, 10, 50), &config(), &HalfEm).is_none());
        assert!(layout_text("   ", &Rect::new(0, 0, 100, 100), &config(), &HalfEm).is_none());
    }
}
