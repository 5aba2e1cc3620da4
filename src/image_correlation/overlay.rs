//! Vector overlay post-processing.
//!
//! The station deposits an SVG overlay next to each photo. Before it is shown or uploaded,
//! the station's own labels and result markers are stripped and a filled rectangle is drawn
//! over the bounding box of every decoded code.

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::session_management::session::{CodeEntry, Corner};

static TEXT_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<text[\s\S]*?</text>").expect("text element regex should compile")
});
static RESULT_POLYGON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<polygon[^>]*class="result"[^>]*/>"#)
        .expect("result polygon regex should compile")
});

const CLOSING_TAG: &str = "</svg>";

/// Axis-aligned bounding box of a code's corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Computes the box of `corners`; `None` when there are no corners.
    pub fn of(corners: &[Corner]) -> Option<Self> {
        let first = corners.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for corner in &corners[1..] {
            min_x = min_x.min(corner.x);
            min_y = min_y.min(corner.y);
            max_x = max_x.max(corner.x);
            max_y = max_y.max(corner.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }

    fn to_rect(self) -> String {
        format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" stroke="red" stroke-width="5" fill="red" />"#,
            self.x, self.y, self.width, self.height
        )
    }
}

fn highlight(index: usize, code: &CodeEntry) -> Option<String> {
    let corners = match code.corners.as_deref() {
        Some(corners) if !corners.is_empty() => corners,
        _ => {
            debug!("code {} ({:?}) has no corners; not highlighted", index, code.content);
            return None;
        }
    };
    let bbox = BoundingBox::of(corners)?;
    if !(bbox.width > 0.0 && bbox.height > 0.0) {
        warn!(
            "code {} has degenerate bounds: width={}, height={}",
            index, bbox.width, bbox.height
        );
        return None;
    }
    Some(bbox.to_rect())
}

/// Strips station annotations from `svg` and highlights every code with usable corners.
///
/// Codes without corners or with a zero-area box are skipped; the rest are still drawn.
pub fn annotate_overlay(svg: &str, codes: &[CodeEntry]) -> String {
    let stripped = TEXT_ELEMENT.replace_all(svg, "");
    let stripped = RESULT_POLYGON.replace_all(&stripped, "");

    let rects: Vec<String> = codes
        .iter()
        .enumerate()
        .filter_map(|(i, code)| highlight(i, code))
        .collect();

    let injected = format!("  {}\n{}", rects.join("\n"), CLOSING_TAG);
    stripped.replacen(CLOSING_TAG, &injected, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, side: f64) -> Vec<Corner> {
        vec![
            Corner { x, y },
            Corner { x: x + side, y },
            Corner {
                x: x + side,
                y: y + side,
            },
            Corner { x, y: y + side },
        ]
    }

    const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
<image href="cam-1.jpg"/>
<TEXT x="3">A1
</TEXT>
<polygon points="1,1 2,2" class="result" />
<polygon points="5,5 6,6" class="frame" />
</svg>"#;

    #[test]
    fn skips_codes_without_corners_but_keeps_the_rest() {
        let codes = vec![
            CodeEntry::scanned("A1", Some(square(10.0, 20.0, 5.0))),
            CodeEntry::scanned("B2", Some(Vec::new())),
            CodeEntry::scanned("C3", Some(square(1.5, 2.0, 3.0))),
        ];
        let out = annotate_overlay(SVG, &codes);
        assert_eq!(out.matches("<rect").count(), 2);
        assert!(out.contains(
            r#"<rect x="10" y="20" width="5" height="5" stroke="red" stroke-width="5" fill="red" />"#
        ));
        assert!(out.contains(r#"<rect x="1.5" y="2" width="3" height="3""#));
    }

    #[test]
    fn strips_labels_and_result_markers_only() {
        let out = annotate_overlay(SVG, &[]);
        assert!(!out.to_lowercase().contains("<text"));
        assert!(!out.contains(r#"class="result""#));
        assert!(out.contains(r#"class="frame""#));
        assert!(out.ends_with("  \n</svg>"));
    }

    #[test]
    fn degenerate_and_manual_codes_are_skipped() {
        let line = vec![Corner { x: 0.0, y: 0.0 }, Corner { x: 4.0, y: 0.0 }];
        let codes = vec![
            CodeEntry::scanned("flat", Some(line)),
            CodeEntry::manual("typed"),
        ];
        let out = annotate_overlay("<svg></svg>", &codes);
        assert_eq!(out, "<svg>  \n</svg>");
    }

    #[test]
    fn rects_are_injected_before_first_closing_tag() {
        let codes = vec![
            CodeEntry::scanned("A", Some(square(0.0, 0.0, 1.0))),
            CodeEntry::scanned("B", Some(square(2.0, 2.0, 1.0))),
        ];
        let out = annotate_overlay("<svg><svg></svg></svg>", &codes);
        let expected = concat!(
            "<svg><svg>  ",
            r#"<rect x="0" y="0" width="1" height="1" stroke="red" stroke-width="5" fill="red" />"#,
            "\n",
            r#"<rect x="2" y="2" width="1" height="1" stroke="red" stroke-width="5" fill="red" />"#,
            "\n</svg></svg>"
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn bounding_box_spans_all_corners() {
        let corners = vec![
            Corner { x: 5.0, y: 1.0 },
            Corner { x: -2.0, y: 4.0 },
            Corner { x: 3.0, y: -6.0 },
        ];
        let bbox = BoundingBox::of(&corners).unwrap();
        assert_eq!(bbox.x, -2.0);
        assert_eq!(bbox.y, -6.0);
        assert_eq!(bbox.width, 7.0);
        assert_eq!(bbox.height, 10.0);
        assert!(BoundingBox::of(&[]).is_none());
    }
}
