//! Fragments out of SELECT results for the selector queries in [`crate::sparql`].

use std::collections::HashSet;

use crate::fragment::Fragment;
use crate::selector::{parse_npt, parse_xywh, Rect};
use crate::sparql::{SelectResults, ANNOTATION_VAR, SELECTOR_VAR};

/// A face box whose time range still has to be looked up.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceCandidate {
    pub annotation: String,
    pub bounds: Rect,
}

/// One sequence fragment per distinct shot selector, in first-seen order.
pub fn sequence_fragments(results: &SelectResults) -> Vec<Fragment> {
    let mut seen = HashSet::new();
    results
        .values(SELECTOR_VAR)
        .filter(|value| seen.insert(*value))
        .filter_map(parse_npt)
        .map(|range| Fragment::Sequence {
            start: range.start,
            end: range.end,
        })
        .collect()
}

pub fn face_candidates(results: &SelectResults) -> Vec<FaceCandidate> {
    results
        .pairs(ANNOTATION_VAR, SELECTOR_VAR)
        .filter_map(|(annotation, selector)| {
            Some(FaceCandidate {
                annotation: annotation.to_string(),
                bounds: parse_xywh(selector)?,
            })
        })
        .collect()
}

/// Places `face` in every time range the temporal query returned for it.
pub fn face_fragments(face: &FaceCandidate, temporal: &SelectResults) -> Vec<Fragment> {
    temporal
        .values(SELECTOR_VAR)
        .filter_map(parse_npt)
        .map(|range| Fragment::Face {
            start: range.start,
            end: range.end,
            x: face.bounds.x,
            y: face.bounds.y,
            width: face.bounds.width,
            height: face.bounds.height,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(rows: &[(&str, &str)]) -> SelectResults {
        let bindings: Vec<_> = rows
            .iter()
            .map(|(annotation, selector)| {
                serde_json::json!({
                    "annotation": { "type": "uri", "value": annotation },
                    "selector": { "type": "literal", "value": selector },
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({
            "head": { "vars": ["annotation", "selector"] },
            "results": { "bindings": bindings },
        }))
        .unwrap()
    }

    #[test]
    fn shots_are_deduplicated_and_unparseable_ones_dropped() {
        let shots = results(&[
            ("http://x/a1", "http://x/p#t=npt:0,4"),
            ("http://x/a2", "http://x/p#t=npt:0,4"),
            ("http://x/a3", "http://x/p#t=npt:4,11"),
            ("http://x/a4", "http://x/p#xywh=1,2,3,4"),
        ]);
        assert_eq!(
            sequence_fragments(&shots),
            vec![
                Fragment::Sequence { start: 0, end: 4 },
                Fragment::Sequence { start: 4, end: 11 },
            ]
        );
    }

    #[test]
    fn face_candidates_need_a_box() {
        let faces = results(&[
            ("http://x/f1", "http://x/frame#xywh=10,20,30,40"),
            ("http://x/f2", "http://x/frame#t=npt:1,2"),
        ]);
        let candidates = face_candidates(&faces);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].annotation, "http://x/f1");
        assert_eq!(candidates[0].bounds.height, 40);
    }

    #[test]
    fn face_is_placed_in_each_time_range() {
        let face = FaceCandidate {
            annotation: "http://x/f1".into(),
            bounds: Rect {
                x: 10,
                y: 20,
                width: 30,
                height: 40,
            },
        };
        let temporal = results(&[
            ("http://x/s1", "http://x/p#t=npt:3,7"),
            ("http://x/s2", "http://x/p#t=npt:12,15"),
            ("http://x/s3", "garbage"),
        ]);

        let fragments = face_fragments(&face, &temporal);
        assert_eq!(fragments.len(), 2);
        assert_eq!(
            fragments[1],
            Fragment::Face {
                start: 12,
                end: 15,
                x: 10,
                y: 20,
                width: 30,
                height: 40,
            }
        );
    }

    #[test]
    fn face_without_time_range_yields_nothing() {
        let face = FaceCandidate {
            annotation: "http://x/f1".into(),
            bounds: Rect {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            },
        };
        assert!(face_fragments(&face, &results(&[])).is_empty());
    }
}
