//! Media fragment selectors as MICO writes them into `rdf:value`, e.g.
//! `http://host/part#t=npt:12,34` or `http://host/part#xywh=10,20,64,64`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NPT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"npt:(\d+),(\d+)").unwrap());
static XYWH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#xywh=(\d+),(\d+),(\d+),(\d+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// First `npt:<start>,<end>` range found in the selector value.
pub fn parse_npt(value: &str) -> Option<TimeRange> {
    let caps = NPT_PATTERN.captures(value)?;
    Some(TimeRange {
        start: caps[1].parse().ok()?,
        end: caps[2].parse().ok()?,
    })
}

/// First `#xywh=<x>,<y>,<w>,<h>` box found in the selector value.
pub fn parse_xywh(value: &str) -> Option<Rect> {
    let caps = XYWH_PATTERN.captures(value)?;
    Some(Rect {
        x: caps[1].parse().ok()?,
        y: caps[2].parse().ok()?,
        width: caps[3].parse().ok()?,
        height: caps[4].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npt_inside_fragment_identifier() {
        let value = "http://demo.mico-project.eu/marmotta/abc/def#t=npt:120,245";
        assert_eq!(parse_npt(value), Some(TimeRange { start: 120, end: 245 }));
    }

    #[test]
    fn npt_without_prefix() {
        assert_eq!(parse_npt("npt:0,1"), Some(TimeRange { start: 0, end: 1 }));
    }

    #[test]
    fn npt_rejects_other_encodings() {
        assert_eq!(parse_npt("t=smpte:10,20"), None);
        assert_eq!(parse_npt("npt:12"), None);
        assert_eq!(parse_npt(""), None);
    }

    #[test]
    fn npt_overflow_is_not_a_match() {
        assert_eq!(parse_npt("npt:99999999999999999999,1"), None);
    }

    #[test]
    fn xywh_box() {
        let value = "http://demo.mico-project.eu/marmotta/abc/frame#xywh=10,20,64,48";
        assert_eq!(
            parse_xywh(value),
            Some(Rect {
                x: 10,
                y: 20,
                width: 64,
                height: 48
            })
        );
    }

    #[test]
    fn xywh_needs_hash_and_four_numbers() {
        assert_eq!(parse_xywh("xywh=10,20,64,48"), None);
        assert_eq!(parse_xywh("#xywh=10,20,64"), None);
        assert_eq!(parse_xywh("#xywh=percent:10,20,30,40"), None);
    }

    #[test]
    fn xywh_takes_the_first_box() {
        let rect = parse_xywh("#xywh=1,2,3,4 #xywh=5,6,7,8").unwrap();
        assert_eq!(rect.x, 1);
    }
}
