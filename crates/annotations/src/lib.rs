pub mod extract;
pub mod fragment;
pub mod mentions;
pub mod selector;
pub mod sparql;

pub use fragment::*;
pub use selector::{parse_npt, parse_xywh, Rect, TimeRange};
