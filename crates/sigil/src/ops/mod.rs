//! The standard operator set.

pub mod load;
pub mod map;
pub mod skip;

pub use load::{Loadable, LoadableOp, Then, loadable, then};
pub use map::{Map, MapWith, map, map_with, select};
pub use skip::{Notifier, Skip, SkipLast, SkipUntil, SkipWhile, skip, skip_last, skip_until, skip_until_any, skip_while};
