mod ids;
mod row;
mod tag;

pub use ids::TagId;
pub use row::Row;
pub use tag::{FlatTag, Tag};
