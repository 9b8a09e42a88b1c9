pub mod feed;
pub mod model;

pub use feed::{FeedAdapter, FeedError, RestDepthFeed};
pub use model::{OrderBookLevel, OrderBookSnapshot};
