//! The page context: what the app's UI does with the worker and the store.

mod feed;

pub use feed::{FeedQuery, FeedSource, FeedView};
