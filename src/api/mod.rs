pub mod api_types;
pub mod client;
mod records;
pub mod types;

pub use client::{ApiClient, PostsApi};
pub use types::{PendingWrite, Post, PostDraft, Subscription, SubscriptionKeys};
