mod fetcher;

pub use fetcher::{DiscoveredFeed, FeedFetcher};
