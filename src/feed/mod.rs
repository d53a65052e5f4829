mod fetcher;

pub use fetcher::{
    parse_entries, EntrySource, FeedFetcher, FetchError, RawEntry, MAX_FEED_BYTES,
};
