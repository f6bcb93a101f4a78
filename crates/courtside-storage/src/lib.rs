//! Upstream HTTP fetch, persistence and event-sink boundaries for courtside.

mod http;
mod sink;
mod store;

pub use http::{
    classify_reqwest_error, classify_status, FetchError, FetchedBody, HttpClientConfig,
    HttpFetcher, RateLimit, RequestBudget, RetryDisposition,
};
pub use sink::{
    live_stream_name, stats_stream_name, stream_for, EventSink, GameEvent, MemorySink,
    PublishError, PublishedEvent, RedisStreamSink,
};
pub use store::{
    run_migrations, GameStore, MemoryGameStore, PgGameStore, SeasonId, StoreError, StoredGame,
    UpsertSummary,
};

pub const CRATE_NAME: &str = "courtside-storage";
