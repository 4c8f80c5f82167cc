//! Ingestion: topic parsing, payload decoding, entity state and dispatch.
//!
//! ```text
//! InboundMessage ─> parse_topic + decode_value ─> EntityCache ─> Dispatcher ─> sink
//! ```

pub mod cache;
pub mod dispatcher;
pub mod payload;
pub mod subscriber;
pub mod topic;

pub use cache::{EntityCache, EvictionPolicy, MaxEntries, Unbounded};
pub use dispatcher::{Dispatcher, SendOutcome};
pub use payload::decode_value;
pub use subscriber::{state_request_topic, Subscriber};
pub use topic::{parse_alias_arg, parse_topic, AliasTable, ParsedTopic};
