//! Streaming stats-document decoder
//!
//! Turns the stats endpoint's nested JSON response into
//! [`Rowset`](crate::model::Rowset)s without ever materializing the whole
//! payload. Three layers:
//!
//! - **`feed`**: chunked byte delivery behind one small async trait, so the
//!   same decoder runs over an HTTP response body, a spooled temp file or
//!   an in-memory slice
//! - **`cursor`**: a forward-only token cursor (pull parser) over a feed;
//!   structural punctuation is consumed, with separators accepted only where
//!   the grammar allows one, and everything else comes out as a typed token
//!   with its byte offset
//! - **`stats`**: the document walk itself, checking every transition
//!   against the expected shape and projecting samples through the active
//!   schema inline
//!
//! # Wire format
//!
//! ```text
//! {
//!   "values": [
//!     {
//!       "resourceId": "…",
//!       "stat-list": {
//!         "stat": [
//!           { "timestamps": [...], "statKey": { "key": "…" }, "data": [...] },
//!           …
//!         ]
//!       }
//!     },
//!     …
//!   ]
//! }
//! ```
//!
//! Unknown object members anywhere in the document are skipped token by
//! token, so server-side additions don't break decoding; a token that
//! contradicts the structure above fails fast with the expected and actual
//! token in the error.

pub mod cursor;
pub mod feed;
pub mod stats;

pub use cursor::{Token, TokenCursor};
pub use feed::{BodyFeed, ByteFeed, FileFeed, SliceFeed};
pub use stats::StatsDecoder;
