//! fb-types: Shared entity model for the football statistics cache
//!
//! This crate defines the types every other crate in the workspace speaks:
//! - [`EntityKind`] / [`EntityKey`] - Closed set of cacheable kinds and their keys
//! - [`League`] - A competition with its validated standings table
//! - [`Team`] - A club with its aggregate [`TeamStats`] snapshot
//! - [`Match`] - A single fixture
//! - [`Entity`] - Tagged union of the above, as stored
//! - [`CacheRecord`] - A body plus fetch time, freshness window and version
//! - [`Clock`] - Injectable time source for staleness decisions
//!
//! # Example
//!
//! ```rust
//! use fb_types::{TeamStats, FormResult};
//!
//! let stats = TeamStats::from_results(&[(2, 0), (1, 1), (0, 3)]);
//! assert_eq!(stats.points, 4);
//! assert_eq!(stats.form_results()[0], FormResult::Win);
//! ```

mod clock;
mod entity;
mod error;
mod fixture;
mod key;
mod league;
mod record;
mod team;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::Entity;
pub use error::TypeError;
pub use fixture::{Match, MatchStatus, MatchWinner, Score, TeamRef};
pub use key::{EntityKey, EntityKind};
pub use league::{League, StandingEntry};
pub use record::{CacheRecord, Freshness};
pub use team::{parse_form, FormResult, Team, TeamStats, FORM_LENGTH};
