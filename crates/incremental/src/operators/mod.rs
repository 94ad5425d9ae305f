//! Pipeline operators.
//!
//! - `Filter`: passes through rows matching a predicate
//! - `Skip`: drops rows up to a bound row
//! - `Take`: keeps the first `limit` rows, optionally per partition
//! - `Join`: attaches child rows to their parents as a relationship
//! - `FanOut` / `FanIn`: split a stream into `OR` branches and merge it back

mod fan_in;
mod fan_out;
mod filter;
mod join;
mod skip;
mod take;

pub use fan_in::FanIn;
pub use fan_out::FanOut;
pub use filter::{Filter, FilterMode};
pub use join::{Join, JoinArgs};
pub use skip::{Skip, SkipBound};
pub use take::{PartitionKey, Take, TakeState};
