//! Cost-based planning: converts a logical [`QueryData`] into the cheapest
//! [`Plan`] the enumerator can find, using table statistics for
//! selectivity. Plans are immutable once built; execution creates a fresh
//! operator tree per run via [`Plan::emit_executor`].

#[cfg(test)]
mod tests;

mod optimizer;
mod plan;
mod query;

pub use optimizer::optimize;
pub use plan::{JoinKind, Plan, ScanTable};
pub use query::QueryData;
