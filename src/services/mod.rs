pub mod derived_metrics;
pub mod failure_cache;
pub mod fetch_gate;
pub mod poll_loop;
pub mod view_state;

pub use failure_cache::{FailureCache, FailureType};
pub use fetch_gate::{CommitOutcome, FetchGate, GateSnapshot, LoadState, Ticket};
pub use poll_loop::{FetchFn, PollKey, PollPolicy, PollSession, PollStatus};
pub use view_state::{
    compose, render, status_of, ErrorInfo, GraphSelection, SelectionError, SortOrder, SortValue, ViewQuery,
    ViewRow, ViewSnapshot, ViewStatus,
};
