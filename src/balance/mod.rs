//! Channel rebalancing workflow
//!
//! - [`ratio`](balance_ratio): balance ratios and candidate ordering
//! - [`ChannelDirectory`]: the node's channels as last fetched
//! - [`RebalanceIntent`]: the outgoing/incoming/amount/max fee selection
//! - [`RebalanceController`]: cancellable execution of a committed intent
//! - [`RebalanceSession`]: one operator's workflow, as served by the API

mod controller;
mod directory;
mod ratio;
mod selection;
mod session;

pub use controller::{RebalanceController, RebalanceRun, RunOutcome, RunStatus, RunSummary};
pub use directory::{ChannelDirectory, DirectoryStatus};
pub use ratio::{balance_ratio, balance_ratio_precise, incoming_candidates, outgoing_candidates};
pub use selection::{IntentState, RebalanceIntent, RebalanceOrder, Rejected, Selection};
pub use session::{Availability, ChannelView, RebalanceSession, SessionSnapshot};
