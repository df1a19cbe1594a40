//! Campaign and round sequencing.
//!
//! A campaign is started by one `go` command and runs rounds of
//! scan → connect → discover → write → read → disconnect until the scan
//! budget is spent or a scan times out. The state machine is a pure
//! function of events; the [`Central`](crate::Central) runtime feeds it
//! radio callbacks and timer expiries and carries out the effects it returns.

pub mod event;
pub mod machine;
pub mod state;

pub use event::{Effect, Event, Outcome};
pub use machine::Session;
pub use state::{Campaign, CampaignStatus, Round, SessionState};
