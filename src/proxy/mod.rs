pub mod router;
pub mod splice;

pub use router::{ConnectionRouter, Inspection, Outcome, RouterOptions, inspect, read_first_packet};
pub use splice::{ClosedBy, SpliceStats, splice};
