pub mod config;
pub mod error;
pub mod flow_table;
pub mod logging;
pub mod probe;
pub mod qdisc;
pub mod rate;

pub use config::{ControlLaw, MfConfig};
pub use error::MfError;
pub use flow_table::FlowTable;
pub use probe::{ProbeReader, ProbeRegistry};
pub use qdisc::{EnqueueStatus, MfQdisc};
