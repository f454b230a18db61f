mod events;
mod metrics;
mod policy;
mod query;
mod report;

pub use events::*;
pub use metrics::*;
pub use policy::*;
pub use query::*;
pub use report::*;
