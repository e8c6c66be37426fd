pub mod config;
pub mod detectors;
pub mod error;
pub mod filter;
pub mod io;
pub mod metrics;
pub mod plot;
pub mod signal;
pub mod store;

pub use detectors::*;
pub use error::{PvcError, PvcResult};
pub use metrics::*;
pub use signal::*;
