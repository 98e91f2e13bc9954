//! Session startup and teardown

pub mod shutdown;
pub mod startup;

pub use shutdown::{TeardownError, TeardownReport, teardown};
pub use startup::Session;
