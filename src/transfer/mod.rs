pub mod accepted;
pub mod driver;
pub mod presenter;
pub mod record;
pub mod snapshot;
pub mod store;
