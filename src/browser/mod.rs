pub mod automation;
pub mod chrome;
pub mod page;
