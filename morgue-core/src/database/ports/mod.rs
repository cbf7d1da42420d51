pub mod catalog;
pub mod queue;
