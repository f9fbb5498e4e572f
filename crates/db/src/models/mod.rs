pub mod queue_entry;
pub mod worker;
