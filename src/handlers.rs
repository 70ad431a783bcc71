pub mod batches;
pub mod inventory;
