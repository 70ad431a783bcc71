pub mod batch_service;
pub mod codes;
pub mod inventory_service;
