pub mod analytics;
pub mod auth;
pub mod batch;
pub mod category;
pub mod pagination;
pub mod product;
