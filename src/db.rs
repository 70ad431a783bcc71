pub mod product_repo;
pub use product_repo::ProductRepository;
pub mod batch_repo;
pub use batch_repo::BatchRepository;
