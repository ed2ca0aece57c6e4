pub mod dataset_export;
pub mod model_store;
pub mod repositories;

pub use model_store::ModelStore;
pub use repositories::{InMemoryBarRepository, JsonBarRepository};
