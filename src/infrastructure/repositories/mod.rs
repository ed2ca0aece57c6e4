pub mod in_memory;
pub mod json_bar_repository;

pub use in_memory::InMemoryBarRepository;
pub use json_bar_repository::JsonBarRepository;
