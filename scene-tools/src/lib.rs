//! Scene Tools - filtering and recombination of scene tables
//!
//! Operations producing new [`SceneData`](scene_data::SceneData) tables from
//! existing ones:
//! - Combining field blueprints into a single allocation
//! - Dropping fields, entries or whole objects
//! - Splitting objects so each carries at most one field of a kind

pub mod combine;
pub mod filter;
pub mod single_function;

pub use combine::*;
pub use filter::*;
pub use single_function::*;
