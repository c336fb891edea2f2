//! Domain module - Core business logic and entities
//!
//! This module contains the domain entities, value objects and the
//! trait seams (repository, extractor) the rest of the crate plugs into.

pub mod car;
pub mod phone;
pub mod repositories;
pub mod services;

// Re-export commonly used items
pub use car::{ListingDetails, NewCar, PhoneToken};
pub use repositories::{CarRepository, InsertOutcome};
pub use services::DetailExtractor;
