//! Persistence for the storefront fulfillment engine.
//!
//! Three narrow traits cover what the engine persists: stock counters and
//! products ([`CatalogStore`]), orders ([`OrderRepository`]) and discount
//! codes ([`CodeRegistry`]). Both backends implement all three.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{CatalogStore, CodeRegistry, OrderRepository, StockUpdate, Store};
