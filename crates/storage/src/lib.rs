//! Storage for escrow protocol state.

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteStore;
pub use store::{
    ActionLogStore, EscrowStore, NewActionRecord, OrderItemObjectStore, OrderItemStore,
    OrderStore,
};
