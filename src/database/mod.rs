pub mod connection;
pub mod memory_store;
pub mod payment_store;

pub use memory_store::InMemoryPaymentStore;
pub use payment_store::{MongoPaymentStore, PaymentStore};
