pub mod connection;
pub mod error;
pub mod fixture;
pub mod handle;
pub mod row_helpers;
pub mod schema;

pub use connection::connect;
pub use error::StoreError;
pub use handle::StoreHandle;
