pub mod connection;
pub mod event;
pub mod query;
pub mod table;

pub use connection::*;
pub use event::*;
pub use query::*;
pub use table::*;
