pub mod connection;
pub mod value;

pub use connection::{parse_connection_string, DatabaseConnection};
pub use value::row_to_record;
