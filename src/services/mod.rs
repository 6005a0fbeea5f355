pub mod db_service;

pub use db_service::{DatabaseService, SqlServerService, LIST_TABLES_SQL};
