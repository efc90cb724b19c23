// table/mod.rs - Linked-instance tables

pub mod link_table;

pub use link_table::{Column, LinkTable, Row, DEFAULT_VISIBLE_INSTANCES};
