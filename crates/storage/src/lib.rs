pub mod demo;
pub mod repository;
pub mod sqlite;
