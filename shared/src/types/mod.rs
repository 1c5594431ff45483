//! Record and report types

pub mod records;
pub mod views;
