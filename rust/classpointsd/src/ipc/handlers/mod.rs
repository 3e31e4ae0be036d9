pub mod activity;
pub mod badges;
pub mod core;
pub mod goals;
pub mod ledger;
pub mod setup;
pub mod shop;
pub mod students;
