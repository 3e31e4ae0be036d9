pub mod activity;
pub mod badges;
pub mod clock;
pub mod config;
pub mod coupons;
pub mod db;
pub mod error;
pub mod facts;
pub mod goals;
pub mod ipc;
pub mod leaderboard;
pub mod ledger;
pub mod model;
pub mod students;

pub use error::{CoreError, CoreResult};
