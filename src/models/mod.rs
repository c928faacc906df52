pub mod coin;
pub mod dashboard;
