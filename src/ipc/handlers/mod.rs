pub mod attendance;
pub mod classes;
pub mod core;
pub mod fees;
pub mod reports;
pub mod rewards;
pub mod students;
pub mod transactions;
