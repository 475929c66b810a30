pub mod attendance;
pub mod calendar;
pub mod classes;
pub mod core;
pub mod notices;
pub mod students;
