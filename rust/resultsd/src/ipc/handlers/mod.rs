pub mod backup_exchange;
pub mod core;
pub mod exams;
pub mod marks;
pub mod results;
pub mod session;
pub mod settings;
pub mod students;
