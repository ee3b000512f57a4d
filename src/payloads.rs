pub mod account;
pub mod deadline;
pub mod student;
pub mod teacher;
