pub mod deadline;
pub mod public;
pub mod student;
pub mod teacher;

mod helper;
