pub mod account;
pub mod certificate;
pub mod course;
pub mod deadline;
pub mod homework;
