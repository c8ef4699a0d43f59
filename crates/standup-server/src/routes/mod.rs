pub mod history;
pub mod members;
pub mod submit;
