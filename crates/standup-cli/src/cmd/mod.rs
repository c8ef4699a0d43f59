pub mod check;
pub mod missing;
pub mod reset;
pub mod run;
