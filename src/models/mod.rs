pub mod api;
pub mod job;
pub mod remote;
pub mod style;
