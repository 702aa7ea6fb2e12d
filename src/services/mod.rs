pub mod local_store;
pub mod status_source;
