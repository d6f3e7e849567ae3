pub mod api;
pub mod app;
pub mod error;
pub mod mongo_ext;
pub mod tracking;
pub mod util;
