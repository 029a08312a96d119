pub mod error;
pub mod json_extract;

pub use json_extract::extract_first_json_object;
