pub mod avatar_id;
pub mod json;
