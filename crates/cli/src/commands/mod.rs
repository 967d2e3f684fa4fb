pub mod flags;
pub mod topology;
