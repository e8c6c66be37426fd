pub mod amplitude;
pub mod baseline;
