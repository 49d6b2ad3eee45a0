pub mod config;
pub mod load;
pub mod pipeline;
pub mod provision;
pub mod schema;
pub mod source;
pub mod transform;
pub mod warehouse;

#[cfg(test)]
mod log_capture;
