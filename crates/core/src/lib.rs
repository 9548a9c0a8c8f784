pub mod detection;
pub mod pipeline;
pub mod scheduling;
pub mod shared;
