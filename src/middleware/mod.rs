pub mod profiling;

pub use profiling::profile_requests;
