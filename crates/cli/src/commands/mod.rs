pub mod serve;
pub mod sync;
