pub mod device;
pub mod source;

#[cfg(windows)]
mod native;

pub use device::*;
pub use source::*;
