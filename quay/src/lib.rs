pub use ash::{self, vk};

pub use command_buffer::*;
pub use device::*;
pub use error::*;
pub use queue::*;
pub use sync::*;

mod command_buffer;
mod device;
mod error;
mod queue;
mod sync;
