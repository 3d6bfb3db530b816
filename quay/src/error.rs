use crate::{command_buffer::State, vk};

/// Errors surfaced by the submission protocol.
///
/// Every variant is terminal by design: contract violations indicate a bug
/// in the caller, and driver failures leave GPU/CPU state ambiguous. None of
/// them should be retried; the expected recourse is to tear down the device
/// context.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no queue could be acquired from family {family_index}")]
    QueueAcquisition { family_index: u32 },
    #[error("command buffer has not ended recording (state: {state:?})")]
    BufferNotEnded { state: State },
    #[error("command buffer fence is already signaled")]
    FenceAlreadySignaled,
    #[error("command buffer is not registered with this pool")]
    UnknownCommandBuffer,
    #[error("expected command buffer state {expected:?}, found {actual:?}")]
    InvalidState { expected: State, actual: State },
    #[error("queue submission failed")]
    SubmitFailed(#[source] vk::Result),
    #[error("Vulkan error")]
    Vulkan(#[from] vk::Result),
}
