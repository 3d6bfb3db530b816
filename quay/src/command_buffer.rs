//! Command buffer lifecycle tracking and the pool registry that owns them.
use std::sync::Arc;

use slotmap::SlotMap;
use tracing::trace;

use crate::{vk, Device, Error, Fence, Semaphore};

slotmap::new_key_type! {
    /// Non-owning identifier for a command buffer registered with a pool.
    ///
    /// Subsystems that track "the last submitted buffer" hold this key; the
    /// pool remains the sole owner of the buffer itself.
    pub struct CommandBufferId;
}

/// Lifecycle of a command buffer as observed by the submission protocol.
///
/// The only transition out of `Ended` is a successful
/// [`SubmissionQueue::submit`](crate::SubmissionQueue::submit); the pool's
/// fence refresh drives `Submitted -> Completed`, and recycling returns a
/// completed buffer to `Recording`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    /// Open for recording.
    Recording,
    /// Recording has ended; the buffer may be submitted exactly once.
    Ended,
    /// Issued to the hardware queue; completion is observed via the fence.
    Submitted,
    /// The fence was observed signaled; the buffer can be recycled.
    Completed,
}

/// A recorded sequence of GPU commands together with the synchronization
/// objects that order and complete it.
pub struct CommandBuffer {
    raw: vk::CommandBuffer,
    state: State,
    fence: Fence,
    /// Parallel to `wait_stage_masks`, in declaration order.
    wait_semaphores: Vec<Arc<Semaphore>>,
    wait_stage_masks: Vec<vk::PipelineStageFlags>,
    /// Fence counter captured at the moment of the last submission.
    submitted_fence_counter: u64,
}

impl CommandBuffer {
    fn new(raw: vk::CommandBuffer, fence: Fence) -> CommandBuffer {
        CommandBuffer {
            raw,
            state: State::Recording,
            fence,
            wait_semaphores: vec![],
            wait_stage_masks: vec![],
            submitted_fence_counter: 0,
        }
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.raw
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn has_ended(&self) -> bool {
        self.state == State::Ended
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    /// Current completion generation of the buffer's fence.
    pub fn fence_signaled_counter(&self) -> u64 {
        self.fence.signaled_counter()
    }

    /// Fence counter snapshot taken when the buffer was last submitted.
    ///
    /// The buffer's GPU work is known complete once
    /// [`fence_signaled_counter`](Self::fence_signaled_counter) exceeds this
    /// value.
    pub fn submitted_fence_counter(&self) -> u64 {
        self.submitted_fence_counter
    }

    pub fn wait_semaphores(&self) -> &[Arc<Semaphore>] {
        &self.wait_semaphores
    }

    pub fn wait_stage_masks(&self) -> &[vk::PipelineStageFlags] {
        &self.wait_stage_masks
    }

    /// Declares a semaphore the submission must wait on, and the pipeline
    /// stage at which the wait applies. Only valid while recording.
    pub fn add_wait_semaphore(
        &mut self,
        semaphore: Arc<Semaphore>,
        stage_mask: vk::PipelineStageFlags,
    ) -> Result<(), Error> {
        if self.state != State::Recording {
            return Err(Error::InvalidState {
                expected: State::Recording,
                actual: self.state,
            });
        }
        self.wait_semaphores.push(semaphore);
        self.wait_stage_masks.push(stage_mask);
        Ok(())
    }

    /// Closes the buffer for recording, making it eligible for submission.
    pub fn end(&mut self) -> Result<(), Error> {
        if self.state != State::Recording {
            return Err(Error::InvalidState {
                expected: State::Recording,
                actual: self.state,
            });
        }
        self.state = State::Ended;
        Ok(())
    }

    /// Records the effects of a successful submission: the state flip, the
    /// wait semaphores becoming GPU-owned, and the fence counter snapshot.
    pub(crate) fn mark_submitted(&mut self) {
        self.state = State::Submitted;
        for semaphore in &self.wait_semaphores {
            semaphore.mark_submitted();
        }
        self.submitted_fence_counter = self.fence.signaled_counter();
    }
}

/// Owns command buffers and derives their fence-based lifecycle status.
pub struct CommandBufferPool {
    device: Device,
    buffers: SlotMap<CommandBufferId, CommandBuffer>,
}

impl CommandBufferPool {
    pub fn new(device: &Device) -> CommandBufferPool {
        CommandBufferPool {
            device: device.clone(),
            buffers: SlotMap::with_key(),
        }
    }

    /// Registers an externally allocated command buffer and its fence. The
    /// buffer starts out open for recording.
    pub fn register(&mut self, handle: vk::CommandBuffer, fence: Fence) -> CommandBufferId {
        self.buffers.insert(CommandBuffer::new(handle, fence))
    }

    pub fn get(&self, id: CommandBufferId) -> Option<&CommandBuffer> {
        self.buffers.get(id)
    }

    pub fn get_mut(&mut self, id: CommandBufferId) -> Option<&mut CommandBuffer> {
        self.buffers.get_mut(id)
    }

    /// Re-derives the fence-based lifecycle status of one buffer.
    ///
    /// A submitted buffer whose fence reports signaled has completed on the
    /// GPU: the fence is reset for its next cycle, its signaled counter
    /// advances, and the wait semaphores are released for reuse. Buffers in
    /// any other state are left untouched.
    pub fn refresh_fence_status(&mut self, id: CommandBufferId) -> Result<(), Error> {
        let buffer = self.buffers.get_mut(id).ok_or(Error::UnknownCommandBuffer)?;
        Self::refresh_buffer(&self.device, id, buffer)
    }

    /// Refreshes every buffer in the pool.
    pub fn refresh_all(&mut self) -> Result<(), Error> {
        for (id, buffer) in self.buffers.iter_mut() {
            Self::refresh_buffer(&self.device, id, buffer)?;
        }
        Ok(())
    }

    fn refresh_buffer(
        device: &Device,
        id: CommandBufferId,
        buffer: &mut CommandBuffer,
    ) -> Result<(), Error> {
        if buffer.state != State::Submitted {
            return Ok(());
        }
        if device.ops().get_fence_status(buffer.fence.handle())? {
            device.ops().reset_fences(&[buffer.fence.handle()])?;
            let counter = buffer.fence.advance_signaled_counter();
            for semaphore in buffer.wait_semaphores.drain(..) {
                semaphore.reset_submitted();
            }
            buffer.wait_stage_masks.clear();
            buffer.state = State::Completed;
            trace!(?id, counter, "command buffer completed");
        }
        Ok(())
    }

    /// Returns a completed buffer to the recording state for reuse.
    pub fn recycle(&mut self, id: CommandBufferId) -> Result<(), Error> {
        let buffer = self.buffers.get_mut(id).ok_or(Error::UnknownCommandBuffer)?;
        if buffer.state != State::Completed {
            return Err(Error::InvalidState {
                expected: State::Completed,
                actual: buffer.state,
            });
        }
        buffer.state = State::Recording;
        Ok(())
    }
}
