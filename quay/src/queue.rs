//! Submission of ended command buffers to a hardware queue, and the
//! thread-safe record of what was last submitted.
use std::{fmt, sync::Mutex, time::Duration};

use tracing::{debug, error};

use crate::{vk, CommandBufferId, CommandBufferPool, Device, Error};

/// Bound on the fence wait performed by the wait-for-idle debug path.
const WAIT_FOR_IDLE_TIMEOUT: Duration = Duration::from_millis(200);

/// The pair is updated and read under one lock so a reader never observes a
/// buffer paired with a fence counter from a different submission.
#[derive(Default)]
struct LastSubmitted {
    buffer: Option<CommandBufferId>,
    fence_counter: u64,
    submit_count: u64,
}

/// A thin stateful wrapper around one hardware execution queue.
///
/// Submissions must be externally serialized: the hardware queue is not
/// reentrant across threads. The last-submitted record, however, may be read
/// from any thread (status pollers, resource lifetime trackers).
pub struct SubmissionQueue {
    device: Device,
    queue: vk::Queue,
    family_index: u32,
    queue_index: u32,
    tracking: Mutex<LastSubmitted>,
    wait_for_idle_on_submit: bool,
}

impl SubmissionQueue {
    /// Acquires the zeroth queue of `family_index` from the device.
    ///
    /// A null handle from the driver is fatal: the device cannot operate
    /// without its queues.
    pub fn new(device: &Device, family_index: u32) -> Result<SubmissionQueue, Error> {
        let queue = device.ops().get_device_queue(family_index, 0);
        if queue == vk::Queue::null() {
            error!(family_index, "could not acquire device queue");
            return Err(Error::QueueAcquisition { family_index });
        }
        Ok(SubmissionQueue {
            device: device.clone(),
            queue,
            family_index,
            queue_index: 0,
            tracking: Mutex::new(LastSubmitted::default()),
            wait_for_idle_on_submit: false,
        })
    }

    pub fn handle(&self) -> vk::Queue {
        self.queue
    }

    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// Index of this queue within its family (see vkGetDeviceQueue).
    pub fn queue_index(&self) -> u32 {
        self.queue_index
    }

    /// Number of submissions issued on this queue so far.
    pub fn submit_count(&self) -> u64 {
        self.tracking.lock().unwrap().submit_count
    }

    /// When enabled, every submission blocks until its fence signals,
    /// bounded by a 200 ms timeout. Debugging aid for tracking GPU hangs;
    /// off by default.
    pub fn set_wait_for_idle_on_submit(&mut self, enabled: bool) {
        self.wait_for_idle_on_submit = enabled;
    }

    pub fn wait_for_idle_on_submit(&self) -> bool {
        self.wait_for_idle_on_submit
    }

    /// The most recently submitted buffer and the fence counter captured at
    /// its submission. Returns a copy of the snapshot taken under the lock.
    pub fn last_submitted(&self) -> (Option<CommandBufferId>, u64) {
        let tracking = self.tracking.lock().unwrap();
        (tracking.buffer, tracking.fence_counter)
    }

    /// Submits one ended command buffer, signaling `signal_semaphores` on
    /// completion.
    ///
    /// The submission waits on the semaphores the buffer declared while
    /// recording and is tied to the buffer's own fence, which is the sole
    /// mechanism by which completion is later observed. This call never
    /// blocks on GPU completion in the default path.
    ///
    /// Contract violations (buffer not ended, fence already signaled) and
    /// driver failures are terminal: no retry is attempted and the device
    /// context should be torn down.
    pub fn submit(
        &self,
        pool: &mut CommandBufferPool,
        id: CommandBufferId,
        signal_semaphores: &[vk::Semaphore],
    ) -> Result<(), Error> {
        let buffer = pool.get(id).ok_or(Error::UnknownCommandBuffer)?;
        if !buffer.has_ended() {
            return Err(Error::BufferNotEnded {
                state: buffer.state(),
            });
        }
        let fence = buffer.fence().handle();
        if self.device.ops().get_fence_status(fence)? {
            return Err(Error::FenceAlreadySignaled);
        }

        let command_buffers = [buffer.handle()];
        let wait_semaphores: Vec<vk::Semaphore> =
            buffer.wait_semaphores().iter().map(|s| s.handle()).collect();
        let wait_stage_masks = buffer.wait_stage_masks().to_vec();

        let mut submit_info = vk::SubmitInfo {
            command_buffer_count: 1,
            p_command_buffers: command_buffers.as_ptr(),
            signal_semaphore_count: signal_semaphores.len() as u32,
            p_signal_semaphores: signal_semaphores.as_ptr(),
            ..Default::default()
        };
        // A submission with no wait dependencies leaves the wait fields
        // zeroed. Otherwise the semaphore and stage mask arrays are parallel
        // and equal length.
        if !wait_semaphores.is_empty() {
            submit_info.wait_semaphore_count = wait_semaphores.len() as u32;
            submit_info.p_wait_semaphores = wait_semaphores.as_ptr();
            submit_info.p_wait_dst_stage_mask = wait_stage_masks.as_ptr();
        }

        // The tracking lock is never held across the hardware call.
        if let Err(result) =
            unsafe { self.device.ops().queue_submit(self.queue, &[submit_info], fence) }
        {
            error!(
                ?result,
                family_index = self.family_index,
                "queue submission failed"
            );
            return Err(Error::SubmitFailed(result));
        }
        debug!(
            ?id,
            family_index = self.family_index,
            wait_count = wait_semaphores.len(),
            signal_count = signal_semaphores.len(),
            "submitted command buffer"
        );

        let buffer = pool.get_mut(id).ok_or(Error::UnknownCommandBuffer)?;
        buffer.mark_submitted();
        let fence_counter = buffer.fence_signaled_counter();
        self.update_last_submitted(id, fence_counter);

        // The hardware has accepted the submission, so the record above must
        // stand even if the debug wait below times out (a timeout here is
        // exactly the GPU hang the switch exists to surface).
        let wait_result = if self.wait_for_idle_on_submit {
            self.device.ops().wait_for_fences(
                &[fence],
                true,
                WAIT_FOR_IDLE_TIMEOUT.as_nanos() as u64,
            )
        } else {
            Ok(())
        };

        pool.refresh_fence_status(id)?;
        wait_result?;
        Ok(())
    }

    fn update_last_submitted(&self, id: CommandBufferId, fence_counter: u64) {
        let mut tracking = self.tracking.lock().unwrap();
        tracking.buffer = Some(id);
        tracking.fence_counter = fence_counter;
        tracking.submit_count += 1;
    }
}

impl fmt::Debug for SubmissionQueue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SubmissionQueue")
            .field("queue", &self.queue)
            .field("family_index", &self.family_index)
            .field("queue_index", &self.queue_index)
            .finish()
    }
}
