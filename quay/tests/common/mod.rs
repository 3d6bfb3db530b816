//! Shared test harness: a fake driver that records every submission it
//! receives, so the protocol can be exercised without a physical device.
#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use ash::{prelude::VkResult, vk::Handle};
use quay::{vk, CommandBufferId, CommandBufferPool, Device, DeviceOps, Fence, Semaphore, SubmissionQueue};

/// One vkQueueSubmit call as seen by the driver.
#[derive(Clone, Debug)]
pub struct RecordedSubmit {
    pub queue: vk::Queue,
    pub command_buffers: Vec<vk::CommandBuffer>,
    /// Whether the wait fields were populated at all.
    pub wait_fields_present: bool,
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub wait_stage_masks: Vec<vk::PipelineStageFlags>,
    pub signal_semaphores: Vec<vk::Semaphore>,
    pub fence: vk::Fence,
}

/// One vkWaitForFences call.
#[derive(Clone, Debug)]
pub struct RecordedWait {
    pub fences: Vec<vk::Fence>,
    pub timeout_ns: u64,
}

#[derive(Default)]
pub struct FakeDevice {
    pub submits: Mutex<Vec<RecordedSubmit>>,
    pub waits: Mutex<Vec<RecordedWait>>,
    signaled: Mutex<HashSet<u64>>,
    fail_submit_with: Mutex<Option<vk::Result>>,
    fail_wait_with: Mutex<Option<vk::Result>>,
    null_queue_families: Mutex<HashSet<u32>>,
    handle_counter: AtomicU64,
}

impl FakeDevice {
    fn next_handle(&self) -> u64 {
        self.handle_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn new_fence(&self) -> Fence {
        Fence::from_handle(vk::Fence::from_raw(self.next_handle()))
    }

    pub fn new_semaphore(&self) -> Arc<Semaphore> {
        Arc::new(Semaphore::from_handle(vk::Semaphore::from_raw(
            self.next_handle(),
        )))
    }

    pub fn new_command_buffer_handle(&self) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(self.next_handle())
    }

    /// Marks a fence as signaled, as the GPU would on completion.
    pub fn signal_fence(&self, fence: vk::Fence) {
        self.signaled.lock().unwrap().insert(fence.as_raw());
    }

    /// Makes the next queue_submit call fail with `result`.
    pub fn fail_next_submit(&self, result: vk::Result) {
        *self.fail_submit_with.lock().unwrap() = Some(result);
    }

    /// Makes the next wait_for_fences call fail with `result`.
    pub fn fail_next_wait(&self, result: vk::Result) {
        *self.fail_wait_with.lock().unwrap() = Some(result);
    }

    /// Makes get_device_queue return a null handle for `family_index`.
    pub fn deny_queue_family(&self, family_index: u32) {
        self.null_queue_families.lock().unwrap().insert(family_index);
    }

    pub fn submit_log(&self) -> Vec<RecordedSubmit> {
        self.submits.lock().unwrap().clone()
    }

    pub fn wait_log(&self) -> Vec<RecordedWait> {
        self.waits.lock().unwrap().clone()
    }
}

unsafe fn read_array<T: Copy>(ptr: *const T, count: u32) -> Vec<T> {
    if count == 0 || ptr.is_null() {
        return vec![];
    }
    std::slice::from_raw_parts(ptr, count as usize).to_vec()
}

/// Local handle to the fake driver; `DeviceOps` cannot be implemented for
/// `Arc<FakeDevice>` directly (it is not a type of this crate).
pub struct SharedFake(pub Arc<FakeDevice>);

impl DeviceOps for SharedFake {
    fn get_device_queue(&self, family_index: u32, _queue_index: u32) -> vk::Queue {
        if self.0.null_queue_families.lock().unwrap().contains(&family_index) {
            return vk::Queue::null();
        }
        vk::Queue::from_raw(0x5100_0000 + u64::from(family_index))
    }

    unsafe fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> VkResult<()> {
        if let Some(result) = self.0.fail_submit_with.lock().unwrap().take() {
            return Err(result);
        }
        let mut log = self.0.submits.lock().unwrap();
        for info in submits {
            log.push(RecordedSubmit {
                queue,
                command_buffers: read_array(info.p_command_buffers, info.command_buffer_count),
                wait_fields_present: !info.p_wait_semaphores.is_null(),
                wait_semaphores: read_array(info.p_wait_semaphores, info.wait_semaphore_count),
                wait_stage_masks: read_array(info.p_wait_dst_stage_mask, info.wait_semaphore_count),
                signal_semaphores: read_array(info.p_signal_semaphores, info.signal_semaphore_count),
                fence,
            });
        }
        Ok(())
    }

    fn get_fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        Ok(self.0.signaled.lock().unwrap().contains(&fence.as_raw()))
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        let mut signaled = self.0.signaled.lock().unwrap();
        for fence in fences {
            signaled.remove(&fence.as_raw());
        }
        Ok(())
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], _wait_all: bool, timeout_ns: u64) -> VkResult<()> {
        self.0.waits.lock().unwrap().push(RecordedWait {
            fences: fences.to_vec(),
            timeout_ns,
        });
        if let Some(result) = self.0.fail_wait_with.lock().unwrap().take() {
            return Err(result);
        }
        Ok(())
    }
}

pub struct TestContext {
    pub fake: Arc<FakeDevice>,
    pub device: Device,
    pub pool: CommandBufferPool,
    pub queue: SubmissionQueue,
}

pub fn context() -> TestContext {
    init_logging();
    let fake = Arc::new(FakeDevice::default());
    let device = Device::with_ops(SharedFake(fake.clone()));
    let pool = CommandBufferPool::new(&device);
    let queue = SubmissionQueue::new(&device, 0).unwrap();
    TestContext {
        fake,
        device,
        pool,
        queue,
    }
}

/// Registers a fresh command buffer and ends recording on it.
pub fn ended_buffer(ctx: &mut TestContext) -> CommandBufferId {
    let handle = ctx.fake.new_command_buffer_handle();
    let fence = ctx.fake.new_fence();
    let id = ctx.pool.register(handle, fence);
    ctx.pool.get_mut(id).unwrap().end().unwrap();
    id
}

pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
