//! Device wrapper and the raw driver entry points consumed by the
//! submission protocol.
use std::{fmt, sync::Arc};

use ash::prelude::VkResult;

use crate::vk;

/// The driver calls this crate issues against a logical device.
///
/// `ash::Device` implements this by direct delegation. Substituting another
/// implementation allows the submission protocol to be exercised without a
/// physical device.
pub trait DeviceOps {
    /// vkGetDeviceQueue. Returns a null handle if the queue does not exist.
    fn get_device_queue(&self, family_index: u32, queue_index: u32) -> vk::Queue;

    /// vkQueueSubmit.
    ///
    /// # Safety
    ///
    /// The arrays referenced by `submits` must outlive the call, and access
    /// to `queue` must be externally serialized.
    unsafe fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> VkResult<()>;

    /// vkGetFenceStatus. `Ok(true)` if the fence is signaled.
    fn get_fence_status(&self, fence: vk::Fence) -> VkResult<bool>;

    /// vkResetFences.
    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()>;

    /// vkWaitForFences.
    fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, timeout_ns: u64) -> VkResult<()>;
}

impl DeviceOps for ash::Device {
    fn get_device_queue(&self, family_index: u32, queue_index: u32) -> vk::Queue {
        unsafe { ash::Device::get_device_queue(self, family_index, queue_index) }
    }

    unsafe fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> VkResult<()> {
        ash::Device::queue_submit(self, queue, submits, fence)
    }

    fn get_fence_status(&self, fence: vk::Fence) -> VkResult<bool> {
        unsafe { ash::Device::get_fence_status(self, fence) }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        unsafe { ash::Device::reset_fences(self, fences) }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, timeout_ns: u64) -> VkResult<()> {
        unsafe { ash::Device::wait_for_fences(self, fences, wait_all, timeout_ns) }
    }
}

/// Shared handle to the device-level driver interface.
///
/// Cheap to clone; all clones refer to the same underlying device. The
/// wrapper is `Send + Sync` so tracking state can be read from threads other
/// than the submitting one.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    ops: Box<dyn DeviceOps + Send + Sync>,
}

impl Device {
    /// Wraps a Vulkan logical device.
    pub fn new(device: ash::Device) -> Device {
        Device::with_ops(device)
    }

    /// Wraps an arbitrary implementation of the driver entry points.
    pub fn with_ops(ops: impl DeviceOps + Send + Sync + 'static) -> Device {
        Device {
            inner: Arc::new(DeviceInner { ops: Box::new(ops) }),
        }
    }

    pub(crate) fn ops(&self) -> &(dyn DeviceOps + Send + Sync) {
        &*self.inner.ops
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Device").finish()
    }
}
