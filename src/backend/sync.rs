// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync.
// One FrameCycle per frame in flight:
//
//   Idle -> Recording -> Submitted -> Signaled -> (fence reset) Idle
//
// The fence gates CPU reuse of the command buffer, `image_available` gates
// GPU execution on the swapchain image, `render_finished` gates presentation.

use ash::vk;
use std::time::Duration;

use super::Gpu;
use crate::error::{fatal_on, warn_on, ErrorKind, RenderError, RenderResult};

/// Where a frame is in its CPU/GPU round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Recording,
    Submitted,
    Signaled,
}

/// Command buffer + fence + semaphores for one frame in flight
pub struct FrameCycle {
    pub command_buffer: vk::CommandBuffer,
    pub in_flight_fence: vk::Fence,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    state: FrameState,
}

impl FrameCycle {
    /// Objects created before a failure are destroyed again
    pub fn new(gpu: &dyn Gpu, command_pool: vk::CommandPool) -> RenderResult<Self> {
        let command_buffer = unsafe { gpu.allocate_command_buffer(command_pool) }
            .map_err(fatal_on("allocate frame command buffer"))?;

        let mut frame = Self {
            command_buffer,
            in_flight_fence: vk::Fence::null(),
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            state: FrameState::Idle,
        };

        if let Err(e) = unsafe { frame.create_sync_objects(gpu) } {
            frame.destroy(gpu);
            unsafe { gpu.free_command_buffer(command_pool, command_buffer) };
            return Err(e);
        }
        Ok(frame)
    }

    unsafe fn create_sync_objects(&mut self, gpu: &dyn Gpu) -> RenderResult<()> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Unsignaled: nothing has been submitted yet, and Idle never waits
        let fence_info = vk::FenceCreateInfo::builder();

        self.in_flight_fence = gpu.create_fence(&fence_info).map_err(fatal_on("create fence"))?;
        self.image_available = gpu
            .create_semaphore(&semaphore_info)
            .map_err(fatal_on("create semaphore"))?;
        self.render_finished = gpu
            .create_semaphore(&semaphore_info)
            .map_err(fatal_on("create semaphore"))?;
        Ok(())
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Block until the GPU has finished this frame's last submission.
    ///
    /// Gives up after `timeout` with a fatal `GpuTimeout`; a frame that never
    /// signals means the GPU is hung.
    pub fn wait(&mut self, gpu: &dyn Gpu, timeout: Duration) -> RenderResult<()> {
        match self.state {
            FrameState::Idle | FrameState::Signaled => Ok(()),
            FrameState::Recording => Err(self.invalid("wait for the GPU")),
            FrameState::Submitted => {
                let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
                match unsafe { gpu.wait_for_fence(self.in_flight_fence, timeout_ns) } {
                    Ok(()) => {
                        self.state = FrameState::Signaled;
                        Ok(())
                    }
                    Err(vk::Result::TIMEOUT) => Err(RenderError::fatal(ErrorKind::GpuTimeout(timeout))),
                    Err(e) => Err(fatal_on("wait for fence")(e)),
                }
            }
        }
    }

    /// Start recording. The previous submission must have been waited on.
    pub fn begin(&mut self, gpu: &dyn Gpu) -> RenderResult<vk::CommandBuffer> {
        match self.state {
            FrameState::Idle => {}
            FrameState::Signaled => {
                unsafe { gpu.reset_fence(self.in_flight_fence) }.map_err(warn_on("reset fence"))?;
                self.state = FrameState::Idle;
            }
            FrameState::Recording | FrameState::Submitted => return Err(self.invalid("begin recording")),
        }

        let begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            gpu.reset_command_buffer(self.command_buffer)
                .map_err(warn_on("reset command buffer"))?;
            gpu.begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(warn_on("begin command buffer"))?;
        }

        self.state = FrameState::Recording;
        Ok(self.command_buffer)
    }

    /// Finish recording and submit.
    ///
    /// Execution waits on `image_available` at color-attachment output;
    /// completion signals `render_finished` and the fence. On failure nothing
    /// is in flight and the frame drops back to `Idle` so it can be re-recorded.
    pub fn submit(&mut self, gpu: &dyn Gpu) -> RenderResult<()> {
        if self.state != FrameState::Recording {
            return Err(self.invalid("submit"));
        }

        if let Err(e) = unsafe { self.end_and_submit(gpu) } {
            self.state = FrameState::Idle;
            return Err(e);
        }

        self.state = FrameState::Submitted;
        Ok(())
    }

    unsafe fn end_and_submit(&self, gpu: &dyn Gpu) -> RenderResult<()> {
        gpu.end_command_buffer(self.command_buffer)
            .map_err(warn_on("end command buffer"))?;

        let wait_semaphores = [self.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_finished];
        let command_buffers = [self.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        gpu.queue_submit(&submit_info, self.in_flight_fence)
            .map_err(warn_on("queue submit"))
    }

    /// Destroy the fence and semaphores. The command buffer goes with its pool.
    pub fn destroy(self, gpu: &dyn Gpu) {
        unsafe {
            gpu.destroy_semaphore(self.image_available);
            gpu.destroy_semaphore(self.render_finished);
            gpu.destroy_fence(self.in_flight_fence);
        }
    }

    fn invalid(&self, operation: &'static str) -> RenderError {
        RenderError::warning(ErrorKind::InvalidFrameState {
            actual: self.state,
            operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::SimulatedDevice;

    const TIMEOUT: Duration = Duration::from_millis(10);

    fn frame(gpu: &SimulatedDevice) -> FrameCycle {
        FrameCycle::new(gpu, vk::CommandPool::null()).unwrap()
    }

    #[test]
    fn test_full_cycle() {
        let gpu = SimulatedDevice::new();
        let mut frame = frame(&gpu);
        assert_eq!(frame.state(), FrameState::Idle);
        assert!(!gpu.fence_signaled(frame.in_flight_fence));

        frame.begin(&gpu).unwrap();
        assert_eq!(frame.state(), FrameState::Recording);

        frame.submit(&gpu).unwrap();
        assert_eq!(frame.state(), FrameState::Submitted);

        frame.wait(&gpu, TIMEOUT).unwrap();
        assert_eq!(frame.state(), FrameState::Signaled);
        assert!(gpu.fence_signaled(frame.in_flight_fence));

        frame.begin(&gpu).unwrap();
        assert_eq!(frame.state(), FrameState::Recording);
        assert!(!gpu.fence_signaled(frame.in_flight_fence));
    }

    #[test]
    fn test_submission_waits_and_signals_frame_semaphores() {
        let gpu = SimulatedDevice::new();
        let mut frame = frame(&gpu);

        frame.begin(&gpu).unwrap();
        frame.submit(&gpu).unwrap();

        let submission = gpu.last_submission().unwrap();
        assert_eq!(submission.wait_semaphores, vec![frame.image_available]);
        assert_eq!(submission.signal_semaphores, vec![frame.render_finished]);
        assert_eq!(submission.command_buffers, vec![frame.command_buffer]);
        assert_eq!(submission.fence, frame.in_flight_fence);
    }

    #[test]
    fn test_cannot_rerecord_before_wait() {
        let gpu = SimulatedDevice::new();
        let mut frame = frame(&gpu);

        frame.begin(&gpu).unwrap();
        frame.submit(&gpu).unwrap();

        let err = frame.begin(&gpu).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::InvalidFrameState {
                actual: FrameState::Submitted,
                ..
            }
        ));
        assert_eq!(frame.state(), FrameState::Submitted);
    }

    #[test]
    fn test_submit_requires_recording() {
        let gpu = SimulatedDevice::new();
        let mut frame = frame(&gpu);

        assert!(frame.submit(&gpu).is_err());
        assert!(gpu.last_submission().is_none());
    }

    #[test]
    fn test_wait_while_recording_is_rejected() {
        let gpu = SimulatedDevice::new();
        let mut frame = frame(&gpu);

        frame.begin(&gpu).unwrap();
        assert!(frame.wait(&gpu, TIMEOUT).is_err());
    }

    #[test]
    fn test_hung_gpu_times_out() {
        let gpu = SimulatedDevice::new();
        gpu.hang();
        let mut frame = frame(&gpu);

        frame.begin(&gpu).unwrap();
        frame.submit(&gpu).unwrap();

        let err = frame.wait(&gpu, TIMEOUT).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err.kind(), ErrorKind::GpuTimeout(t) if *t == TIMEOUT));
        assert_eq!(frame.state(), FrameState::Submitted);
    }

    #[test]
    fn test_destroy_releases_sync_objects() {
        let gpu = SimulatedDevice::new();
        let frame = frame(&gpu);
        assert_eq!(gpu.live_sync_objects(), 3);

        frame.destroy(&gpu);
        assert_eq!(gpu.live_sync_objects(), 0);
    }

    #[test]
    fn test_failed_submit_returns_to_idle() {
        let gpu = SimulatedDevice::new();
        let mut frame = frame(&gpu);

        frame.begin(&gpu).unwrap();
        gpu.fail_on("queue_submit");
        let err = frame.submit(&gpu).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(frame.state(), FrameState::Idle);
        assert!(gpu.last_submission().is_none());

        // Nothing in flight, so waiting is a no-op and recording starts over
        frame.wait(&gpu, TIMEOUT).unwrap();
        gpu.recover("queue_submit");
        frame.begin(&gpu).unwrap();
        assert_eq!(frame.state(), FrameState::Recording);
        frame.submit(&gpu).unwrap();
        assert_eq!(frame.state(), FrameState::Submitted);
    }

    #[test]
    fn test_failed_end_returns_to_idle() {
        let gpu = SimulatedDevice::new();
        let mut frame = frame(&gpu);

        frame.begin(&gpu).unwrap();
        gpu.fail_on("end_command_buffer");
        assert!(frame.submit(&gpu).is_err());
        assert_eq!(frame.state(), FrameState::Idle);
        assert!(frame.begin(&gpu).is_ok());
    }

    #[test]
    fn test_failed_setup_leaves_nothing_alive() {
        for operation in ["create_fence", "create_semaphore"] {
            let gpu = SimulatedDevice::new();
            gpu.fail_on(operation);

            let err = FrameCycle::new(&gpu, vk::CommandPool::null()).err().unwrap();
            assert!(err.is_fatal());
            assert_eq!(gpu.live_sync_objects(), 0, "{}", operation);
            assert_eq!(gpu.live_command_buffers(), 0, "{}", operation);
        }
    }
}
