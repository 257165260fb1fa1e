//! CPU/GPU frame synchronization.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

/// A monotonically increasing counter the GPU advances as submitted work completes.
///
/// ```ignore
/// let submission = queue.submit(Some(commands));
/// let value = fence.signal(&queue, submission);
/// fence.wait(&device, value)?;
/// ```
#[derive(Debug, Default)]
pub struct Fence {
    next: u64,
    completed: Arc<AtomicU64>,
    last_submission: Option<(u64, wgpu::SubmissionIndex)>,
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new value that is reached once `submission`, and everything
    /// submitted to `queue` before it, has finished executing.
    pub fn signal(&mut self, queue: &wgpu::Queue, submission: wgpu::SubmissionIndex) -> u64 {
        self.next += 1;
        let value = self.next;
        let completed = self.completed.clone();
        queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });
        self.last_submission = Some((value, submission));
        value
    }

    pub fn completed_value(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Blocks until the fence reaches `value`.
    ///
    /// The thread sleeps inside the device until the matching submission
    /// retires; completion callbacks have run by the time this returns.
    pub fn wait(&self, device: &wgpu::Device, value: u64) -> Result<()> {
        if self.completed_value() >= value {
            return Ok(());
        }
        let submission_index = submission_for(self.last_submission.as_ref(), value);
        device.poll(wgpu::PollType::Wait {
            submission_index,
            timeout: None,
        })?;
        Ok(())
    }
}

/// The submission to wait on for `value`; `None` waits for the latest one.
fn submission_for<T: Clone>(last: Option<&(u64, T)>, value: u64) -> Option<T> {
    last.filter(|(signalled, _)| *signalled >= value)
        .map(|(_, index)| index.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_never_moves_backwards() {
        let fence = Fence::new();
        assert_eq!(fence.completed_value(), 0);

        // Callbacks may run out of order; the counter keeps the highest value.
        fence.completed.fetch_max(3, Ordering::AcqRel);
        fence.completed.fetch_max(2, Ordering::AcqRel);
        assert_eq!(fence.completed_value(), 3);
    }

    #[test]
    fn waits_target_the_signalled_submission() {
        let last = (4, "frame 4");
        assert_eq!(submission_for(Some(&last), 4), Some("frame 4"));
        assert_eq!(submission_for(Some(&last), 2), Some("frame 4"));
        // Values beyond the last signal fall back to the latest submission.
        assert_eq!(submission_for(Some(&last), 5), None);
        assert_eq!(submission_for::<&str>(None, 1), None);
    }
}
