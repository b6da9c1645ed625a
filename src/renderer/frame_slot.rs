//! Single-slot frame hand-off between producer threads and the render thread.
//!
//! Producers copy their frame into the slot under a mutex; a newer frame
//! replaces one that was never drawn. The render thread swaps the slot's
//! buffer with its own in O(1), so it always sees a whole frame and the two
//! byte arenas are reused across submissions. An optional waker runs after
//! every accepted submission so an idle render loop can schedule a draw.

use super::RendererError;
use super::planes::{I420Planes, split_i420};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Waker = Box<dyn Fn() + Send + Sync>;

/// Owned I420 frame backed by a reusable byte arena
#[derive(Debug, Default)]
pub struct I420Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl I420Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and copy `data`, keeping the existing allocation when it is large enough
    pub fn assign(&mut self, data: &[u8], width: u32, height: u32) -> Result<(), RendererError> {
        split_i420(data, width, height)?;
        if (width, height) != (self.width, self.height) && data.len() > self.data.capacity() {
            log::debug!(
                "Frame arena grows {} -> {} bytes ({}x{})",
                self.data.capacity(),
                data.len(),
                width,
                height
            );
        }
        self.data.clear();
        self.data.extend_from_slice(data);
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// `None` until a frame has been assigned
    pub fn planes(&self) -> Option<I420Planes<'_>> {
        if self.data.is_empty() {
            return None;
        }
        split_i420(&self.data, self.width, self.height).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}

/// Counters for the hand-off
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub submitted: u64,
    /// Frames overwritten before a draw tick took them
    pub dropped: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct SlotInner {
    frame: I420Frame,
    pending: bool,
    stats: SlotStats,
}

/// Latest-frame-wins slot
#[derive(Default)]
pub struct FrameSlot {
    inner: Mutex<SlotInner>,
    waker: Option<Waker>,
}

impl fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSlot")
            .field("inner", &self.inner)
            .field("waker", &self.waker.is_some())
            .finish()
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot that calls `wake` after each accepted frame, outside the slot lock
    pub fn with_waker(wake: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Mutex::default(),
            waker: Some(Box::new(wake)),
        }
    }

    /// Store a frame, replacing any frame not yet taken
    pub fn submit(&self, data: &[u8], width: u32, height: u32) -> Result<(), RendererError> {
        {
            let mut inner = self.inner.lock();
            if let Err(e) = inner.frame.assign(data, width, height) {
                inner.stats.rejected += 1;
                return Err(e);
            }
            if inner.pending {
                inner.stats.dropped += 1;
                log::trace!("Frame dropped, {} dropped so far", inner.stats.dropped);
            }
            inner.pending = true;
            inner.stats.submitted += 1;
        }
        if let Some(wake) = &self.waker {
            wake();
        }
        Ok(())
    }

    /// Move the pending frame into `dst`. Returns `false` when nothing new was submitted.
    pub fn take_latest(&self, dst: &mut I420Frame) -> bool {
        let mut inner = self.inner.lock();
        if !inner.pending {
            return false;
        }
        std::mem::swap(&mut inner.frame, dst);
        inner.pending = false;
        true
    }

    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending
    }

    pub fn stats(&self) -> SlotStats {
        self.inner.lock().stats
    }
}

/// Cloneable, thread-safe submission handle
#[derive(Debug, Clone, Default)]
pub struct FrameSubmitter {
    slot: Arc<FrameSlot>,
}

impl FrameSubmitter {
    pub fn new(slot: Arc<FrameSlot>) -> Self {
        Self { slot }
    }

    /// Submit one I420 frame of `width * height * 3 / 2` bytes
    pub fn submit(&self, data: &[u8], width: u32, height: u32) -> Result<(), RendererError> {
        self.slot.submit(data, width, height)
    }

    pub fn stats(&self) -> SlotStats {
        self.slot.stats()
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn frame_bytes(width: u32, height: u32, value: u8) -> Vec<u8> {
        vec![value; width as usize * height as usize * 3 / 2]
    }

    #[test]
    fn test_empty_slot_yields_nothing() {
        let slot = FrameSlot::new();
        let mut frame = I420Frame::new();
        assert!(!slot.take_latest(&mut frame));
        assert!(frame.planes().is_none());
    }

    #[test]
    fn test_latest_frame_wins() {
        let slot = FrameSlot::new();
        slot.submit(&frame_bytes(4, 4, 1), 4, 4).unwrap();
        slot.submit(&frame_bytes(4, 4, 2), 4, 4).unwrap();
        slot.submit(&frame_bytes(8, 2, 3), 8, 2).unwrap();

        let mut frame = I420Frame::new();
        assert!(slot.take_latest(&mut frame));
        assert_eq!(frame.dimensions(), (8, 2));
        assert!(frame.as_bytes().iter().all(|&b| b == 3));
        assert!(!slot.take_latest(&mut frame));

        let stats = slot.stats();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.dropped, 2);
    }

    #[test]
    fn test_invalid_frame_rejected_and_slot_untouched() {
        let slot = FrameSlot::new();
        slot.submit(&frame_bytes(4, 4, 7), 4, 4).unwrap();
        assert!(matches!(
            slot.submit(&[0u8; 10], 4, 4),
            Err(RendererError::InvalidFrameSize { .. })
        ));

        let mut frame = I420Frame::new();
        assert!(slot.take_latest(&mut frame));
        assert!(frame.as_bytes().iter().all(|&b| b == 7));
        assert_eq!(slot.stats().rejected, 1);
    }

    #[test]
    fn test_arena_reused_across_resolution_changes() {
        let slot = FrameSlot::new();
        let mut frame = I420Frame::new();
        let big = 1280 * 720 * 3 / 2;

        slot.submit(&frame_bytes(1280, 720, 1), 1280, 720).unwrap();
        slot.take_latest(&mut frame);
        slot.submit(&frame_bytes(1280, 720, 2), 1280, 720).unwrap();
        slot.take_latest(&mut frame);
        // Both arenas have now seen the largest frame
        slot.submit(&frame_bytes(640, 480, 3), 640, 480).unwrap();
        slot.take_latest(&mut frame);

        assert_eq!(frame.dimensions(), (640, 480));
        assert_eq!(frame.as_bytes().len(), 640 * 480 * 3 / 2);
        assert!(frame.capacity() >= big);
    }

    #[test]
    fn test_concurrent_submissions_are_never_torn() {
        let slot = Arc::new(FrameSlot::new());
        let done = Arc::new(AtomicBool::new(false));

        let producers: Vec<_> = (0..3u8)
            .map(|p| {
                let submitter = FrameSubmitter::new(slot.clone());
                std::thread::spawn(move || {
                    for i in 0..300u32 {
                        let value = (i as u8).wrapping_mul(3).wrapping_add(p);
                        // Alternate resolutions so sizes change mid-stream
                        let (w, h) = if i % 2 == 0 { (64, 48) } else { (32, 16) };
                        submitter.submit(&frame_bytes(w, h, value), w, h).unwrap();
                    }
                })
            })
            .collect();

        let consumer = {
            let slot = slot.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let mut frame = I420Frame::new();
                let mut seen = 0;
                while !done.load(Ordering::Acquire) || slot.has_pending() {
                    if slot.take_latest(&mut frame) {
                        let planes = frame.planes().expect("whole frame");
                        let first = frame.as_bytes()[0];
                        assert!(frame.as_bytes().iter().all(|&b| b == first));
                        let (w, h) = planes.dimensions();
                        assert_eq!(frame.as_bytes().len(), (w * h * 3 / 2) as usize);
                        seen += 1;
                    }
                }
                seen
            })
        };

        for p in producers {
            p.join().unwrap();
        }
        done.store(true, Ordering::Release);
        let seen = consumer.join().unwrap();

        let stats = slot.stats();
        assert_eq!(stats.submitted, 900);
        assert!(seen >= 1);
        assert_eq!(stats.submitted, seen + stats.dropped);
    }

    #[test]
    fn test_waker_runs_for_accepted_frames_only() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let slot = {
            let wakes = wakes.clone();
            FrameSlot::with_waker(move || {
                wakes.fetch_add(1, Ordering::SeqCst);
            })
        };

        slot.submit(&frame_bytes(4, 2, 1), 4, 2).unwrap();
        slot.submit(&frame_bytes(4, 2, 2), 4, 2).unwrap();
        assert_eq!(wakes.load(Ordering::SeqCst), 2);

        assert!(slot.submit(&[0u8; 5], 4, 2).is_err());
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
        assert_eq!(slot.stats().rejected, 1);
    }

    #[test]
    fn test_waker_can_read_slot() {
        // The waker runs after the lock is released
        let slot = Arc::new_cyclic(|weak: &std::sync::Weak<FrameSlot>| {
            let weak = weak.clone();
            FrameSlot::with_waker(move || {
                if let Some(slot) = weak.upgrade() {
                    assert!(slot.has_pending());
                }
            })
        });
        slot.submit(&frame_bytes(2, 2, 9), 2, 2).unwrap();
        assert_eq!(slot.stats().submitted, 1);
    }
}
