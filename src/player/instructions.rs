//! Section handoff between the controller and the decoder thread
//!
//! The decoder holds the instructions lock for the whole time it decodes a
//! section. The controller can only rewrite the section once the decoder has
//! reached the end (or abandoned the section after a redirect request) and
//! released the lock, so a transition is never half applied.

use crate::utils::error::{Result, VobPlayerError};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// `end` value meaning "until the demuxer runs out of packets"
pub const END_OF_FILE: u64 = u64::MAX;

/// A contiguous byte range of the container to decode in one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// Byte offset the demuxer seeks to
    pub start: u64,

    /// The section ends once the byte position passes this offset
    pub end: u64,

    /// Skip video packets without decoding them
    pub audio_only: bool,
}

impl Section {
    /// Build a section, rejecting ranges that end before they start
    pub fn new(start: u64, end: u64, audio_only: bool) -> Result<Self> {
        if start > end {
            return Err(VobPlayerError::InvalidInput(format!(
                "section start {} is past its end {}",
                start, end
            )));
        }
        Ok(Self { start, end, audio_only })
    }

    /// A section that plays from `start` to the end of the file
    pub const fn to_end_of_file(start: u64, audio_only: bool) -> Self {
        Self { start, end: END_OF_FILE, audio_only }
    }

    pub fn runs_to_end_of_file(&self) -> bool {
        self.end == END_OF_FILE
    }
}

/// The active section plus the two handoff flags
pub struct PlaybackInstructions {
    /// Held by the decoder for the duration of a section
    section: Mutex<Section>,

    /// Signaled when the controller publishes a section or on shutdown
    published: Condvar,

    /// Set by the decoder when the section is finished and the lock is free
    end_reached: AtomicBool,

    /// Set by the controller to make the decoder abandon the current section
    redirect: AtomicBool,
}

impl PlaybackInstructions {
    pub fn new(initial: Section) -> Self {
        Self {
            section: Mutex::new(initial),
            published: Condvar::new(),
            end_reached: AtomicBool::new(false),
            redirect: AtomicBool::new(false),
        }
    }

    /// Acquire the instructions lock (decoder side)
    pub fn lock(&self) -> MutexGuard<'_, Section> {
        self.section.lock()
    }

    /// Whether the locked section is fresh and should be decoded
    pub fn ready_to_decode(&self) -> bool {
        !self.end_reached() && !self.redirect_requested()
    }

    /// Release the lock until the controller publishes or `timeout` passes
    pub fn wait_for_update(&self, guard: &mut MutexGuard<'_, Section>, timeout: Duration) {
        self.published.wait_for(guard, timeout);
    }

    /// Mark the section finished; the caller releases the lock right after
    pub fn mark_end_reached(&self) {
        self.end_reached.store(true, Ordering::Release);
    }

    pub fn end_reached(&self) -> bool {
        self.end_reached.load(Ordering::Acquire)
    }

    pub fn redirect_requested(&self) -> bool {
        self.redirect.load(Ordering::Acquire)
    }

    /// Publish a new section (controller side)
    ///
    /// Raises the redirect flag so a decoder in the middle of a section lets
    /// go of the lock, then waits at most `watchdog` for it. On success the
    /// new fields are written together, both flags are cleared and the
    /// decoder is woken.
    pub fn retarget(&self, next: Section, watchdog: Duration) -> Result<()> {
        self.redirect.store(true, Ordering::Release);

        let Some(mut section) = self.section.try_lock_for(watchdog) else {
            self.redirect.store(false, Ordering::Release);
            return Err(VobPlayerError::Sync(format!(
                "decoder did not release playback instructions within {:?}",
                watchdog
            )));
        };

        *section = next;
        self.end_reached.store(false, Ordering::Release);
        self.redirect.store(false, Ordering::Release);
        drop(section);

        self.published.notify_all();
        Ok(())
    }

    /// Wake a decoder idling between sections, used on shutdown
    pub fn wake(&self) {
        self.published.notify_all();
    }

    /// Copy of the current section; blocks while a section is decoding
    pub fn current(&self) -> Section {
        *self.section.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_section_rejects_inverted_range() {
        assert!(Section::new(10, 5, false).is_err());
        assert!(Section::new(5, 5, true).is_ok());
        assert!(Section::to_end_of_file(0, false).runs_to_end_of_file());
    }

    #[test]
    fn test_retarget_after_end_publishes_all_fields() {
        let instructions = PlaybackInstructions::new(Section::new(0, 100, false).unwrap());
        instructions.mark_end_reached();
        assert!(!instructions.ready_to_decode());

        let next = Section::new(4096, 8192, true).unwrap();
        instructions.retarget(next, Duration::from_millis(100)).unwrap();

        assert!(instructions.ready_to_decode());
        assert_eq!(instructions.current(), next);
    }

    #[test]
    fn test_retarget_times_out_while_section_is_held() {
        let instructions = Arc::new(PlaybackInstructions::new(Section::to_end_of_file(0, false)));
        let guard = instructions.lock();

        let result = {
            let instructions = Arc::clone(&instructions);
            thread::spawn(move || {
                instructions.retarget(Section::to_end_of_file(2048, true), Duration::from_millis(30))
            })
            .join()
            .unwrap()
        };
        drop(guard);

        assert!(matches!(result, Err(VobPlayerError::Sync(_))));
        assert!(!instructions.redirect_requested());
        assert_eq!(instructions.current().start, 0);
    }

    #[test]
    fn test_redirect_flag_visible_to_lock_holder() {
        let instructions = Arc::new(PlaybackInstructions::new(Section::to_end_of_file(0, false)));
        let mut guard = instructions.lock();

        let controller = {
            let instructions = Arc::clone(&instructions);
            thread::spawn(move || {
                instructions.retarget(Section::to_end_of_file(2048, true), Duration::from_secs(5))
            })
        };

        // Decoder side: notice the request, give up the section
        let deadline = Instant::now() + Duration::from_secs(5);
        while !instructions.redirect_requested() {
            assert!(Instant::now() < deadline);
            thread::yield_now();
        }
        instructions.mark_end_reached();
        instructions.wait_for_update(&mut guard, Duration::from_secs(5));
        assert_eq!(guard.start, 2048);
        drop(guard);

        controller.join().unwrap().unwrap();
        assert!(instructions.ready_to_decode());
    }
}
