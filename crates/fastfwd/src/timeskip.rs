//! The one-shot time skip.
//!
//! A console command arms a pending skip amount; the next pass through the
//! hooked frame accumulator consumes it, advances both time globals by that
//! amount, and suppresses the original accumulation for that single frame.
//! Every later frame runs the original untouched.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::info;

use crate::error::Result;
use crate::globals::TimeGlobals;
use crate::memory::CodeWrite;

/// Skip amount handed from the command to the frame hook.
///
/// Stored as the bit pattern of an `f32` so the hand-off is a single atomic
/// word; the command thread and the frame thread never need a lock. Zero
/// bits double as "nothing pending" since skipping by 0.0 is a no-op
/// anyway.
#[derive(Debug, Default)]
pub struct PendingSkip(AtomicU32);

impl PendingSkip {
    pub fn new() -> Self {
        PendingSkip(AtomicU32::new(0))
    }

    /// Replace whatever is pending. Repeated commands before a frame runs
    /// overwrite, not accumulate, matching what the command prints.
    pub fn arm(&self, seconds: f32) {
        self.0.store(seconds.to_bits(), Ordering::Relaxed);
    }

    /// Current pending amount without consuming it.
    pub fn peek(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Take the pending amount, leaving none behind.
    fn take(&self) -> f32 {
        f32::from_bits(self.0.swap(0, Ordering::Relaxed))
    }
}

/// Frame-hook side of the skip: owns the resolved globals and decides, per
/// frame, whether to skip or to let the original accumulator run.
pub struct TimeSkip<M: CodeWrite> {
    memory: Arc<M>,
    pending: Arc<PendingSkip>,
    globals: TimeGlobals,
}

impl<M: CodeWrite> TimeSkip<M> {
    pub fn new(memory: Arc<M>, pending: Arc<PendingSkip>, globals: TimeGlobals) -> Self {
        TimeSkip {
            memory,
            pending,
            globals,
        }
    }

    pub fn pending(&self) -> &Arc<PendingSkip> {
        &self.pending
    }

    /// Runs in place of the engine's frame accumulator. `original` is the
    /// trampolined real accumulator; it must run on every frame that is
    /// not skipped or engine time stops advancing entirely.
    ///
    /// A non-positive armed value stays armed and keeps deferring to the
    /// original; it is inert rather than an error.
    pub fn on_frame(&self, dt: f32, original: impl FnOnce(f32)) -> Result<()> {
        if self.pending.peek() > 0.0 {
            let skip = self.pending.take();
            if skip > 0.0 {
                self.globals.realtime.add(&*self.memory, skip)?;
                self.globals.host_frametime.add(&*self.memory, skip)?;
                info!("skipped {skip} seconds");
                return Ok(());
            }
        }
        original(dt);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::globals::GlobalFloatSlot;
    use crate::memory::{CodeAddress, mock::MockImageBuilder};

    const BASE: CodeAddress = CodeAddress::new(0x40_0000);
    const REALTIME: CodeAddress = CodeAddress::new(0x40_0100);
    const FRAMETIME: CodeAddress = CodeAddress::new(0x40_0104);

    fn skip_under_test() -> (Arc<crate::memory::mock::MockImage>, TimeSkip<crate::memory::mock::MockImage>) {
        let img = Arc::new(
            MockImageBuilder::new(BASE, 0x1000)
                .write_f32(REALTIME, 100.0)
                .write_f32(FRAMETIME, 0.015)
                .build(),
        );
        let globals = TimeGlobals {
            realtime: GlobalFloatSlot::new(REALTIME),
            host_frametime: GlobalFloatSlot::new(FRAMETIME),
        };
        let skip = TimeSkip::new(img.clone(), Arc::new(PendingSkip::new()), globals);
        (img, skip)
    }

    #[test]
    fn test_armed_skip_advances_both_globals_once() {
        let (img, skip) = skip_under_test();
        skip.pending().arm(30.0);

        let ran = Cell::new(0u32);
        skip.on_frame(0.015, |_| ran.set(ran.get() + 1)).unwrap();
        // skipped frame: both globals moved, original suppressed
        assert_eq!(ran.get(), 0);
        assert_eq!(skip.globals.realtime.read(&*img).unwrap(), 130.0);
        assert_eq!(
            skip.globals.host_frametime.read(&*img).unwrap(),
            0.015f32 + 30.0
        );

        // next frame is back to normal
        skip.on_frame(0.015, |_| ran.set(ran.get() + 1)).unwrap();
        assert_eq!(ran.get(), 1);
        assert_eq!(skip.globals.realtime.read(&*img).unwrap(), 130.0);
    }

    #[test]
    fn test_unarmed_frame_runs_original_with_dt() {
        let (_img, skip) = skip_under_test();
        let seen = Cell::new(0.0f32);
        skip.on_frame(0.25, |dt| seen.set(dt)).unwrap();
        assert_eq!(seen.get(), 0.25);
    }

    #[test]
    fn test_non_positive_amount_is_inert() {
        let (img, skip) = skip_under_test();
        for amount in [0.0, -5.0] {
            skip.pending().arm(amount);
            let ran = Cell::new(false);
            skip.on_frame(0.015, |_| ran.set(true)).unwrap();
            assert!(ran.get(), "amount {amount} must not suppress the original");
            assert_eq!(skip.globals.realtime.read(&*img).unwrap(), 100.0);
        }
        // a negative amount stays armed until something overwrites it
        assert_eq!(skip.pending().peek(), -5.0);
    }

    #[test]
    fn test_rearming_overwrites() {
        let (img, skip) = skip_under_test();
        skip.pending().arm(10.0);
        skip.pending().arm(2.0);
        skip.on_frame(0.015, |_| {}).unwrap();
        assert_eq!(skip.globals.realtime.read(&*img).unwrap(), 102.0);
    }
}
