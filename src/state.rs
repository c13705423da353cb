use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::engine::EditEngine;

/// Centralized state shared across the edit loop, audio, and UI.
pub struct AppState {
    /// Harmonic model and working buffer. Locked by the UI to edit and by
    /// the edit loop once per tick.
    pub engine: Mutex<EditEngine>,

    /// What the audio callback plays.
    pub playback: Arc<Playback>,

    /// Set when the application is closing.
    pub shutdown: AtomicBool,
}

impl AppState {
    pub fn new(engine: EditEngine) -> Arc<Self> {
        let playback = engine.playback();
        Arc::new(Self {
            engine: Mutex::new(engine),
            playback,
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn with_engine<R>(&self, f: impl FnOnce(&mut EditEngine) -> R) -> R {
        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut engine)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// An immutable rendering handed from the edit engine to the audio callback.
#[derive(Debug, Clone)]
pub struct LoopBuffer {
    pub samples: Vec<f32>,
    /// Number of leading samples holding a whole number of periods.
    pub loop_len: usize,
    pub generation: u64,
    /// Bumped whenever the playback cursor must be re-based.
    pub epoch: u64,
    /// Cursor the rendering was phase-aligned to, or `None` to start over
    /// from sample 0.
    pub anchor: Option<usize>,
}

impl LoopBuffer {
    pub fn silent(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
            loop_len: len,
            generation: 0,
            epoch: 0,
            anchor: None,
        }
    }
}

/// Handoff point between the edit engine and the audio callback.
///
/// The engine swaps in a complete `LoopBuffer` under a short lock. The
/// audio callback only ever `try_lock`s and keeps playing the snapshot it
/// already holds when the slot is busy.
///
/// Replaced snapshots are parked in `retired` until the callback has let
/// go of them, so buffers are only ever freed on the publishing side.
#[derive(Debug)]
pub struct Playback {
    slot: Mutex<Arc<LoopBuffer>>,
    retired: Mutex<Vec<Arc<LoopBuffer>>>,
    generation: AtomicU64,
    /// Audio cursor packed with the epoch of the buffer it indexes.
    position: AtomicU64,
    playing: AtomicBool,
    clipping: AtomicBool,
}

/// Where the audio callback is: a sample index into the buffer of `epoch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub epoch: u64,
    pub cursor: usize,
}

impl Position {
    const CURSOR_BITS: u32 = 32;
    const CURSOR_MASK: u64 = (1 << Self::CURSOR_BITS) - 1;

    fn pack(self) -> u64 {
        (self.epoch << Self::CURSOR_BITS) | (self.cursor as u64 & Self::CURSOR_MASK)
    }

    fn unpack(packed: u64) -> Self {
        Self {
            epoch: packed >> Self::CURSOR_BITS,
            cursor: (packed & Self::CURSOR_MASK) as usize,
        }
    }

    /// Whether this position refers to the buffer published under `epoch`.
    /// Only the low bits of the epoch survive packing.
    pub fn is_in(self, epoch: u64) -> bool {
        self.epoch == epoch & (u64::MAX >> Self::CURSOR_BITS)
    }
}

impl Playback {
    pub fn new(len: usize) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Arc::new(LoopBuffer::silent(len))),
            retired: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            position: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            clipping: AtomicBool::new(false),
        })
    }

    /// Publishes a new rendering. Returns its generation.
    pub fn publish(&self, samples: &[f32], loop_len: usize, epoch: u64, anchor: Option<usize>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let mut buffer = Arc::new(LoopBuffer {
            samples: samples.to_vec(),
            loop_len: loop_len.min(samples.len()),
            generation,
            epoch,
            anchor,
        });

        {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::swap(&mut *slot, &mut buffer);
        }
        self.retire(buffer);
        generation
    }

    /// Keeps `replaced` alive while the audio callback may still hold it,
    /// and frees the snapshots it has since let go of.
    fn retire(&self, replaced: Arc<LoopBuffer>) {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        retired.push(replaced);
        retired.retain(|buffer| Arc::strong_count(buffer) > 1);
    }

    /// Latest published rendering. Blocks briefly; not for the audio thread.
    pub fn latest(&self) -> Arc<LoopBuffer> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Latest published rendering, or `None` if a publish is in flight.
    pub fn try_latest(&self) -> Option<Arc<LoopBuffer>> {
        self.slot.try_lock().ok().map(|slot| Arc::clone(&slot))
    }

    pub fn position(&self) -> Position {
        Position::unpack(self.position.load(Ordering::Acquire))
    }

    pub fn cursor(&self) -> usize {
        self.position().cursor
    }

    pub fn store_position(&self, epoch: u64, cursor: usize) {
        self.position.store(Position { epoch, cursor }.pack(), Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn is_clipping(&self) -> bool {
        self.clipping.load(Ordering::Relaxed)
    }

    pub fn set_clipping(&self, clipping: bool) {
        self.clipping.store(clipping, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_bumps_generation() {
        let playback = Playback::new(8);
        assert_eq!(playback.latest().generation, 0);

        let generation = playback.publish(&[0.5; 8], 6, 1, Some(3));
        assert_eq!(generation, 1);

        let latest = playback.latest();
        assert_eq!(latest.samples, vec![0.5; 8]);
        assert_eq!(latest.loop_len, 6);
        assert_eq!(latest.epoch, 1);
        assert_eq!(latest.anchor, Some(3));
    }

    #[test]
    fn loop_len_never_exceeds_the_samples() {
        let playback = Playback::new(4);
        playback.publish(&[0.0; 4], 10, 0, None);
        assert_eq!(playback.latest().loop_len, 4);
    }

    #[test]
    fn generations_keep_counting_across_publishes() {
        let playback = Playback::new(4);
        assert_eq!(playback.publish(&[0.0; 4], 4, 0, None), 1);
        assert_eq!(playback.publish(&[0.0; 4], 4, 0, None), 2);
        assert_eq!(playback.latest().generation, 2);
    }

    #[test]
    fn replaced_buffers_outlive_the_audio_reference() {
        let playback = Playback::new(4);
        playback.publish(&[0.25; 4], 4, 1, None);
        let held_by_audio = playback.try_latest().unwrap();
        let watch = Arc::downgrade(&held_by_audio);

        playback.publish(&[0.5; 4], 4, 1, None);
        playback.publish(&[0.75; 4], 4, 1, None);

        // The callback moving on must not free the old samples itself
        drop(held_by_audio);
        assert!(watch.upgrade().is_some());

        // The next publish releases it on the publishing side
        playback.publish(&[1.0; 4], 4, 1, None);
        assert!(watch.upgrade().is_none());
    }

    #[test]
    fn retired_buffers_are_not_kept_forever() {
        let playback = Playback::new(4);
        for _ in 0..10 {
            playback.publish(&[0.0; 4], 4, 0, None);
        }
        assert!(playback.retired.lock().unwrap().is_empty());
    }

    #[test]
    fn position_keeps_cursor_and_epoch_together() {
        let playback = Playback::new(4);
        assert_eq!(playback.position(), Position { epoch: 0, cursor: 0 });

        playback.store_position(7, 4321);
        let position = playback.position();
        assert_eq!(position, Position { epoch: 7, cursor: 4321 });
        assert!(position.is_in(7));
        assert!(!position.is_in(6));
        assert_eq!(playback.cursor(), 4321);
    }

    #[test]
    fn try_latest_gives_up_while_publishing() {
        let playback = Playback::new(4);
        let guard = playback.slot.lock().unwrap();
        assert!(playback.try_latest().is_none());
        drop(guard);
        assert!(playback.try_latest().is_some());
    }
}
