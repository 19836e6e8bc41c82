//! Audio buffer pool (spec §3 `AudioBuffer`/`AudioBufferList`, §4.5, §5):
//! a fixed-capacity ring of fixed-size byte buffers shared between the
//! decode-producer and playback-consumer threads.

/// Lifecycle status of one pool slot, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStatus {
    Empty,
    Assigned,
    Buffering,
    Continue,
    Buffered,
    Loaded,
    Finished,
    Playing,
    Draining,
    Played,
}

/// Coarse fill-level classification used by the engine's watermark logic
/// (spec §4.5, `BufferingConfig`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillLevel {
    Empty,
    Low,
    Half,
    High,
    Full,
}

/// One pool slot: a fixed-capacity byte buffer plus its read/write cursors.
///
/// Invariant: `read <= written <= data.len()` always holds.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub data: Vec<u8>,
    pub written: usize,
    pub read: usize,
    pub status: BufferStatus,
    /// Monotonically increasing allocation key, assigned when a buffer
    /// transitions out of `Empty`; used to detect stale buffer handles after
    /// a stream reopen (spec §4.5 "reopen-on-stream-change").
    pub allocation_key: u64,
    /// Track-local sequence number, for ordering buffers within one track.
    pub sequence: u64,
    /// `file_hash` of the owning `Track`, per spec §3. `None` while `Empty`.
    pub owner_file_hash: Option<String>,
}

impl AudioBuffer {
    pub fn new(capacity: usize) -> Self {
        AudioBuffer {
            data: vec![0u8; capacity],
            written: 0,
            read: 0,
            status: BufferStatus::Empty,
            allocation_key: 0,
            sequence: 0,
            owner_file_hash: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn unread(&self) -> usize {
        self.written - self.read
    }

    pub fn is_full(&self) -> bool {
        self.written == self.data.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.read == self.written
    }

    /// Appends `bytes`, truncating at capacity. Returns the number of bytes
    /// actually written.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let space = self.data.len() - self.written;
        let n = bytes.len().min(space);
        self.data[self.written..self.written + n].copy_from_slice(&bytes[..n]);
        self.written += n;
        debug_assert!(self.read <= self.written && self.written <= self.data.len());
        n
    }

    /// Consumes up to `max_len` unread bytes, advancing the read cursor.
    pub fn consume(&mut self, max_len: usize) -> &[u8] {
        let n = self.unread().min(max_len);
        let start = self.read;
        self.read += n;
        debug_assert!(self.read <= self.written);
        &self.data[start..start + n]
    }

    pub fn reset(&mut self) {
        self.written = 0;
        self.read = 0;
        self.status = BufferStatus::Empty;
    }

    pub fn fill_level(&self) -> FillLevel {
        if self.data.is_empty() {
            return FillLevel::Empty;
        }
        let ratio = self.written as f64 / self.data.len() as f64;
        if ratio <= 0.0 {
            FillLevel::Empty
        } else if ratio < 0.25 {
            FillLevel::Low
        } else if ratio < 0.5 {
            FillLevel::Half
        } else if ratio < 1.0 {
            FillLevel::High
        } else {
            FillLevel::Full
        }
    }
}

/// A fixed-size ring of [`AudioBuffer`] slots, recycled between tracks
/// (spec §5: a bounded producer/consumer buffer pool, no per-track
/// allocation).
pub struct AudioBufferList {
    slots: Vec<AudioBuffer>,
    next_allocation_key: u64,
}

impl AudioBufferList {
    pub fn new(count: usize, buffer_size: usize) -> Self {
        AudioBufferList {
            slots: (0..count).map(|_| AudioBuffer::new(buffer_size)).collect(),
            next_allocation_key: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> &AudioBuffer {
        &self.slots[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut AudioBuffer {
        &mut self.slots[index]
    }

    /// Finds the first slot in `Empty` status and assigns it a fresh
    /// allocation key and owner, transitioning it to `Assigned`. Returns its
    /// index.
    pub fn allocate(&mut self, owner_file_hash: &str) -> Option<usize> {
        let index = self.slots.iter().position(|b| b.status == BufferStatus::Empty)?;
        let key = self.next_allocation_key;
        self.next_allocation_key += 1;
        let buffer = &mut self.slots[index];
        buffer.reset();
        buffer.status = BufferStatus::Assigned;
        buffer.allocation_key = key;
        buffer.owner_file_hash = Some(owner_file_hash.to_string());
        Some(index)
    }

    /// Finds the next slot ready for playback: the lowest-sequence buffer
    /// currently in `Buffered` or `Loaded` status.
    pub fn find_next_playable(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, b)| matches!(b.status, BufferStatus::Buffered | BufferStatus::Loaded))
            .min_by_key(|(_, b)| b.sequence)
            .map(|(i, _)| i)
    }

    /// As [`find_next_playable`], but scoped to buffers owned by `file_hash`
    /// (spec §3: the pool must be able to find the next playable buffer
    /// "for song X", not just the pool-wide lowest sequence).
    pub fn find_next_playable_for(&self, file_hash: &str) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, b)| b.owner_file_hash.as_deref() == Some(file_hash))
            .filter(|(_, b)| matches!(b.status, BufferStatus::Buffered | BufferStatus::Loaded))
            .min_by_key(|(_, b)| b.sequence)
            .map(|(i, _)| i)
    }

    /// Locates the buffer containing absolute byte offset `absolute_byte`
    /// of song `file_hash`, by summing `written` bytes across that song's
    /// buffers in allocation (sequence) order (spec §3, §4.5 `PositionPercent`).
    /// Returns `(buffer_index, local_offset)`.
    pub fn find_seek_buffer(&self, file_hash: &str, absolute_byte: u64) -> Option<(usize, usize)> {
        let mut owned: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, b)| b.owner_file_hash.as_deref() == Some(file_hash))
            .filter(|(_, b)| b.status != BufferStatus::Empty)
            .map(|(i, _)| i)
            .collect();
        owned.sort_by_key(|&i| self.slots[i].sequence);

        let mut consumed: u64 = 0;
        for index in owned {
            let written = self.slots[index].written as u64;
            if absolute_byte < consumed + written {
                return Some((index, (absolute_byte - consumed) as usize));
            }
            consumed += written;
        }
        None
    }

    /// Repositions the buffer pool around a seek target within song
    /// `file_hash`: buffers before `target_index` (in sequence order) are
    /// released, `target_index`'s read cursor is set to `local_offset` and
    /// it becomes `Playing`, and everything after stays `Loaded` (spec §4.5).
    pub fn reposition_for_seek(&mut self, file_hash: &str, target_index: usize, local_offset: usize) {
        let mut owned: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, b)| b.owner_file_hash.as_deref() == Some(file_hash))
            .filter(|(_, b)| b.status != BufferStatus::Empty)
            .map(|(i, _)| i)
            .collect();
        owned.sort_by_key(|&i| self.slots[i].sequence);

        for index in owned {
            if index == target_index {
                let buffer = &mut self.slots[index];
                buffer.read = local_offset;
                buffer.status = BufferStatus::Playing;
            } else if self.slots[index].sequence < self.slots[target_index].sequence {
                self.release(index);
            } else {
                self.slots[index].status = BufferStatus::Loaded;
            }
        }
    }

    /// Releases every slot owned by `file_hash`, forcing the producer to
    /// refill from a fresh decoder position (used when a seek target falls
    /// outside the currently-buffered window).
    pub fn release_owned(&mut self, file_hash: &str) {
        let owned: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, b)| b.owner_file_hash.as_deref() == Some(file_hash))
            .map(|(i, _)| i)
            .collect();
        for index in owned {
            self.release(index);
        }
    }

    pub fn count_by_status(&self, status: BufferStatus) -> usize {
        self.slots.iter().filter(|b| b.status == status).count()
    }

    /// Returns every slot not currently `Empty`, for underrun diagnostics.
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|b| b.status != BufferStatus::Empty).count()
    }

    /// Releases a finished slot back to `Empty` for reuse.
    pub fn release(&mut self, index: usize) {
        let buffer = &mut self.slots[index];
        buffer.reset();
        buffer.owner_file_hash = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_and_consume_respect_read_le_written_le_size() {
        let mut buf = AudioBuffer::new(8);
        let n = buf.fill(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(n, 8);
        assert!(buf.read <= buf.written && buf.written <= buf.data.len());
        let consumed = buf.consume(3).to_vec();
        assert_eq!(consumed, vec![1, 2, 3]);
        assert!(buf.read <= buf.written && buf.written <= buf.data.len());
    }

    #[test]
    fn allocate_assigns_monotonic_keys_and_skips_occupied_slots() {
        let mut pool = AudioBufferList::new(2, 16);
        let a = pool.allocate("song-a").unwrap();
        let b = pool.allocate("song-a").unwrap();
        assert_ne!(a, b);
        assert!(pool.allocate("song-a").is_none());
        assert_eq!(pool.get(a).allocation_key, 1);
        assert_eq!(pool.get(b).allocation_key, 2);
    }

    #[test]
    fn find_next_playable_prefers_lowest_sequence() {
        let mut pool = AudioBufferList::new(2, 16);
        let a = pool.allocate("song-a").unwrap();
        let b = pool.allocate("song-a").unwrap();
        pool.get_mut(a).status = BufferStatus::Buffered;
        pool.get_mut(a).sequence = 5;
        pool.get_mut(b).status = BufferStatus::Buffered;
        pool.get_mut(b).sequence = 1;
        assert_eq!(pool.find_next_playable(), Some(b));
    }

    #[test]
    fn find_next_playable_for_ignores_other_songs() {
        let mut pool = AudioBufferList::new(2, 16);
        let a = pool.allocate("song-a").unwrap();
        let b = pool.allocate("song-b").unwrap();
        pool.get_mut(a).status = BufferStatus::Buffered;
        pool.get_mut(a).sequence = 1;
        pool.get_mut(b).status = BufferStatus::Buffered;
        pool.get_mut(b).sequence = 0;
        assert_eq!(pool.find_next_playable_for("song-a"), Some(a));
        assert_eq!(pool.find_next_playable_for("song-b"), Some(b));
        assert_eq!(pool.find_next_playable_for("song-c"), None);
    }

    #[test]
    fn find_seek_buffer_locates_byte_across_buffers() {
        let mut pool = AudioBufferList::new(2, 16);
        let a = pool.allocate("song-a").unwrap();
        let b = pool.allocate("song-a").unwrap();
        pool.get_mut(a).sequence = 0;
        pool.get_mut(a).fill(&[0u8; 10]);
        pool.get_mut(b).sequence = 1;
        pool.get_mut(b).fill(&[0u8; 10]);

        assert_eq!(pool.find_seek_buffer("song-a", 5), Some((a, 5)));
        assert_eq!(pool.find_seek_buffer("song-a", 12), Some((b, 2)));
        assert_eq!(pool.find_seek_buffer("song-a", 25), None);
        assert_eq!(pool.find_seek_buffer("song-b", 0), None);
    }

    #[test]
    fn reposition_for_seek_releases_earlier_and_loads_later() {
        let mut pool = AudioBufferList::new(3, 16);
        let a = pool.allocate("song-a").unwrap();
        let b = pool.allocate("song-a").unwrap();
        let c = pool.allocate("song-a").unwrap();
        pool.get_mut(a).sequence = 0;
        pool.get_mut(a).fill(&[0u8; 10]);
        pool.get_mut(b).sequence = 1;
        pool.get_mut(b).fill(&[0u8; 10]);
        pool.get_mut(c).sequence = 2;
        pool.get_mut(c).fill(&[0u8; 10]);

        pool.reposition_for_seek("song-a", b, 3);

        assert_eq!(pool.get(a).status, BufferStatus::Empty);
        assert_eq!(pool.get(b).status, BufferStatus::Playing);
        assert_eq!(pool.get(b).read, 3);
        assert_eq!(pool.get(c).status, BufferStatus::Loaded);
    }

    #[test]
    fn release_owned_frees_only_matching_song() {
        let mut pool = AudioBufferList::new(2, 16);
        let a = pool.allocate("song-a").unwrap();
        let b = pool.allocate("song-b").unwrap();
        pool.release_owned("song-a");
        assert_eq!(pool.get(a).status, BufferStatus::Empty);
        assert_ne!(pool.get(b).status, BufferStatus::Empty);
    }

    #[test]
    fn release_returns_slot_to_empty() {
        let mut pool = AudioBufferList::new(1, 16);
        let idx = pool.allocate("song-a").unwrap();
        pool.get_mut(idx).status = BufferStatus::Played;
        pool.release(idx);
        assert_eq!(pool.get(idx).status, BufferStatus::Empty);
        assert!(pool.allocate("song-a").is_some());
    }

    #[test]
    fn fill_level_buckets_by_ratio() {
        let mut buf = AudioBuffer::new(100);
        assert_eq!(buf.fill_level(), FillLevel::Empty);
        buf.fill(&vec![0u8; 10]);
        assert_eq!(buf.fill_level(), FillLevel::Low);
        buf.fill(&vec![0u8; 90]);
        assert_eq!(buf.fill_level(), FillLevel::Full);
    }
}
