//! Chunk planning for multipart uploads.
//!
//! A [`ChunkPlan`] partitions `[0, total_size)` into fixed-size chunks, one
//! per upload part. The count is exact — `(total_size - 1) / chunk_size + 1`
//! parts for a non-empty file — and an empty file maps to a single empty
//! part so the multipart session still completes normally.

/// Fixed chunk size for multipart uploads: 50 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 52_428_800;

/// One byte range of the master archive, destined for one upload part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based part number, strictly increasing across the plan.
    pub part_number: i32,
    /// Byte offset into the source file.
    pub offset: u64,
    /// Byte length; equals the chunk size for every part except possibly the
    /// last.
    pub length: u64,
}

/// A partition of `[0, total_size)` into upload parts.
#[derive(Clone, Copy, Debug)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// Plan chunks for a file of `total_size` bytes.
    ///
    /// # Panics
    /// `chunk_size` must be non-zero; configuration validation enforces this
    /// before a plan is ever built.
    #[must_use]
    pub fn new(total_size: u64, chunk_size: u64) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self { total_size, chunk_size }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of parts the upload will have. Never zero: an empty file still
    /// uploads one empty part.
    #[must_use]
    pub fn chunk_count(&self) -> u64 {
        match self.total_size {
            0 => 1,
            n => (n - 1) / self.chunk_size + 1,
        }
    }

    /// The chunks, in ascending part-number order.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.chunk_count()).map(|index| {
            let offset = index * self.chunk_size;
            Chunk {
                part_number: (index + 1) as i32,
                offset,
                length: self.chunk_size.min(self.total_size - offset),
            }
        })
    }
}
