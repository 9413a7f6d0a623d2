use crate::{ingestion_cursors, ingestion_streams};

impl ingestion_cursors::Model {
    /// The cursor this row represents, as a comparable (block, log_index) pair.
    pub fn validated_cursor(&self) -> (u64, u32) {
        (self.cursor_height.max(0) as u64, self.cursor_log_index.max(0) as u32)
    }
}

impl ingestion_streams::Model {
    pub fn validated_start_block(&self) -> u64 {
        self.start_block.max(0) as u64
    }
}
