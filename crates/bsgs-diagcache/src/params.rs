/// The one view of the encryption parameters the cache needs: how many slots
/// a ciphertext has. The baby-step and giant-step index tables both have
/// `ceil(sqrt(slot_count))` entries.
pub trait SlotCount {
    fn slot_count(&self) -> usize;

    fn index_table_len(&self) -> usize {
        index_table_len(self.slot_count())
    }
}

/// Plain parameter holder for callers that don't carry a full scheme object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemeParams {
    pub slot_count: usize,
}

impl SchemeParams {
    pub fn new(slot_count: usize) -> Self {
        Self { slot_count }
    }
}

impl SlotCount for SchemeParams {
    fn slot_count(&self) -> usize {
        self.slot_count
    }
}

/// `ceil(sqrt(slot_count))`, exact for every `usize`.
pub fn index_table_len(slot_count: usize) -> usize {
    if slot_count == 0 {
        return 0;
    }

    let mut root = (slot_count as f64).sqrt() as usize;
    // Correct for float rounding in either direction.
    while root > 0 && square_at_least(root - 1, slot_count) {
        root -= 1;
    }
    while !square_at_least(root, slot_count) {
        root += 1;
    }
    root
}

fn square_at_least(root: usize, n: usize) -> bool {
    root.checked_mul(root).map_or(true, |sq| sq >= n)
}
