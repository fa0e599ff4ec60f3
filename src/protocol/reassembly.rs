//! Collects the parts of streamed responses.
//!
//! A server may answer one request with several frames sharing its tag; only
//! the last one has the final flag set. Parts are kept in arrival order until
//! the final part shows up, then the whole sequence is released at once.
use std::collections::HashMap;

use log::trace;

use super::Envelope;

#[derive(Debug, Default)]
pub struct ReassemblyTable {
    partial: HashMap<u64, Vec<Envelope>>,
}

impl ReassemblyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a part. Returns the completed sequence when `envelope` is final.
    pub fn accept(&mut self, envelope: Envelope) -> Option<Vec<Envelope>> {
        let tag = envelope.tag();
        let mut parts = self.partial.remove(&tag).unwrap_or_default();
        let is_final = envelope.is_final();
        parts.push(envelope);

        if is_final {
            trace!("tag {tag} complete with {} parts", parts.len());
            Some(parts)
        } else {
            self.partial.insert(tag, parts);
            None
        }
    }

    pub fn in_progress(&self, tag: u64) -> bool {
        self.partial.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.partial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partial.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(tag: u64, is_final: bool, marker: u8) -> Envelope {
        Envelope::new(tag, is_final, vec![marker])
    }

    #[test]
    fn single_part_passes_through() {
        let mut table = ReassemblyTable::new();
        let done = table.accept(part(1, true, 0)).unwrap();

        assert_eq!(done, vec![part(1, true, 0)]);
        assert!(table.is_empty());
    }

    #[test]
    fn parts_kept_in_arrival_order() {
        let mut table = ReassemblyTable::new();

        assert!(table.accept(part(5, false, 1)).is_none());
        assert!(table.accept(part(5, false, 2)).is_none());
        assert!(table.in_progress(5));

        let done = table.accept(part(5, true, 3)).unwrap();
        assert_eq!(
            done,
            vec![part(5, false, 1), part(5, false, 2), part(5, true, 3)]
        );
        assert!(!table.in_progress(5));
        assert!(table.is_empty());
    }

    #[test]
    fn interleaved_tags_stay_separate() {
        let mut table = ReassemblyTable::new();

        assert!(table.accept(part(1, false, 10)).is_none());
        assert!(table.accept(part(2, false, 20)).is_none());
        assert!(table.accept(part(1, false, 11)).is_none());
        assert_eq!(table.len(), 2);

        let two = table.accept(part(2, true, 21)).unwrap();
        assert_eq!(two, vec![part(2, false, 20), part(2, true, 21)]);

        let one = table.accept(part(1, true, 12)).unwrap();
        assert_eq!(
            one,
            vec![part(1, false, 10), part(1, false, 11), part(1, true, 12)]
        );
        assert!(table.is_empty());
    }
}
