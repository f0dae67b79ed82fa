//! Correlation between local track ids and MPD song ids

/// Ordered `(local id, mpd id)` pairs, parallel to the MPD playlist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    entries: Vec<(String, u32)>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair at playlist position `idx` (clamped to the end)
    pub fn store_ids(&mut self, local_id: impl Into<String>, mpd_id: u32, idx: usize) {
        let idx = idx.min(self.entries.len());
        self.entries.insert(idx, (local_id.into(), mpd_id));
    }

    pub fn to_mpd(&self, local_id: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(local, _)| local == local_id)
            .map(|(_, mpd)| *mpd)
    }

    pub fn to_local(&self, mpd_id: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, mpd)| *mpd == mpd_id)
            .map(|(local, _)| local.as_str())
    }

    /// Drop `del` pairs starting at `idx`
    pub fn remove_range(&mut self, idx: usize, del: usize) {
        let start = idx.min(self.entries.len());
        let end = idx.saturating_add(del).min(self.entries.len());
        self.entries.drain(start..end);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
