use bytes::Bytes;

use crate::frame::FrameKind;

/// Find the LAST offset in `data` at which any head pattern occurs.
///
/// Empty patterns never match. Returns `None` when no pattern occurs.
pub fn find_last_head(heads: &[Bytes], data: &[u8]) -> Option<usize> {
    heads
        .iter()
        .filter(|head| !head.is_empty() && head.len() <= data.len())
        .filter_map(|head| data.windows(head.len()).rposition(|w| w == head.as_ref()))
        .max()
}

/// Whether `data` begins with one of `heads`.
pub fn starts_with_head(heads: &[Bytes], data: &[u8]) -> bool {
    heads
        .iter()
        .any(|head| !head.is_empty() && data.starts_with(head))
}

/// Length of the longest suffix of `data` that is a proper prefix of some head.
///
/// Such a suffix may be the beginning of a head whose remaining bytes have not
/// arrived yet.
pub fn partial_head_suffix<'a>(
    heads: impl IntoIterator<Item = &'a Bytes>,
    data: &[u8],
) -> usize {
    let mut best = 0;
    for head in heads {
        let longest = head.len().saturating_sub(1).min(data.len());
        for len in (best + 1..=longest).rev() {
            if data.ends_with(&head[..len]) {
                best = len;
                break;
            }
        }
    }
    best
}

/// Response and request head sets, searched in that order of priority.
#[derive(Debug, Clone, Default)]
pub struct HeadSet {
    response: Vec<Bytes>,
    request: Vec<Bytes>,
    shortest: usize,
    longest: usize,
}

impl HeadSet {
    pub fn new(response: Vec<Bytes>, request: Vec<Bytes>) -> Self {
        let shortest = response
            .iter()
            .chain(request.iter())
            .map(Bytes::len)
            .filter(|len| *len > 0)
            .min()
            .unwrap_or(0);
        let longest = response
            .iter()
            .chain(request.iter())
            .map(Bytes::len)
            .max()
            .unwrap_or(0);
        Self {
            response,
            request,
            shortest,
            longest,
        }
    }

    pub fn response(&self) -> &[Bytes] {
        &self.response
    }

    pub fn request(&self) -> &[Bytes] {
        &self.request
    }

    /// Whether any head pattern is configured.
    pub fn is_empty(&self) -> bool {
        self.shortest == 0
    }

    /// Length of the shortest configured pattern.
    pub fn shortest(&self) -> usize {
        self.shortest
    }

    /// Length of the longest configured pattern.
    pub fn longest(&self) -> usize {
        self.longest
    }

    /// Classify a head starting at the beginning of `data`. Response heads win.
    pub fn classify(&self, data: &[u8]) -> Option<FrameKind> {
        if starts_with_head(&self.response, data) {
            Some(FrameKind::Response)
        } else if starts_with_head(&self.request, data) {
            Some(FrameKind::Request)
        } else {
            None
        }
    }

    /// First head of either kind at or after `from`.
    pub fn next_marker(&self, data: &[u8], from: usize) -> Option<(usize, FrameKind)> {
        (from..data.len())
            .find_map(|offset| self.classify(&data[offset..]).map(|kind| (offset, kind)))
    }

    /// Longest buffer suffix that could still grow into a head of either kind.
    pub fn partial_suffix(&self, data: &[u8]) -> usize {
        partial_head_suffix(self.response.iter().chain(self.request.iter()), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heads(patterns: &[&[u8]]) -> Vec<Bytes> {
        patterns.iter().map(|p| Bytes::copy_from_slice(p)).collect()
    }

    #[test]
    fn last_occurrence_wins() {
        let h = heads(&[&[0xAA, 0x55]]);
        let data = [0xAA, 0x55, 0x01, 0xAA, 0x55, 0x03];
        assert_eq!(find_last_head(&h, &data), Some(3));
    }

    #[test]
    fn last_occurrence_across_patterns() {
        let h = heads(&[&[0xAA, 0x55], &[0xBB]]);
        let data = [0xBB, 0x00, 0xAA, 0x55, 0x00, 0xBB, 0x01];
        assert_eq!(find_last_head(&h, &data), Some(5));
    }

    #[test]
    fn no_match_and_empty_patterns() {
        let h = heads(&[&[], &[0xAA, 0x55]]);
        assert_eq!(find_last_head(&h, &[0x01, 0xAA]), None);
        assert_eq!(find_last_head(&[], &[0x01]), None);
        assert_eq!(find_last_head(&h, &[]), None);
    }

    #[test]
    fn partial_suffix_detection() {
        let h = heads(&[&[0xAA, 0x55, 0x77]]);
        assert_eq!(partial_head_suffix(&h, &[0x01, 0xAA]), 1);
        assert_eq!(partial_head_suffix(&h, &[0x01, 0xAA, 0x55]), 2);
        assert_eq!(partial_head_suffix(&h, &[0xAA, 0x55, 0x77]), 0);
        assert_eq!(partial_head_suffix(&h, &[0x01, 0x02]), 0);
    }

    #[test]
    fn response_heads_take_priority() {
        let set = HeadSet::new(heads(&[&[0xAA]]), heads(&[&[0xAA, 0x01], &[0xBB]]));
        assert_eq!(set.classify(&[0xAA, 0x01]), Some(FrameKind::Response));
        assert_eq!(set.classify(&[0xBB, 0x01]), Some(FrameKind::Request));
        assert_eq!(set.classify(&[0x01]), None);
        assert_eq!(set.shortest(), 1);
    }

    #[test]
    fn next_marker_scans_both_kinds() {
        let set = HeadSet::new(heads(&[&[0xAA, 0x55]]), heads(&[&[0xBB, 0x66]]));
        let data = [0x00, 0xBB, 0x66, 0x01, 0xAA, 0x55];
        assert_eq!(set.next_marker(&data, 0), Some((1, FrameKind::Request)));
        assert_eq!(set.next_marker(&data, 2), Some((4, FrameKind::Response)));
        assert!(HeadSet::default().is_empty());
    }
}
