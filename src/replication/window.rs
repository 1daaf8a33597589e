//! Page window over the fetched log stream
//!
//! Holds a bounded batch of raw log pages fetched from the source in one
//! round trip and serves byte-exact reads that cross page-body boundaries,
//! re-fetching the next batch transparently when the window is exhausted.
//! Every page is checksum-verified before any record on it is interpreted.
//!
//! The cursor only moves forward. The single exception is `restart_at`,
//! used by the caught-up loop to re-read the end-of-log sentinel in place
//! after the source has had time to extend the log.

use std::sync::Arc;

use super::errors::{ReplayError, ReplayResult};
use super::traits::{PageBatch, PageSource};
use crate::observability::PumpMetrics;
use crate::wal::{align_up, LogAddress, LogPage, PAGE_BODY_SIZE};

/// Bounded, reusable window of fetched log pages with a read cursor.
#[derive(Debug)]
pub struct PageWindow<S: PageSource> {
    source: S,
    max_pages: usize,
    metrics: Arc<PumpMetrics>,
    pages: Vec<LogPage>,
    /// Page id of `pages[0]`; meaningless while `pages` is empty
    first_page_id: u64,
    /// Cursor: index into `pages` plus offset into that page's body.
    /// Invariant: `cursor_offset < PAGE_BODY_SIZE`; an offset landing exactly
    /// on the body end is normalized to the next page.
    cursor_page: usize,
    cursor_offset: usize,
    known_end: LogAddress,
}

impl<S: PageSource> PageWindow<S> {
    /// Create a window over `source`, fetching at most `max_pages` per trip.
    pub fn new(source: S, max_pages: usize, metrics: Arc<PumpMetrics>) -> Self {
        Self {
            source,
            max_pages,
            metrics,
            pages: Vec::new(),
            first_page_id: 0,
            cursor_page: 0,
            cursor_offset: 0,
            known_end: LogAddress::NULL,
        }
    }

    /// Fetch the first batch and position the cursor at `addr`.
    pub fn open_at(&mut self, addr: LogAddress) -> ReplayResult<()> {
        if addr.offset as usize >= PAGE_BODY_SIZE {
            return Err(ReplayError::corruption(format!(
                "start offset {} is beyond the page body",
                addr.offset
            )));
        }
        self.fetch_from(addr.page_id)?;
        self.cursor_offset = addr.offset as usize;
        Ok(())
    }

    /// The address the next read will start at.
    pub fn current_address(&self) -> LogAddress {
        LogAddress::new(
            self.first_page_id + self.cursor_page as u64,
            self.cursor_offset as u32,
        )
    }

    /// The source's log end address as of the most recent fetch.
    pub fn known_end(&self) -> LogAddress {
        self.known_end
    }

    /// Replication lag in pages between the source's end and the cursor.
    pub fn lag_pages(&self) -> u64 {
        if self.known_end.is_null() {
            return 0;
        }
        self.known_end
            .page_id
            .saturating_sub(self.current_address().page_id)
    }

    /// Copy `length` bytes starting at the cursor, crossing page-body
    /// boundaries and re-fetching the next batch as needed.
    pub fn read(&mut self, length: usize) -> ReplayResult<Vec<u8>> {
        let mut out = Vec::with_capacity(length);
        while out.len() < length {
            self.ensure_cursor_page()?;
            let body = &self.pages[self.cursor_page].body;
            let available = PAGE_BODY_SIZE - self.cursor_offset;
            let take = (length - out.len()).min(available);
            out.extend_from_slice(&body[self.cursor_offset..self.cursor_offset + take]);
            self.cursor_offset += take;
            self.normalize();
        }
        Ok(out)
    }

    /// Advance the cursor to the next alignment boundary.
    ///
    /// Records are alignment-padded on write; every structured read is
    /// followed by this step. A zero-length read still aligns.
    pub fn align(&mut self) {
        self.cursor_offset = align_up(self.cursor_offset);
        self.normalize();
    }

    /// Move the cursor forward to `addr`, fetching a new batch if the
    /// address lies beyond the current window. Moving backward is corruption.
    pub fn seek(&mut self, addr: LogAddress) -> ReplayResult<()> {
        let current = self.current_address();
        if addr < current {
            return Err(ReplayError::corruption(format!(
                "cursor regression: seek to {} from {}",
                addr, current
            )));
        }
        if addr.offset as usize >= PAGE_BODY_SIZE {
            return Err(ReplayError::corruption(format!(
                "seek offset {} is beyond the page body",
                addr.offset
            )));
        }
        let window_end = self.first_page_id + self.pages.len() as u64;
        if addr.page_id < window_end {
            self.cursor_page = (addr.page_id - self.first_page_id) as usize;
            self.cursor_offset = addr.offset as usize;
        } else {
            self.fetch_from(addr.page_id)?;
            self.cursor_offset = addr.offset as usize;
        }
        Ok(())
    }

    /// Re-fetch the window and position the cursor back at `addr`.
    ///
    /// Only the caught-up loop uses this, to re-read the end-of-log sentinel
    /// after the source extends the log. It also refreshes the known end
    /// address for the delay governor.
    pub fn restart_at(&mut self, addr: LogAddress) -> ReplayResult<()> {
        self.fetch_from(addr.page_id)?;
        self.cursor_offset = addr.offset as usize;
        Ok(())
    }

    fn normalize(&mut self) {
        while self.cursor_offset >= PAGE_BODY_SIZE {
            self.cursor_offset -= PAGE_BODY_SIZE;
            self.cursor_page += 1;
        }
    }

    fn ensure_cursor_page(&mut self) -> ReplayResult<()> {
        if self.cursor_page >= self.pages.len() {
            let next_id = self.first_page_id + self.cursor_page as u64;
            let keep_offset = self.cursor_offset;
            self.fetch_from(next_id)?;
            self.cursor_offset = keep_offset;
        }
        Ok(())
    }

    fn fetch_from(&mut self, start_page_id: u64) -> ReplayResult<()> {
        let batch: PageBatch = self
            .source
            .fetch_log_pages(start_page_id, self.max_pages)
            .map_err(|e| ReplayError::page_fetch(e.to_string()))?;

        if batch.pages.is_empty() {
            return Err(ReplayError::page_fetch(format!(
                "source returned no pages starting at page {}",
                start_page_id
            )));
        }

        let mut pages = Vec::with_capacity(batch.pages.len());
        for (i, raw) in batch.pages.iter().enumerate() {
            pages.push(LogPage::parse(raw, start_page_id + i as u64)?);
        }

        self.metrics.add_pages_fetched(pages.len() as u64);
        self.pages = pages;
        self.first_page_id = start_page_id;
        self.cursor_page = 0;
        self.cursor_offset = 0;
        self.known_end = batch.source_end_address;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::traits::PageFetchError;
    use crate::wal::PAGE_BODY_SIZE;

    /// Serves pre-built pages out of memory, tracking fetch calls.
    struct VecSource {
        first_id: u64,
        pages: Vec<Vec<u8>>,
        end: LogAddress,
        fetches: usize,
        fail: bool,
    }

    impl VecSource {
        fn new(first_id: u64, bodies: Vec<Vec<u8>>) -> Self {
            let end = LogAddress::new(first_id + bodies.len() as u64, 0);
            let pages = bodies
                .into_iter()
                .enumerate()
                .map(|(i, body)| {
                    LogPage {
                        page_id: first_id + i as u64,
                        body,
                    }
                    .to_wire()
                })
                .collect();
            Self {
                first_id,
                pages,
                end,
                fetches: 0,
                fail: false,
            }
        }
    }

    impl PageSource for VecSource {
        fn fetch_log_pages(
            &mut self,
            start_page_id: u64,
            max_pages: usize,
        ) -> Result<PageBatch, PageFetchError> {
            self.fetches += 1;
            if self.fail {
                return Err(PageFetchError::new("connection reset"));
            }
            let skip = (start_page_id - self.first_id) as usize;
            let pages = self.pages.iter().skip(skip).take(max_pages).cloned().collect();
            Ok(PageBatch {
                pages,
                source_end_address: self.end,
            })
        }
    }

    fn numbered_body(seed: u8) -> Vec<u8> {
        (0..PAGE_BODY_SIZE)
            .map(|i| seed.wrapping_add((i % 251) as u8))
            .collect()
    }

    fn window_over(bodies: Vec<Vec<u8>>, max_pages: usize) -> PageWindow<VecSource> {
        PageWindow::new(
            VecSource::new(0, bodies),
            max_pages,
            Arc::new(PumpMetrics::new()),
        )
    }

    #[test]
    fn test_read_within_page() {
        let body = numbered_body(0);
        let mut window = window_over(vec![body.clone()], 4);
        window.open_at(LogAddress::new(0, 16)).unwrap();

        let bytes = window.read(32).unwrap();
        assert_eq!(bytes, &body[16..48]);
        assert_eq!(window.current_address(), LogAddress::new(0, 48));
    }

    #[test]
    fn test_read_spans_page_boundary() {
        let body0 = numbered_body(0);
        let body1 = numbered_body(100);
        let mut window = window_over(vec![body0.clone(), body1.clone()], 4);
        window
            .open_at(LogAddress::new(0, (PAGE_BODY_SIZE - 4) as u32))
            .unwrap();

        let bytes = window.read(12).unwrap();
        assert_eq!(&bytes[..4], &body0[PAGE_BODY_SIZE - 4..]);
        assert_eq!(&bytes[4..], &body1[..8]);
        assert_eq!(window.current_address(), LogAddress::new(1, 8));
    }

    #[test]
    fn test_read_triggers_refetch_when_window_exhausted() {
        let bodies = vec![numbered_body(0), numbered_body(50), numbered_body(100)];
        let mut window = window_over(bodies, 1);
        window.open_at(LogAddress::new(0, 0)).unwrap();

        // Drain page 0 exactly, then read into page 1: a second fetch.
        window.read(PAGE_BODY_SIZE).unwrap();
        let fetches_before = window.source.fetches;
        let bytes = window.read(8).unwrap();
        assert_eq!(bytes, numbered_body(50)[..8].to_vec());
        assert_eq!(window.source.fetches, fetches_before + 1);
        assert_eq!(window.current_address(), LogAddress::new(1, 8));
    }

    #[test]
    fn test_align_advances_to_quantum() {
        let mut window = window_over(vec![numbered_body(0)], 4);
        window.open_at(LogAddress::new(0, 0)).unwrap();
        window.read(5).unwrap();
        window.align();
        assert_eq!(window.current_address(), LogAddress::new(0, 8));
    }

    #[test]
    fn test_align_noop_on_boundary() {
        let mut window = window_over(vec![numbered_body(0)], 4);
        window.open_at(LogAddress::new(0, 0)).unwrap();
        window.read(16).unwrap();
        window.align();
        assert_eq!(window.current_address(), LogAddress::new(0, 16));
    }

    #[test]
    fn test_zero_length_read_consumes_nothing() {
        let mut window = window_over(vec![numbered_body(0)], 4);
        window.open_at(LogAddress::new(0, 24)).unwrap();
        assert!(window.read(0).unwrap().is_empty());
        window.align();
        assert_eq!(window.current_address(), LogAddress::new(0, 24));
    }

    #[test]
    fn test_align_crosses_page_boundary() {
        let mut window = window_over(vec![numbered_body(0), numbered_body(1)], 4);
        window.open_at(LogAddress::new(0, 0)).unwrap();
        window.read(PAGE_BODY_SIZE - 3).unwrap();
        window.align();
        assert_eq!(window.current_address(), LogAddress::new(1, 0));
    }

    #[test]
    fn test_seek_forward_within_window() {
        let mut window = window_over(vec![numbered_body(0), numbered_body(1)], 4);
        window.open_at(LogAddress::new(0, 0)).unwrap();
        let fetches = window.source.fetches;
        window.seek(LogAddress::new(1, 64)).unwrap();
        assert_eq!(window.source.fetches, fetches);
        assert_eq!(window.current_address(), LogAddress::new(1, 64));
    }

    #[test]
    fn test_seek_backward_is_corruption() {
        let mut window = window_over(vec![numbered_body(0)], 4);
        window.open_at(LogAddress::new(0, 128)).unwrap();
        let err = window.seek(LogAddress::new(0, 64)).unwrap_err();
        assert_eq!(err.code(), "PUMP_CORRUPTION");
        assert!(err.message.contains("regression"));
    }

    #[test]
    fn test_fetch_failure_is_page_fetch_error() {
        let mut source = VecSource::new(0, vec![numbered_body(0)]);
        source.fail = true;
        let mut window = PageWindow::new(source, 4, Arc::new(PumpMetrics::new()));
        let err = window.open_at(LogAddress::new(0, 0)).unwrap_err();
        assert_eq!(err.code(), "PUMP_PAGE_FETCH_FAILED");
    }

    #[test]
    fn test_empty_batch_is_page_fetch_error() {
        let mut window = window_over(vec![], 4);
        let err = window.open_at(LogAddress::new(0, 0)).unwrap_err();
        assert_eq!(err.code(), "PUMP_PAGE_FETCH_FAILED");
        assert!(err.message.contains("no pages"));
    }

    #[test]
    fn test_corrupted_page_detected_on_fetch() {
        let mut source = VecSource::new(0, vec![numbered_body(0)]);
        let frame = &mut source.pages[0];
        let mid = frame.len() / 2;
        frame[mid] ^= 0xFF;
        let mut window = PageWindow::new(source, 4, Arc::new(PumpMetrics::new()));
        let err = window.open_at(LogAddress::new(0, 0)).unwrap_err();
        assert_eq!(err.code(), "PUMP_CORRUPTION");
        assert!(err.message.contains("checksum"));
    }

    #[test]
    fn test_known_end_refreshed_on_fetch() {
        let mut window = window_over(vec![numbered_body(0), numbered_body(1)], 4);
        window.open_at(LogAddress::new(0, 0)).unwrap();
        assert_eq!(window.known_end(), LogAddress::new(2, 0));
        assert_eq!(window.lag_pages(), 2);
    }

    #[test]
    fn test_restart_at_rereads_same_address() {
        let mut window = window_over(vec![numbered_body(0)], 4);
        window.open_at(LogAddress::new(0, 0)).unwrap();
        let first = window.read(8).unwrap();
        window.restart_at(LogAddress::new(0, 0)).unwrap();
        assert_eq!(window.read(8).unwrap(), first);
    }

    #[test]
    fn test_metrics_count_fetched_pages() {
        let metrics = Arc::new(PumpMetrics::new());
        let mut window = PageWindow::new(
            VecSource::new(0, vec![numbered_body(0), numbered_body(1)]),
            4,
            Arc::clone(&metrics),
        );
        window.open_at(LogAddress::new(0, 0)).unwrap();
        assert_eq!(metrics.pages_fetched(), 2);
    }
}
