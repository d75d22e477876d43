//! FrameExtractor - Scanner Byte Stream Framing
//!
//! ## Responsibilities
//!
//! - Reassemble LF-terminated lines from an arbitrarily chunked byte stream
//! - Match one `<W#...>` / `<B#...>` frame per line, anchored at line start
//! - Resynchronize past noise by skipping to the next `<`, then past `>`
//! - Bound the partial-line buffer when the scanner emits unterminated noise
//!
//! ## Frame grammar
//!
//! ```text
//! <W#0123456789AB>        WiFi, 12 hex chars, tag W or w
//! <B#aa:bb:cc:dd:ee:ff>   Bluetooth, 6 lowercase hex pairs, tag B or b
//! ```

use crate::models::{DetectionEvent, DeviceAddress, DeviceClass};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::VecDeque;

/// Partial line length above which the oldest bytes are dropped
pub const MAX_PARTIAL_LINE: usize = 255;
/// Bytes dropped from the front of an over-long partial line
pub const OVERFLOW_TRIM: usize = 100;

static WIFI_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<([Ww])#([0-9a-fA-F]{12})>").expect("valid wifi frame pattern"));

static BT_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<([Bb])#((?:[0-9a-f]{2}:){5}[0-9a-f]{2})>").expect("valid bt frame pattern")
});

/// Extraction counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractorStats {
    pub bytes_fed: u64,
    pub lines_seen: u64,
    pub frames_accepted: u64,
    pub lines_discarded: u64,
    pub invalid_addresses: u64,
    pub overflow_trims: u64,
}

/// Line reassembly + frame matching state
#[derive(Debug, Default)]
pub struct FrameExtractor {
    /// Completed lines, LF stripped, waiting for `drain`
    lines: VecDeque<Vec<u8>>,
    /// Bytes since the last LF
    partial: Vec<u8>,
    stats: ExtractorStats,
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte. An over-long partial line is trimmed here, per
    /// byte, never at drain time.
    pub fn feed(&mut self, byte: u8) {
        self.stats.bytes_fed += 1;
        if byte == b'\n' {
            self.lines.push_back(std::mem::take(&mut self.partial));
            return;
        }

        self.partial.push(byte);
        if self.partial.len() > MAX_PARTIAL_LINE {
            self.partial.drain(..OVERFLOW_TRIM);
            self.stats.overflow_trims += 1;
            tracing::trace!(
                remaining = self.partial.len(),
                "Partial line too long, dropped oldest bytes"
            );
        }
    }

    /// Append a chunk, same as feeding each byte in order
    pub fn feed_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.feed(byte);
        }
    }

    /// Extract events from every complete line, stamped with the wall clock
    pub fn drain(&mut self) -> Vec<DetectionEvent> {
        self.drain_at(Utc::now())
    }

    /// Extract events from every complete line, stamped with `now`
    pub fn drain_at(&mut self, now: DateTime<Utc>) -> Vec<DetectionEvent> {
        let mut events = Vec::new();

        while let Some(raw) = self.lines.pop_front() {
            let mut line = raw.as_slice();
            if let Some(cr) = line.iter().position(|&b| b == b'\r') {
                line = &line[..cr];
            }
            self.stats.lines_seen += 1;

            let text = String::from_utf8_lossy(line);
            match extract_frame(&text) {
                Some((class, raw_addr)) => match DeviceAddress::parse(raw_addr) {
                    Some(address) => {
                        self.stats.frames_accepted += 1;
                        events.push(DetectionEvent::new(class, address, now));
                    }
                    None => {
                        self.stats.invalid_addresses += 1;
                        tracing::debug!(address = %raw_addr, "Found invalid char in address");
                    }
                },
                None => {
                    self.stats.lines_discarded += 1;
                    if !text.is_empty() {
                        tracing::debug!(line = %text, "Discarding line without a valid frame");
                    }
                }
            }
        }

        events
    }

    /// Bytes waiting for a line feed
    pub fn pending_len(&self) -> usize {
        self.partial.len()
    }

    /// Drop any partial line (port reopened or shutting down).
    /// Lines already terminated stay queued for `drain`.
    pub fn clear(&mut self) {
        self.partial.clear();
    }

    pub fn stats(&self) -> &ExtractorStats {
        &self.stats
    }
}

/// Find the frame of a single line.
///
/// Tries the line start first. On a mismatch, skips to the next `<`, and
/// if that still does not match, discards through the first following
/// `>`, as long as a `<` with a later `>` remains.
fn extract_frame(line: &str) -> Option<(DeviceClass, &str)> {
    let mut rest = line;
    loop {
        if let Some(found) = match_frame(rest) {
            return Some(found);
        }
        let open = rest.find('<')?;
        let close = open + rest[open..].find('>')?;
        if open > 0 {
            rest = &rest[open..];
        } else {
            rest = &rest[close + 1..];
        }
    }
}

/// Match a frame anchored at the start of `s`
fn match_frame(s: &str) -> Option<(DeviceClass, &str)> {
    let caps = WIFI_FRAME.captures(s).or_else(|| BT_FRAME.captures(s))?;
    let tag = caps.get(1)?.as_str().chars().next()?;
    let class = DeviceClass::from_frame_tag(tag)?;
    Some((class, caps.get(2)?.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn extract(input: &str) -> Vec<(DeviceClass, String)> {
        let mut fx = FrameExtractor::new();
        fx.feed_bytes(input.as_bytes());
        fx.drain_at(at())
            .into_iter()
            .map(|e| (e.device_class, e.address.to_string()))
            .collect()
    }

    #[test]
    fn test_wifi_then_bt_in_order() {
        let got = extract("<W#0123456789AB>\n<B#aa:bb:cc:dd:ee:ff>\n");
        assert_eq!(
            got,
            vec![
                (DeviceClass::Wifi, "0123456789AB".to_string()),
                (DeviceClass::Bluetooth, "aa:bb:cc:dd:ee:ff".to_string()),
            ]
        );
    }

    #[test]
    fn test_garbage_prefix_resyncs_to_frame() {
        let got = extract("garbage<B#aa:bb:cc:dd:ee:ff>\n");
        assert_eq!(got, vec![(DeviceClass::Bluetooth, "aa:bb:cc:dd:ee:ff".to_string())]);
    }

    #[test]
    fn test_bad_frame_discarded_through_close() {
        let got = extract("<X#junk><w#abcdef012345>\n");
        assert_eq!(got, vec![(DeviceClass::Wifi, "abcdef012345".to_string())]);
    }

    #[test]
    fn test_no_line_feed_waits() {
        let mut fx = FrameExtractor::new();
        fx.feed_bytes(b"<W#0123456789AB>");
        assert!(fx.drain_at(at()).is_empty());
        fx.feed(b'\n');
        assert_eq!(fx.drain_at(at()).len(), 1);
    }

    #[test]
    fn test_carriage_return_stripped() {
        let got = extract("<b#01:23:45:67:89:ab>\r\n");
        assert_eq!(got, vec![(DeviceClass::Bluetooth, "01:23:45:67:89:ab".to_string())]);
    }

    #[test]
    fn test_pipe_is_not_hex() {
        assert!(extract("<W#0123456789A|>\n").is_empty());
        assert!(extract("<B#aa:bb:cc:dd:ee:f|>\n").is_empty());
    }

    #[test]
    fn test_bt_requires_lowercase_hex() {
        assert!(extract("<B#AA:BB:CC:DD:EE:FF>\n").is_empty());
    }

    #[test]
    fn test_wrong_lengths_rejected() {
        assert!(extract("<W#0123456789A>\n").is_empty());
        assert!(extract("<W#0123456789ABC>\n").is_empty());
        assert!(extract("<B#aa:bb:cc:dd:ee>\n").is_empty());
    }

    #[test]
    fn test_one_frame_per_line() {
        let got = extract("<W#0123456789AB><W#BA9876543210>\n");
        assert_eq!(got, vec![(DeviceClass::Wifi, "0123456789AB".to_string())]);
    }

    #[test]
    fn test_tail_noise_after_frame_ignored() {
        let got = extract("<W#0123456789AB>trailing junk\n");
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn test_noise_line_does_not_leak_into_next() {
        let got = extract("<W#01234\n<B#aa:bb:cc:dd:ee:ff>\n");
        assert_eq!(got, vec![(DeviceClass::Bluetooth, "aa:bb:cc:dd:ee:ff".to_string())]);
    }

    #[test]
    fn test_chunking_independence() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"boot msg\r\n<W#0123456789AB>\n");
        stream.extend(std::iter::repeat(b'x').take(400));
        stream.extend_from_slice(b"<B#aa:bb:cc:dd:ee:ff>\n<q#>\n<B#01:02:03:04:05:06>junk\r\n");
        // Frame buried under a long tail: trimmed away before its LF arrives
        stream.extend_from_slice(b"<W#0A0A0A0A0A0A>");
        stream.extend(std::iter::repeat(b'x').take(300));
        stream.push(b'\n');
        stream.extend_from_slice(b"<W#FFFFFFFFFFFF>");

        let mut whole = FrameExtractor::new();
        whole.feed_bytes(&stream);
        let mut from_chunk = whole.drain_at(at());
        whole.feed(b'\n');
        from_chunk.extend(whole.drain_at(at()));

        let mut single = FrameExtractor::new();
        let mut from_bytes = Vec::new();
        for &b in &stream {
            single.feed(b);
            from_bytes.extend(single.drain_at(at()));
        }
        single.feed(b'\n');
        from_bytes.extend(single.drain_at(at()));

        assert_eq!(from_chunk, from_bytes);
        let addrs: Vec<String> = from_chunk.iter().map(|e| e.address.to_string()).collect();
        assert_eq!(
            addrs,
            ["0123456789AB", "aa:bb:cc:dd:ee:ff", "01:02:03:04:05:06", "FFFFFFFFFFFF"]
        );
    }

    #[test]
    fn test_long_line_trimmed_same_for_any_chunking() {
        let mut long_tail = b"<W#0123456789AB>".to_vec();
        long_tail.extend(std::iter::repeat(b'x').take(300));
        long_tail.push(b'\n');

        let mut short_tail = b"<W#0123456789AB>".to_vec();
        short_tail.extend(std::iter::repeat(b'x').take(200));
        short_tail.push(b'\n');

        for (stream, expected) in [(long_tail, 0), (short_tail, 1)] {
            let mut whole = FrameExtractor::new();
            whole.feed_bytes(&stream);
            let from_chunk = whole.drain_at(at());

            let mut single = FrameExtractor::new();
            let mut from_bytes = Vec::new();
            for &b in &stream {
                single.feed(b);
                from_bytes.extend(single.drain_at(at()));
            }

            assert_eq!(from_chunk.len(), expected);
            assert_eq!(from_bytes.len(), expected);
        }
    }

    #[test]
    fn test_overflow_trims_oldest() {
        let mut fx = FrameExtractor::new();
        fx.feed_bytes(&[b'z'; 256]);
        assert!(fx.drain_at(at()).is_empty());
        assert_eq!(fx.pending_len(), 156);
        assert_eq!(fx.stats().overflow_trims, 1);

        fx.feed(b'\n');
        assert_eq!(fx.pending_len(), 0);

        fx.feed_bytes(&[b'z'; 1000]);
        fx.drain_at(at());
        assert!(fx.pending_len() <= MAX_PARTIAL_LINE);
    }

    #[test]
    fn test_stats_track_outcomes() {
        let mut fx = FrameExtractor::new();
        fx.feed_bytes(b"<W#0123456789AB>\nnoise\n");
        fx.drain_at(at());
        let stats = fx.stats();
        assert_eq!(stats.lines_seen, 2);
        assert_eq!(stats.frames_accepted, 1);
        assert_eq!(stats.lines_discarded, 1);
        assert_eq!(stats.bytes_fed, 23);
    }

    #[test]
    fn test_clear_discards_partial_line() {
        let mut fx = FrameExtractor::new();
        fx.feed_bytes(b"<W#0123");
        fx.clear();
        fx.feed_bytes(b"456789AB>\n");
        assert!(fx.drain_at(at()).is_empty());
    }
}
