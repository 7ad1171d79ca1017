// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! An insertion-order-preserving option container.
//!
//! Order matters twice over: RFC 3396 requires that repeated occurrences of
//! the same code be concatenated in the order they appeared on the wire, and
//! the server pins the message-type option (53) to the front of every reply
//! so that streaming parsers can classify a packet without buffering it.

use crate::error::DhcpError;
use crate::option_value::OptionValueType;
use std::collections::HashMap;

const PAD: u8 = 0;
const END: u8 = 255;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    // Insertion-order-preserving; `index` maps a code to its position in `entries`.
    entries: Vec<(u8, Vec<u8>)>,
    index: HashMap<u8, usize>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an options area, concatenating repeated codes per RFC 3396.
    /// Returns the number of input bytes consumed (the offset of the
    /// terminating `END` byte plus one, if one was found) and whether an
    /// `END` marker was actually seen.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize, bool), DhcpError> {
        let mut options = Options::new();
        let mut i = 0;
        while i < buf.len() {
            let code = buf[i];
            if code == PAD {
                i += 1;
                continue;
            }
            if code == END {
                return Ok((options, i + 1, true));
            }
            let len = *buf
                .get(i + 1)
                .ok_or(DhcpError::MalformedPacket { reason: "option code missing its length byte" })?
                as usize;
            let data = buf
                .get(i + 2..i + 2 + len)
                .ok_or(DhcpError::MalformedPacket { reason: "option length exceeds remaining buffer" })?;
            options.append_raw(code, data);
            i += 2 + len;
        }
        Ok((options, i, false))
    }

    /// Appends raw, already-decoded bytes, concatenating onto any existing
    /// entry per RFC 3396. Exposed crate-wide for the message codec's
    /// option-overload merge step, which reassembles `sname`/`file`-resident
    /// options decoded independently of the main options area.
    pub(crate) fn append_raw(&mut self, code: u8, data: &[u8]) {
        if let Some(&idx) = self.index.get(&code) {
            self.entries[idx].1.extend_from_slice(data);
        } else {
            self.index.insert(code, self.entries.len());
            self.entries.push((code, data.to_vec()));
        }
    }

    /// Concatenates `value`'s encoding onto any existing entry for `code`.
    pub fn append<T: OptionValueType>(&mut self, code: u8, value: &T) {
        let mut encoded = Vec::new();
        value.write(&mut encoded);
        self.append_raw(code, &encoded);
    }

    /// Replaces (or inserts) the entry for `code`.
    pub fn set<T: OptionValueType>(&mut self, code: u8, value: &T) {
        let mut encoded = Vec::new();
        value.write(&mut encoded);
        self.set_raw(code, encoded);
    }

    pub fn set_raw(&mut self, code: u8, data: Vec<u8>) {
        if let Some(&idx) = self.index.get(&code) {
            self.entries[idx].1 = data;
        } else {
            self.index.insert(code, self.entries.len());
            self.entries.push((code, data));
        }
    }

    pub fn remove(&mut self, code: u8) -> Option<Vec<u8>> {
        let idx = self.index.remove(&code)?;
        let (_, data) = self.entries.remove(idx);
        for v in self.index.values_mut() {
            if *v > idx {
                *v -= 1;
            }
        }
        Some(data)
    }

    pub fn contains(&self, code: u8) -> bool {
        self.index.contains_key(&code)
    }

    pub fn get_raw(&self, code: u8) -> Option<&[u8]> {
        self.index.get(&code).map(|&idx| self.entries[idx].1.as_slice())
    }

    /// Decodes the stored bytes for `code` through `T`, requiring the whole
    /// stored value to be consumed.
    pub fn get<T: OptionValueType>(&self, code: u8) -> Result<Option<T>, DhcpError> {
        let Some(buf) = self.get_raw(code) else { return Ok(None) };
        if let Some(expected) = T::fixed_length() {
            if buf.len() != expected {
                return Err(DhcpError::InvalidOptionLength { expected, actual: buf.len() });
            }
        }
        let (value, consumed) = T::read(buf)?;
        if consumed != buf.len() {
            return Err(DhcpError::MalformedPacket { reason: "option did not consume its whole payload" });
        }
        Ok(Some(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.entries.iter().map(|(c, v)| (*c, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves `code`'s entry to the front of the serialization order, if
    /// present. Used to pin the message-type option first in every reply.
    pub fn move_to_front(&mut self, code: u8) {
        let Some(&idx) = self.index.get(&code) else { return };
        if idx == 0 {
            return;
        }
        let entry = self.entries.remove(idx);
        self.entries.insert(0, entry);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, (code, _)) in self.entries.iter().enumerate() {
            self.index.insert(*code, i);
        }
    }

    /// Encodes as many entries as fit within `max_size` bytes (including the
    /// terminating `END`), padding each option chunk to `word_size`-byte
    /// alignment. Returns the encoded bytes and, if any data didn't fit, an
    /// `Options` holding what was left over.
    pub fn partial_encode(&self, max_size: usize, word_size: usize) -> (Vec<u8>, Option<Options>) {
        assert!(word_size >= 1, "word_size must be at least 1");
        let end_bytes_len = word_size;
        let mut tofill = max_size.saturating_sub(end_bytes_len);
        let mut out = Vec::new();
        let mut leftover = Options::new();

        for (code, data) in &self.entries {
            if tofill < 3 {
                leftover.set_raw(*code, data.clone());
                continue;
            }
            out.push(*code);
            tofill -= 1;
            let mut remaining = data.as_slice();
            while !remaining.is_empty() && tofill >= word_size {
                let take = remaining.len().min(255).min(tofill);
                let chunk = &remaining[..take];
                out.push(chunk.len() as u8);
                out.extend_from_slice(chunk);
                let pad = word_size.saturating_sub(chunk.len());
                out.resize(out.len() + pad, 0);
                remaining = &remaining[take..];
                tofill = tofill.saturating_sub(take);
            }
            if !remaining.is_empty() {
                leftover.set_raw(*code, remaining.to_vec());
            }
        }

        out.push(END);
        out.resize(out.len() + (word_size - 1), 0);

        (out, if leftover.is_empty() { None } else { Some(leftover) })
    }

    pub fn encode(&self, word_size: usize) -> Vec<u8> {
        self.partial_encode(usize::MAX, word_size).0
    }
}

impl IntoIterator for Options {
    type Item = (u8, Vec<u8>);
    type IntoIter = std::vec::IntoIter<(u8, Vec<u8>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_skips_pad_and_stops_at_end() {
        let buf = [0x00, 0x35, 0x01, 0x01, 0xFF, 0x99];
        let (options, consumed, terminated) = Options::decode(&buf).unwrap();
        assert!(terminated);
        assert_eq!(consumed, 5);
        assert_eq!(options.get_raw(53), Some([1u8].as_slice()));
    }

    #[test]
    fn decode_concatenates_repeated_codes_per_rfc_3396() {
        let buf = [0x0C, 0x02, b'a', b'b', 0x0C, 0x02, b'c', b'd', 0xFF];
        let (options, _, _) = Options::decode(&buf).unwrap();
        assert_eq!(options.get_raw(12), Some(b"abcd".as_slice()));
    }

    #[test]
    fn append_is_equivalent_to_concatenating_twice() {
        let mut a = Options::new();
        a.append_raw(12, b"ab");
        a.append_raw(12, b"cd");

        let mut b = Options::new();
        b.append_raw(12, b"abcd");

        assert_eq!(a, b);
    }

    #[test]
    fn encode_round_trips_through_decode() {
        let mut options = Options::new();
        options.set_raw(53, vec![1]);
        options.set_raw(1, vec![255, 255, 255, 0]);
        let encoded = options.encode(1);
        let (decoded, consumed, terminated) = Options::decode(&encoded).unwrap();
        assert!(terminated);
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, options);
    }

    #[test]
    fn partial_encode_splits_large_values_into_255_byte_chunks_and_reports_leftover() {
        let mut options = Options::new();
        let big = vec![7u8; 300];
        options.set_raw(67, big.clone());

        let (encoded, leftover) = options.partial_encode(260, 1);
        // code + len + up-to-255 bytes, then the END byte.
        assert!(encoded.len() <= 260);
        assert_eq!(encoded[encoded.len() - 1], END);
        let leftover = leftover.expect("the 300-byte value should not fit in 260 bytes");
        assert!(leftover.contains(67));
    }

    #[test]
    fn move_to_front_reorders_without_dropping_entries() {
        let mut options = Options::new();
        options.set_raw(1, vec![1]);
        options.set_raw(53, vec![2]);
        options.set_raw(54, vec![3]);
        options.move_to_front(53);
        let codes: Vec<u8> = options.iter().map(|(c, _)| c).collect();
        assert_eq!(codes, vec![53, 1, 54]);
    }

    #[test]
    fn word_size_pads_each_chunk() {
        let mut options = Options::new();
        options.set_raw(1, vec![9, 9]);
        let encoded = options.encode(4);
        // code, len, 2 data bytes, 2 zero pad bytes to reach word_size,
        // then END followed by word_size-1 zero pad bytes.
        assert_eq!(encoded, vec![1, 2, 9, 9, 0, 0, END, 0, 0, 0]);
    }
}
