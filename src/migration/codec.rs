// SPDX-License-Identifier: Apache-2.0

//! Bulk-transfer wire formats.
//!
//! Binary transfers use the PostgreSQL `COPY ... (FORMAT binary)` framing:
//! an 11-byte signature, a flags word, a header extension, then tuples of
//! length-prefixed fields closed by a `-1` trailer. CSV transfers are split
//! into records on newlines outside double quotes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use polystore_core::{EngineError, EngineResult};

pub const PGCOPY_SIGNATURE: &[u8; 11] = b"PGCOPY\n\xff\r\n\0";

const HEADER_LEN: usize = PGCOPY_SIGNATURE.len() + 8;
const TRAILER: i16 = -1;
const NULL_FIELD: i32 = -1;

/// One decoded binary tuple; `None` marks SQL NULL.
pub type BinaryRow = Vec<Option<Bytes>>;

pub fn encode_header(buf: &mut BytesMut) {
    buf.put_slice(PGCOPY_SIGNATURE);
    buf.put_i32(0);
    buf.put_i32(0);
}

pub fn encode_tuple<'a, I>(buf: &mut BytesMut, fields: I) -> EngineResult<()>
where
    I: ExactSizeIterator<Item = Option<&'a [u8]>>,
{
    let count = i16::try_from(fields.len())
        .map_err(|_| EngineError::internal("too many fields for a binary tuple"))?;
    buf.put_i16(count);
    for field in fields {
        match field {
            Some(bytes) => {
                let len = i32::try_from(bytes.len())
                    .map_err(|_| EngineError::internal("binary field exceeds 2 GiB"))?;
                buf.put_i32(len);
                buf.put_slice(bytes);
            }
            None => buf.put_i32(NULL_FIELD),
        }
    }
    Ok(())
}

pub fn encode_trailer(buf: &mut BytesMut) {
    buf.put_i16(TRAILER);
}

#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    Row(BinaryRow),
    /// The buffered bytes end mid-tuple.
    NeedMore,
    End,
}

/// Incremental decoder for binary COPY streams.
#[derive(Debug, Default)]
pub struct BinaryRowReader {
    buf: BytesMut,
    header_read: bool,
    finished: bool,
}

impl BinaryRowReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes buffered but not yet decoded.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn next_row(&mut self) -> EngineResult<Decoded> {
        if self.finished {
            return Ok(Decoded::End);
        }
        if !self.header_read {
            if self.buf.len() < HEADER_LEN {
                return Ok(Decoded::NeedMore);
            }
            if &self.buf[..PGCOPY_SIGNATURE.len()] != PGCOPY_SIGNATURE {
                return Err(EngineError::io("binary stream has no PGCOPY signature"));
            }
            let extension = (&self.buf[PGCOPY_SIGNATURE.len() + 4..HEADER_LEN]).get_i32();
            let extension = usize::try_from(extension)
                .map_err(|_| EngineError::io("negative header extension length"))?;
            if self.buf.len() < HEADER_LEN + extension {
                return Ok(Decoded::NeedMore);
            }
            self.buf.advance(HEADER_LEN + extension);
            self.header_read = true;
        }

        let Some(field_count) = peek_i16(&self.buf) else {
            return Ok(Decoded::NeedMore);
        };
        if field_count == TRAILER {
            self.buf.advance(2);
            self.finished = true;
            return Ok(Decoded::End);
        }
        if field_count < 0 {
            return Err(EngineError::io(format!("invalid field count {}", field_count)));
        }

        // Walk the tuple without consuming until it is fully buffered.
        let mut offset = 2;
        let mut spans = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let Some(len) = self.buf.get(offset..offset + 4).map(|mut b| b.get_i32()) else {
                return Ok(Decoded::NeedMore);
            };
            offset += 4;
            if len == NULL_FIELD {
                spans.push(None);
                continue;
            }
            let len =
                usize::try_from(len).map_err(|_| EngineError::io("invalid field length"))?;
            if self.buf.len() < offset + len {
                return Ok(Decoded::NeedMore);
            }
            spans.push(Some((offset, len)));
            offset += len;
        }

        let tuple = self.buf.split_to(offset).freeze();
        let row = spans
            .into_iter()
            .map(|span| span.map(|(start, len)| tuple.slice(start..start + len)))
            .collect();
        Ok(Decoded::Row(row))
    }
}

fn peek_i16(buf: &[u8]) -> Option<i16> {
    buf.get(..2).map(|mut b| b.get_i16())
}

/// Counts binary tuples as chunks pass through.
#[derive(Debug, Default)]
pub struct BinaryRowCounter {
    reader: BinaryRowReader,
    rows: u64,
}

impl BinaryRowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, chunk: &[u8]) -> EngineResult<()> {
        self.reader.feed(chunk);
        while let Decoded::Row(_) = self.reader.next_row()? {
            self.rows += 1;
        }
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

/// Splits a CSV byte stream into complete records.
#[derive(Debug, Default)]
pub struct CsvRecordSplitter {
    buf: BytesMut,
    scanned: usize,
    in_quotes: bool,
}

impl CsvRecordSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete record, including its line terminator.
    pub fn next_record(&mut self) -> Option<Bytes> {
        while self.scanned < self.buf.len() {
            let byte = self.buf[self.scanned];
            self.scanned += 1;
            match byte {
                b'"' => self.in_quotes = !self.in_quotes,
                b'\n' if !self.in_quotes => {
                    let record = self.buf.split_to(self.scanned).freeze();
                    self.scanned = 0;
                    return Some(record);
                }
                _ => {}
            }
        }
        None
    }

    /// Trailing record without a terminator, once the stream has ended.
    pub fn finish(&mut self) -> Option<Bytes> {
        let rest = self.buf.split().freeze();
        self.scanned = 0;
        self.in_quotes = false;
        (!rest.iter().all(u8::is_ascii_whitespace)).then_some(rest)
    }
}

/// Counts CSV records as chunks pass through.
#[derive(Debug, Default)]
pub struct CsvRowCounter {
    splitter: CsvRecordSplitter,
    rows: u64,
}

impl CsvRowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, chunk: &[u8]) {
        self.splitter.feed(chunk);
        while self.splitter.next_record().is_some() {
            self.rows += 1;
        }
    }

    /// Total rows, counting an unterminated final record.
    pub fn finish(mut self) -> u64 {
        self.rows + u64::from(self.splitter.finish().is_some())
    }
}
