//! Records and record batches with their on-disk codec.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! record:  i32 key_len | key | i32 value_len | value | i64 timestamp_ms
//! batch:   i64 base_offset | i64 timestamp_ms | i32 record_count | records... | u32 crc32
//! ```
//!
//! The batch CRC covers every serialized byte before the CRC field itself.

use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Upper bound on a single serialized batch. Anything larger is treated as
/// corruption during recovery and rejected on append.
pub const MAX_BATCH_BYTES: usize = 1024 * 1024;

const BATCH_FIXED_BYTES: usize = 8 + 8 + 4 + 4; // base_offset + timestamp + count + crc
const RECORD_FIXED_BYTES: usize = 4 + 4 + 8; // key_len + value_len + timestamp

/// A single immutable message. Offsets are implicit: record `i` of a batch
/// lives at `batch.base_offset + i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
    pub timestamp_ms: i64,
}

impl Record {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>, timestamp_ms: i64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp_ms,
        }
    }

    pub fn serialized_size(&self) -> usize {
        RECORD_FIXED_BYTES + self.key.len() + self.value.len()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.key.len() as i32);
        buf.put_slice(&self.key);
        buf.put_i32_le(self.value.len() as i32);
        buf.put_slice(&self.value);
        buf.put_i64_le(self.timestamp_ms);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let key = read_len_prefixed(buf, "record key")?;
        let value = read_len_prefixed(buf, "record value")?;
        if buf.remaining() < 8 {
            return Err(Error::CorruptedData("record missing timestamp".into()));
        }
        let timestamp_ms = buf.get_i64_le();
        Ok(Self {
            key,
            value,
            timestamp_ms,
        })
    }
}

fn read_len_prefixed(buf: &mut &[u8], what: &str) -> Result<Bytes> {
    if buf.remaining() < 4 {
        return Err(Error::CorruptedData(format!("{what}: missing length")));
    }
    let len = buf.get_i32_le();
    if len < 0 || buf.remaining() < len as usize {
        return Err(Error::CorruptedData(format!(
            "{what}: length {len} exceeds remaining {}",
            buf.remaining()
        )));
    }
    let bytes = Bytes::copy_from_slice(&buf[..len as usize]);
    buf.advance(len as usize);
    Ok(bytes)
}

/// A CRC-protected group of records stored atomically in a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatch {
    pub base_offset: i64,
    pub records: Vec<Record>,
    pub timestamp_ms: i64,
    pub crc32: u32,
}

impl RecordBatch {
    /// Build a batch and stamp its CRC over the serialized body.
    pub fn new(base_offset: i64, records: Vec<Record>, timestamp_ms: i64) -> Self {
        let mut batch = Self {
            base_offset,
            records,
            timestamp_ms,
            crc32: 0,
        };
        batch.crc32 = batch.compute_crc32();
        batch
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Offset one past the last record in this batch.
    pub fn next_offset(&self) -> i64 {
        self.base_offset + self.records.len() as i64
    }

    pub fn serialized_size(&self) -> usize {
        BATCH_FIXED_BYTES
            + self
                .records
                .iter()
                .map(Record::serialized_size)
                .sum::<usize>()
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.base_offset);
        buf.put_i64_le(self.timestamp_ms);
        buf.put_i32_le(self.records.len() as i32);
        for record in &self.records {
            record.encode(buf);
        }
    }

    pub fn compute_crc32(&self) -> u32 {
        let mut body = BytesMut::with_capacity(self.serialized_size() - 4);
        self.encode_body(&mut body);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&body);
        hasher.finalize()
    }

    pub fn verify_crc32(&self) -> bool {
        self.compute_crc32() == self.crc32
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_size());
        self.encode_body(&mut buf);
        buf.put_u32_le(self.crc32);
        buf.freeze()
    }

    /// Decode a batch body and verify its CRC.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < BATCH_FIXED_BYTES {
            return Err(Error::CorruptedData(format!(
                "batch too short: {} bytes",
                data.len()
            )));
        }

        let mut buf = data;
        let base_offset = buf.get_i64_le();
        let timestamp_ms = buf.get_i64_le();
        let record_count = buf.get_i32_le();
        if record_count < 0 {
            return Err(Error::CorruptedData(format!(
                "negative record count {record_count}"
            )));
        }

        let mut records = Vec::with_capacity(record_count as usize);
        for _ in 0..record_count {
            records.push(Record::decode(&mut buf)?);
        }

        if buf.remaining() < 4 {
            return Err(Error::CorruptedData("batch missing CRC".into()));
        }
        let crc32 = buf.get_u32_le();

        let batch = Self {
            base_offset,
            records,
            timestamp_ms,
            crc32,
        };
        if !batch.verify_crc32() {
            return Err(Error::CorruptedData(format!(
                "batch CRC mismatch at base offset {base_offset}"
            )));
        }
        Ok(batch)
    }
}
