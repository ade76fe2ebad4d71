// Copyright 2025 Relcore Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tuplestore: an append-only row buffer with multiple read pointers
//!
//! Rows are addressed by absolute position (0 = first row appended since the
//! last [`Tuplestore::clear`]). Each read pointer sits in the gap before the
//! row it will return on a forward read:
//!
//! ```text
//!   rows:     [0] [1] [2] [3]
//!   gaps:    0   1   2   3   4
//!                    ^ pointer at 2: forward read returns row 2,
//!                      backward read returns row 1
//! ```
//!
//! Every pointer has a mark. A pointer can never move below its mark, and
//! marks only move forward. Rows below every pointer's floor may be
//! discarded by [`Tuplestore::trim`]. Once the in-memory rows exceed the work
//! memory budget the whole buffer moves to an anonymous temporary file;
//! positions, marks and results are unchanged by the move.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::{DataType, Error, Result, Row, Value};

use super::context::DEFAULT_WORK_MEM;

/// Tuplestore settings
#[derive(Debug, Clone)]
pub struct TuplestoreConfig {
    /// In-memory budget in bytes before spilling to disk
    pub work_mem_bytes: usize,
    /// Directory for the spill file; the system temp directory when unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for TuplestoreConfig {
    fn default() -> Self {
        Self {
            work_mem_bytes: DEFAULT_WORK_MEM,
            temp_dir: None,
        }
    }
}

/// Identifier of a read pointer
pub type ReadPointerId = usize;

/// Capabilities of a read pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerFlags {
    /// The pointer may move backward (down to its mark)
    pub backward: bool,
}

impl PointerFlags {
    pub const FORWARD: PointerFlags = PointerFlags { backward: false };
    pub const BACKWARD: PointerFlags = PointerFlags { backward: true };
}

#[derive(Debug, Clone, Copy)]
struct ReadPointer {
    pos: i64,
    mark: i64,
    flags: PointerFlags,
}

impl ReadPointer {
    fn new(flags: PointerFlags) -> Self {
        Self {
            pos: 0,
            mark: 0,
            flags,
        }
    }

    /// Lowest position this pointer can still reach
    fn floor(&self) -> i64 {
        if self.flags.backward {
            self.mark
        } else {
            self.pos.max(self.mark)
        }
    }
}

struct SpillFile {
    file: File,
    /// Absolute position of the first row written to the file
    base: i64,
    /// Byte offset of each row record, indexed by `pos - base`
    offsets: Vec<u64>,
    end: u64,
}

/// Append-only row store with named read pointers and marks
pub struct Tuplestore {
    config: TuplestoreConfig,
    /// In-memory rows; `rows[0]` is at absolute position `first`
    rows: VecDeque<Row>,
    first: i64,
    count: i64,
    mem_bytes: usize,
    spill: Option<SpillFile>,
    pointers: Vec<ReadPointer>,
    active: ReadPointerId,
    spill_count: u64,
}

impl std::fmt::Debug for Tuplestore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tuplestore")
            .field("first", &self.first)
            .field("count", &self.count)
            .field("mem_bytes", &self.mem_bytes)
            .field("in_memory", &self.in_memory())
            .field("pointers", &self.pointers)
            .finish()
    }
}

impl Tuplestore {
    /// New empty store; read pointer 0 (forward-only) is pre-allocated
    pub fn new(config: TuplestoreConfig) -> Self {
        Self {
            config,
            rows: VecDeque::new(),
            first: 0,
            count: 0,
            mem_bytes: 0,
            spill: None,
            pointers: vec![ReadPointer::new(PointerFlags::FORWARD)],
            active: 0,
            spill_count: 0,
        }
    }

    /// Append a row at the write position
    pub fn append(&mut self, row: Row) -> Result<()> {
        if let Some(spill) = self.spill.as_mut() {
            write_record(spill, &row)?;
            self.count += 1;
            return Ok(());
        }
        self.mem_bytes += row.memory_size();
        self.rows.push_back(row.into_shared());
        self.count += 1;
        if self.mem_bytes > self.config.work_mem_bytes {
            self.spill_to_disk()?;
        }
        Ok(())
    }

    /// Create a read pointer at the lowest retained position
    pub fn alloc_read_pointer(&mut self, flags: PointerFlags) -> ReadPointerId {
        let mut ptr = ReadPointer::new(flags);
        ptr.pos = self.first;
        ptr.mark = self.first;
        self.pointers.push(ptr);
        self.pointers.len() - 1
    }

    /// Make `id` the active pointer for reads and skips
    pub fn select(&mut self, id: ReadPointerId) -> Result<()> {
        if id >= self.pointers.len() {
            return Err(Error::invalid_argument(format!(
                "tuplestore read pointer {} does not exist",
                id
            )));
        }
        self.active = id;
        Ok(())
    }

    pub fn active_pointer(&self) -> ReadPointerId {
        self.active
    }

    /// Gap position of a pointer
    pub fn position(&self, id: ReadPointerId) -> Result<i64> {
        Ok(self.pointer(id)?.pos)
    }

    pub fn mark(&self, id: ReadPointerId) -> Result<i64> {
        Ok(self.pointer(id)?.mark)
    }

    /// Read one row with the active pointer
    ///
    /// Returns `None` at the end of the store (forward) or at the pointer's
    /// floor (backward); the pointer does not move in that case. With
    /// `should_copy` the row shares no storage with the store.
    pub fn gettupleslot(&mut self, forward: bool, should_copy: bool) -> Result<Option<Row>> {
        let ptr = self.pointers[self.active];
        let target = if forward {
            if ptr.pos >= self.count {
                return Ok(None);
            }
            ptr.pos
        } else {
            if !ptr.flags.backward {
                return Err(Error::invalid_argument(
                    "backward read on a forward-only tuplestore pointer",
                ));
            }
            if ptr.pos - 1 < ptr.floor().max(self.first) {
                return Ok(None);
            }
            ptr.pos - 1
        };
        let row = self.fetch(target)?;
        self.pointers[self.active].pos = if forward { target + 1 } else { target };
        Ok(Some(if should_copy { row.deep_copy() } else { row }))
    }

    /// Move the active pointer by `n` rows
    ///
    /// Stops at the end of the store going forward and at the pointer's
    /// floor going backward; returns false when it had to stop early.
    pub fn skiptuples(&mut self, n: i64, forward: bool) -> Result<bool> {
        if n < 0 {
            return Err(Error::invalid_argument("cannot skip a negative row count"));
        }
        let ptr = &mut self.pointers[self.active];
        if forward {
            if ptr.pos + n > self.count {
                ptr.pos = self.count.max(ptr.pos);
                return Ok(false);
            }
            ptr.pos += n;
            Ok(true)
        } else {
            if !ptr.flags.backward {
                return Err(Error::invalid_argument(
                    "backward skip on a forward-only tuplestore pointer",
                ));
            }
            let floor = ptr.floor().max(self.first);
            if ptr.pos - n < floor {
                ptr.pos = floor;
                return Ok(false);
            }
            ptr.pos -= n;
            Ok(true)
        }
    }

    /// Advance the active pointer by one row
    pub fn advance(&mut self, forward: bool) -> Result<bool> {
        self.skiptuples(1, forward)
    }

    /// Move the mark of pointer `id` to `pos`
    ///
    /// Marks never move backward. A pointer positioned below its new mark is
    /// pulled up to it.
    pub fn set_mark(&mut self, id: ReadPointerId, pos: i64) -> Result<()> {
        let ptr = self.pointer_mut(id)?;
        if pos < ptr.mark {
            return Err(Error::invariant(format!(
                "cannot move tuplestore mark backward from {} to {}",
                ptr.mark, pos
            )));
        }
        ptr.mark = pos;
        if ptr.pos < pos {
            ptr.pos = pos;
        }
        Ok(())
    }

    /// Discard in-memory rows no pointer can reach any more
    pub fn trim(&mut self) {
        if self.spill.is_some() {
            return;
        }
        let oldest = self
            .pointers
            .iter()
            .map(ReadPointer::floor)
            .min()
            .unwrap_or(self.count)
            .min(self.count);
        while self.first < oldest {
            match self.rows.pop_front() {
                Some(row) => {
                    self.mem_bytes = self.mem_bytes.saturating_sub(row.memory_size());
                    self.first += 1;
                }
                None => break,
            }
        }
    }

    /// Remove every row and reset all pointers and marks to position 0
    ///
    /// Read pointers stay allocated.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.first = 0;
        self.count = 0;
        self.mem_bytes = 0;
        self.spill = None;
        for ptr in &mut self.pointers {
            ptr.pos = 0;
            ptr.mark = 0;
        }
        self.active = 0;
    }

    /// Whether every row is still held in memory
    pub fn in_memory(&self) -> bool {
        self.spill.is_none()
    }

    /// Rows appended since the last clear
    pub fn row_count(&self) -> i64 {
        self.count
    }

    /// Absolute position of the lowest row still retained
    pub fn first_retained(&self) -> i64 {
        self.first
    }

    /// Bytes of rows currently held in memory
    pub fn memory_used(&self) -> usize {
        self.mem_bytes
    }

    /// Number of times this store moved to disk
    pub fn spill_count(&self) -> u64 {
        self.spill_count
    }

    fn pointer(&self, id: ReadPointerId) -> Result<&ReadPointer> {
        self.pointers.get(id).ok_or_else(|| {
            Error::invalid_argument(format!("tuplestore read pointer {} does not exist", id))
        })
    }

    fn pointer_mut(&mut self, id: ReadPointerId) -> Result<&mut ReadPointer> {
        self.pointers.get_mut(id).ok_or_else(|| {
            Error::invalid_argument(format!("tuplestore read pointer {} does not exist", id))
        })
    }

    fn fetch(&mut self, pos: i64) -> Result<Row> {
        if pos < self.first || pos >= self.count {
            return Err(Error::invariant(format!(
                "tuplestore row {} is not retained (retained {}..{})",
                pos, self.first, self.count
            )));
        }
        match self.spill.as_mut() {
            None => self
                .rows
                .get((pos - self.first) as usize)
                .cloned()
                .ok_or_else(|| Error::internal("tuplestore memory index out of range")),
            Some(spill) => read_record(spill, pos),
        }
    }

    fn spill_to_disk(&mut self) -> Result<()> {
        let file = match &self.config.temp_dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        let mut spill = SpillFile {
            file,
            base: self.first,
            offsets: Vec::with_capacity(self.rows.len()),
            end: 0,
        };
        for row in &self.rows {
            write_record(&mut spill, row)?;
        }
        tracing::debug!(
            rows = self.rows.len(),
            bytes = self.mem_bytes,
            work_mem = self.config.work_mem_bytes,
            "tuplestore spilled to disk"
        );
        self.rows.clear();
        self.mem_bytes = 0;
        self.spill = Some(spill);
        self.spill_count += 1;
        Ok(())
    }
}

// ============================================================================
// Spill file record format
// ============================================================================
//
// record := u32 payload length, payload
// payload := u32 column count, value*
// value := tag byte, body (see encode_value)

fn write_record(spill: &mut SpillFile, row: &Row) -> Result<()> {
    let mut payload = Vec::with_capacity(16 * row.len());
    payload.extend_from_slice(&(row.len() as u32).to_le_bytes());
    for value in row.iter() {
        encode_value(value, &mut payload);
    }
    let mut record = Vec::with_capacity(payload.len() + 4);
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(&payload);

    spill.file.seek(SeekFrom::Start(spill.end))?;
    spill.file.write_all(&record)?;
    spill.offsets.push(spill.end);
    spill.end += record.len() as u64;
    Ok(())
}

fn read_record(spill: &mut SpillFile, pos: i64) -> Result<Row> {
    let offset = spill
        .offsets
        .get((pos - spill.base) as usize)
        .copied()
        .ok_or_else(|| Error::internal(format!("spilled row {} has no offset", pos)))?;
    spill.file.seek(SeekFrom::Start(offset))?;
    let mut len = [0u8; 4];
    spill.file.read_exact(&mut len)?;
    let mut payload = vec![0u8; u32::from_le_bytes(len) as usize];
    spill.file.read_exact(&mut payload)?;

    let mut reader = ByteReader::new(&payload);
    let ncols = reader.u32()? as usize;
    let mut values = Vec::with_capacity(ncols);
    for _ in 0..ncols {
        values.push(decode_value(&mut reader)?);
    }
    Ok(Row::from_values(values).into_shared())
}

fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null(dt) => {
            buf.push(0);
            buf.push(dt.as_u8());
        }
        Value::Boolean(b) => {
            buf.push(1);
            buf.push(u8::from(*b));
        }
        Value::Integer(i) => {
            buf.push(2);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            buf.push(3);
            buf.extend_from_slice(&f.to_le_bytes());
        }
        Value::Text(s) => {
            buf.push(4);
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Timestamp(ts) => {
            buf.push(8);
            buf.extend_from_slice(&ts.timestamp().to_le_bytes());
            buf.extend_from_slice(&ts.timestamp_subsec_nanos().to_le_bytes());
        }
        Value::Array(items) => {
            buf.push(9);
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items.iter() {
                encode_value(item, buf);
            }
        }
    }
}

fn decode_value(reader: &mut ByteReader<'_>) -> Result<Value> {
    match reader.u8()? {
        0 => {
            let dt = DataType::from_u8(reader.u8()?).unwrap_or(DataType::Null);
            Ok(Value::Null(dt))
        }
        1 => Ok(Value::Boolean(reader.u8()? != 0)),
        2 => Ok(Value::Integer(i64::from_le_bytes(reader.array()?))),
        3 => Ok(Value::Float(f64::from_le_bytes(reader.array()?))),
        4 => {
            let len = reader.u32()? as usize;
            let bytes = reader.take(len)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|e| Error::internal(format!("invalid text in spill file: {}", e)))?;
            Ok(Value::Text(Arc::from(s)))
        }
        8 => {
            let secs = i64::from_le_bytes(reader.array()?);
            let nanos = reader.u32()?;
            DateTime::<Utc>::from_timestamp(secs, nanos)
                .map(Value::Timestamp)
                .ok_or_else(|| Error::internal("invalid timestamp in spill file"))
        }
        9 => {
            let len = reader.u32()? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_value(reader)?);
            }
            Ok(Value::Array(Arc::from(items)))
        }
        tag => Err(Error::internal(format!("unknown value tag {} in spill file", tag))),
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(Error::internal("truncated spill record"));
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn store_with(n: i64, work_mem: usize) -> Tuplestore {
        let mut store = Tuplestore::new(TuplestoreConfig {
            work_mem_bytes: work_mem,
            temp_dir: None,
        });
        for i in 0..n {
            store.append(row![i, format!("row-{}", i)]).unwrap();
        }
        store
    }

    #[test]
    fn test_forward_and_backward_reads() {
        let mut store = store_with(3, DEFAULT_WORK_MEM);
        let p = store.alloc_read_pointer(PointerFlags::BACKWARD);
        store.select(p).unwrap();
        assert_eq!(store.gettupleslot(true, false).unwrap().unwrap()[0], Value::integer(0));
        assert_eq!(store.gettupleslot(true, false).unwrap().unwrap()[0], Value::integer(1));
        // Backward read returns the row just passed
        assert_eq!(store.gettupleslot(false, false).unwrap().unwrap()[0], Value::integer(1));
        assert_eq!(store.gettupleslot(false, false).unwrap().unwrap()[0], Value::integer(0));
        assert!(store.gettupleslot(false, false).unwrap().is_none());
        assert_eq!(store.position(p).unwrap(), 0);
    }

    #[test]
    fn test_end_of_store_is_not_an_error() {
        let mut store = store_with(1, DEFAULT_WORK_MEM);
        assert!(store.gettupleslot(true, false).unwrap().is_some());
        assert!(store.gettupleslot(true, false).unwrap().is_none());
        assert!(!store.skiptuples(5, true).unwrap());
        store.append(row![9i64, "late"]).unwrap();
        assert_eq!(store.gettupleslot(true, false).unwrap().unwrap()[0], Value::integer(9));
    }

    #[test]
    fn test_mark_bounds_backward_movement() {
        let mut store = store_with(5, DEFAULT_WORK_MEM);
        let p = store.alloc_read_pointer(PointerFlags::BACKWARD);
        store.set_mark(p, 2).unwrap();
        assert_eq!(store.position(p).unwrap(), 2);
        store.select(p).unwrap();
        assert!(!store.skiptuples(1, false).unwrap());
        assert_eq!(store.position(p).unwrap(), 2);
        assert!(store.set_mark(p, 1).unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_forward_only_pointer_rejects_backward() {
        let mut store = store_with(2, DEFAULT_WORK_MEM);
        store.select(0).unwrap();
        assert!(store.gettupleslot(false, false).is_err());
        assert!(store.skiptuples(1, false).is_err());
    }

    #[test]
    fn test_trim_discards_below_oldest_floor() {
        let mut store = store_with(6, DEFAULT_WORK_MEM);
        let p = store.alloc_read_pointer(PointerFlags::BACKWARD);
        store.select(0).unwrap();
        store.skiptuples(6, true).unwrap();
        store.set_mark(p, 4).unwrap();
        store.trim();
        assert_eq!(store.first_retained(), 4);
        store.select(p).unwrap();
        assert_eq!(store.gettupleslot(true, false).unwrap().unwrap()[0], Value::integer(4));
    }

    #[test]
    fn test_spill_keeps_sequence_contract() {
        let mut store = store_with(200, 512);
        assert!(!store.in_memory());
        assert_eq!(store.spill_count(), 1);
        let p = store.alloc_read_pointer(PointerFlags::BACKWARD);
        store.select(p).unwrap();
        store.skiptuples(150, true).unwrap();
        let row = store.gettupleslot(true, true).unwrap().unwrap();
        assert_eq!(row, row![150i64, "row-150"]);
        let back = store.gettupleslot(false, false).unwrap().unwrap();
        assert_eq!(back[0], Value::integer(150));
        store.append(row![200i64, "row-200"]).unwrap();
        store.skiptuples(50, true).unwrap();
        assert_eq!(store.gettupleslot(true, false).unwrap().unwrap()[0], Value::integer(200));
    }

    #[test]
    fn test_spill_codec_preserves_every_type() {
        let ts = crate::core::parse_timestamp("2024-03-01 12:30:45").unwrap();
        let original = Row::from_values(vec![
            Value::null(DataType::Float),
            Value::boolean(true),
            Value::integer(-7),
            Value::float(2.5),
            Value::text("héllo"),
            Value::timestamp(ts),
            Value::array(vec![Value::integer(1), Value::text("x")]),
        ]);
        let mut store = Tuplestore::new(TuplestoreConfig {
            work_mem_bytes: 0,
            temp_dir: None,
        });
        store.append(original.clone()).unwrap();
        assert!(!store.in_memory());
        let back = store.gettupleslot(true, false).unwrap().unwrap();
        assert_eq!(back, original);
        assert_eq!(back[0].data_type(), DataType::Float);
    }

    #[test]
    fn test_clear_resets_pointers() {
        let mut store = store_with(3, DEFAULT_WORK_MEM);
        let p = store.alloc_read_pointer(PointerFlags::BACKWARD);
        store.set_mark(p, 2).unwrap();
        store.clear();
        assert_eq!(store.row_count(), 0);
        assert_eq!(store.mark(p).unwrap(), 0);
        assert_eq!(store.position(p).unwrap(), 0);
    }
}
