//! Minimal TON cell model and bag-of-cells (BOC) codec
//!
//! Covers exactly what the miner needs: decoding the solver's artifact,
//! assembling wallet messages, and hashing cells for addresses and
//! signatures. Exotic cells and cell levels are out of scope and rejected.

use crate::utils::crc32c;
use crate::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// BOC envelope magic (serialized_boc_idx variants share the prefix)
const BOC_MAGIC: u32 = 0xb5ee_9c72;

/// Maximum data bits per cell
pub const MAX_CELL_BITS: usize = 1023;
/// Maximum references per cell
pub const MAX_CELL_REFS: usize = 4;

/// An ordinary TON cell: up to 1023 data bits plus up to four references.
#[derive(Clone, PartialEq, Eq)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl Cell {
    /// Number of data bits
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Raw data bytes (padding bits are zero, no completion tag)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Cell references
    pub fn refs(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    /// Begin reading this cell
    pub fn as_slice(&self) -> CellSlice<'_> {
        CellSlice {
            cell: self,
            bit_pos: 0,
            ref_pos: 0,
        }
    }

    /// Cell depth: zero for leaves, one more than the deepest reference
    pub fn depth(&self) -> u16 {
        self.refs
            .iter()
            .map(|r| r.depth().saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// Data bytes with the completion tag applied for serialization/hashing
    fn data_with_completion_tag(&self) -> Vec<u8> {
        let mut bytes = self.data.clone();
        if self.bit_len % 8 != 0 {
            let last = self.bit_len / 8;
            bytes[last] |= 0x80 >> (self.bit_len % 8);
        }
        bytes
    }

    /// First descriptor byte: reference count (level and exotic bits unused)
    fn d1(&self) -> u8 {
        self.refs.len() as u8
    }

    /// Second descriptor byte: data length in half-bytes
    fn d2(&self) -> u8 {
        ((self.bit_len / 8) + (self.bit_len + 7) / 8) as u8
    }

    /// Standard cell representation hash (sha256 over descriptors, data,
    /// reference depths, and reference hashes)
    pub fn repr_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update([self.d1(), self.d2()]);
        hasher.update(self.data_with_completion_tag());
        for r in &self.refs {
            hasher.update(r.depth().to_be_bytes());
        }
        for r in &self.refs {
            hasher.update(r.repr_hash());
        }
        hasher.finalize().into()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cell{{{}[{}b], {} refs}}",
            hex::encode(self.data_with_completion_tag()),
            self.bit_len,
            self.refs.len()
        )
    }
}

/// Bit-level writer for assembling cells
#[derive(Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl CellBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single bit
    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self> {
        if self.bit_len >= MAX_CELL_BITS {
            return Err(Error::boc("cell data overflow"));
        }
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
        Ok(self)
    }

    /// Append the low `bits` bits of `value`, most significant bit first
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self> {
        if bits > 64 {
            return Err(Error::boc(format!("uint width {} exceeds 64 bits", bits)));
        }
        for i in (0..bits).rev() {
            self.store_bit((value >> i) & 1 == 1)?;
        }
        Ok(self)
    }

    /// Append whole bytes (need not be byte-aligned)
    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        for &b in bytes {
            self.store_uint(b as u64, 8)?;
        }
        Ok(self)
    }

    /// Append a variable-length coin amount (Grams): 4-bit byte length
    /// followed by the big-endian value
    pub fn store_coins(&mut self, nanotons: u64) -> Result<&mut Self> {
        let len = (8 - nanotons.leading_zeros() as usize / 8).min(8);
        let len = if nanotons == 0 { 0 } else { len };
        self.store_uint(len as u64, 4)?;
        self.store_uint(nanotons, len * 8)?;
        Ok(self)
    }

    /// Append all data bits and references of `cell`
    pub fn store_cell(&mut self, cell: &Cell) -> Result<&mut Self> {
        let mut slice = cell.as_slice();
        while slice.remaining_bits() > 0 {
            let take = slice.remaining_bits().min(64);
            let chunk = slice.load_uint(take)?;
            self.store_uint(chunk, take)?;
        }
        for r in cell.refs() {
            self.store_ref(Arc::clone(r))?;
        }
        Ok(self)
    }

    /// Attach a reference
    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<&mut Self> {
        if self.refs.len() >= MAX_CELL_REFS {
            return Err(Error::boc("cell reference overflow"));
        }
        self.refs.push(cell);
        Ok(self)
    }

    /// Finish the cell
    pub fn build(self) -> Result<Cell> {
        Ok(Cell {
            data: self.data,
            bit_len: self.bit_len,
            refs: self.refs,
        })
    }
}

/// Bit-level reader over a cell
pub struct CellSlice<'a> {
    cell: &'a Cell,
    bit_pos: usize,
    ref_pos: usize,
}

impl<'a> CellSlice<'a> {
    /// Unread data bits
    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len - self.bit_pos
    }

    /// Unread references
    pub fn remaining_refs(&self) -> usize {
        self.cell.refs.len() - self.ref_pos
    }

    /// Read one bit
    pub fn load_bit(&mut self) -> Result<bool> {
        if self.remaining_bits() == 0 {
            return Err(Error::boc("cell slice data underflow"));
        }
        let byte = self.cell.data[self.bit_pos / 8];
        let bit = byte & (0x80 >> (self.bit_pos % 8)) != 0;
        self.bit_pos += 1;
        Ok(bit)
    }

    /// Read an unsigned big-endian integer of `bits` bits
    pub fn load_uint(&mut self, bits: usize) -> Result<u64> {
        if bits > 64 {
            return Err(Error::boc(format!("uint width {} exceeds 64 bits", bits)));
        }
        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | self.load_bit()? as u64;
        }
        Ok(value)
    }

    /// Read the next reference
    pub fn load_ref(&mut self) -> Result<Arc<Cell>> {
        let cell = self
            .cell
            .refs
            .get(self.ref_pos)
            .cloned()
            .ok_or_else(|| Error::boc("cell slice reference underflow"))?;
        self.ref_pos += 1;
        Ok(cell)
    }
}

/// Deserialize a standard BOC and return its root cells, first root first.
pub fn deserialize_boc(bytes: &[u8]) -> Result<Vec<Arc<Cell>>> {
    let mut reader = BocReader { bytes, pos: 0 };

    let magic = reader.read_u32()?;
    if magic != BOC_MAGIC {
        return Err(Error::boc(format!("bad BOC magic: {:#010x}", magic)));
    }

    let flags = reader.read_u8()?;
    let has_idx = flags & 0x80 != 0;
    let has_crc = flags & 0x40 != 0;
    let has_cache_bits = flags & 0x20 != 0;
    if has_cache_bits {
        return Err(Error::boc("cache bits are not supported"));
    }
    let ref_size = (flags & 0x07) as usize;
    if ref_size == 0 || ref_size > 4 {
        return Err(Error::boc(format!("invalid reference size: {}", ref_size)));
    }

    let offset_size = reader.read_u8()? as usize;
    if offset_size == 0 || offset_size > 8 {
        return Err(Error::boc(format!("invalid offset size: {}", offset_size)));
    }

    let cell_count = reader.read_be(ref_size)? as usize;
    let root_count = reader.read_be(ref_size)? as usize;
    let absent_count = reader.read_be(ref_size)? as usize;
    let total_cells_size = reader.read_be(offset_size)? as usize;

    if absent_count != 0 {
        return Err(Error::boc("absent cells are not supported"));
    }
    if root_count == 0 {
        return Err(Error::boc("BOC has no root cells"));
    }

    let mut root_indices = Vec::with_capacity(root_count);
    for _ in 0..root_count {
        let idx = reader.read_be(ref_size)? as usize;
        if idx >= cell_count {
            return Err(Error::boc("root index out of range"));
        }
        root_indices.push(idx);
    }

    if has_idx {
        reader.skip(cell_count * offset_size)?;
    }

    let cells_start = reader.pos;

    // First pass: raw descriptors, data, and forward reference indices.
    let mut raw_cells = Vec::with_capacity(cell_count);
    for i in 0..cell_count {
        let d1 = reader.read_u8()?;
        let d2 = reader.read_u8()?;
        if d1 & 0x08 != 0 {
            return Err(Error::boc("exotic cells are not supported"));
        }
        if d1 >= 0x20 {
            return Err(Error::boc("cell levels are not supported"));
        }
        let ref_count = (d1 & 0x07) as usize;
        if ref_count > MAX_CELL_REFS {
            return Err(Error::boc(format!("cell has {} references", ref_count)));
        }

        let data_bytes = ((d2 as usize) + 1) / 2;
        let full_bytes = d2 % 2 == 0;
        let raw = reader.read_bytes(data_bytes)?.to_vec();

        let bit_len = if full_bytes {
            data_bytes * 8
        } else {
            // Completion tag: drop trailing zeros and the final one bit.
            let last = *raw
                .last()
                .ok_or_else(|| Error::boc("padded cell with no data"))?;
            if last == 0 {
                return Err(Error::boc("missing completion tag"));
            }
            data_bytes * 8 - last.trailing_zeros() as usize - 1
        };

        let mut ref_indices = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            let idx = reader.read_be(ref_size)? as usize;
            if idx <= i || idx >= cell_count {
                return Err(Error::boc("cell reference is not topologically ordered"));
            }
            ref_indices.push(idx);
        }

        raw_cells.push((raw, bit_len, ref_indices));
    }

    if reader.pos - cells_start != total_cells_size {
        return Err(Error::boc(format!(
            "cell data size mismatch: header says {}, read {}",
            total_cells_size,
            reader.pos - cells_start
        )));
    }

    if has_crc {
        let expected = crc32c(&bytes[..reader.pos]);
        let stored = u32::from_le_bytes(
            reader
                .read_bytes(4)?
                .try_into()
                .map_err(|_| Error::boc("truncated checksum"))?,
        );
        if expected != stored {
            return Err(Error::boc(format!(
                "checksum mismatch: expected {:#010x}, found {:#010x}",
                expected, stored
            )));
        }
    }

    // Second pass, back to front: references always point forward.
    let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
    for i in (0..cell_count).rev() {
        let (raw, bit_len, ref_indices) = &raw_cells[i];
        let mut data = raw.clone();
        if bit_len % 8 != 0 {
            // Strip the completion tag back out of the stored bytes.
            let last = bit_len / 8;
            data[last] &= 0xffu8 << (8 - bit_len % 8);
        }
        let refs = ref_indices
            .iter()
            .map(|&idx| {
                built[idx]
                    .clone()
                    .ok_or_else(|| Error::boc("dangling cell reference"))
            })
            .collect::<Result<Vec<_>>>()?;
        built[i] = Some(Arc::new(Cell {
            data,
            bit_len: *bit_len,
            refs,
        }));
    }

    root_indices
        .iter()
        .map(|&idx| {
            built[idx]
                .clone()
                .ok_or_else(|| Error::boc("missing root cell"))
        })
        .collect()
}

/// Serialize a single-root BOC with a CRC-32C trailer.
pub fn serialize_boc(root: &Arc<Cell>) -> Result<Vec<u8>> {
    // Reverse post-order DFS yields a topological order with every
    // reference pointing forward.
    let mut order: Vec<Arc<Cell>> = Vec::new();
    let mut index: HashMap<[u8; 32], usize> = HashMap::new();
    collect_cells(root, &mut order, &mut index)?;
    order.reverse();
    for (i, cell) in order.iter().enumerate() {
        index.insert(cell.repr_hash(), i);
    }

    let cell_count = order.len();
    let ref_size = bytes_for(cell_count as u64);

    let mut cells_data = Vec::new();
    for cell in &order {
        cells_data.push(cell.d1());
        cells_data.push(cell.d2());
        cells_data.extend_from_slice(&cell.data_with_completion_tag());
        for r in cell.refs() {
            let idx = index[&r.repr_hash()] as u64;
            write_be(&mut cells_data, idx, ref_size);
        }
    }

    let offset_size = bytes_for(cells_data.len() as u64);

    let mut out = Vec::with_capacity(cells_data.len() + 32);
    let mut magic = [0u8; 4];
    BigEndian::write_u32(&mut magic, BOC_MAGIC);
    out.extend_from_slice(&magic);
    out.push(0x40 | ref_size as u8); // crc flag + ref size
    out.push(offset_size as u8);
    write_be(&mut out, cell_count as u64, ref_size);
    write_be(&mut out, 1, ref_size); // roots
    write_be(&mut out, 0, ref_size); // absent
    write_be(&mut out, cells_data.len() as u64, offset_size);
    write_be(&mut out, 0, ref_size); // root index
    out.extend_from_slice(&cells_data);

    let crc = crc32c(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

fn collect_cells(
    cell: &Arc<Cell>,
    order: &mut Vec<Arc<Cell>>,
    seen: &mut HashMap<[u8; 32], usize>,
) -> Result<()> {
    let hash = cell.repr_hash();
    if seen.contains_key(&hash) {
        return Ok(());
    }
    seen.insert(hash, 0);
    for r in cell.refs() {
        collect_cells(r, order, seen)?;
    }
    order.push(Arc::clone(cell));
    Ok(())
}

/// Minimal number of bytes needed to represent `value` (at least one)
fn bytes_for(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    ((bits + 7) / 8).max(1)
}

fn write_be(out: &mut Vec<u8>, value: u64, size: usize) {
    for i in (0..size).rev() {
        out.push((value >> (i * 8)) as u8);
    }
}

/// Byte cursor over the BOC envelope
struct BocReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BocReader<'a> {
    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.bytes.len() {
            return Err(Error::boc(format!(
                "truncated BOC: need {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.bytes.len() - self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    fn read_be(&mut self, size: usize) -> Result<u64> {
        let mut value = 0u64;
        for &b in self.read_bytes(size)? {
            value = (value << 8) | b as u64;
        }
        Ok(value)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(bits: u64, width: usize) -> Arc<Cell> {
        let mut b = CellBuilder::new();
        b.store_uint(bits, width).unwrap();
        Arc::new(b.build().unwrap())
    }

    #[test]
    fn test_builder_and_slice() {
        let mut b = CellBuilder::new();
        b.store_uint(0b1011, 4).unwrap();
        b.store_uint(0xdead, 16).unwrap();
        b.store_bit(true).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(cell.bit_len(), 21);

        let mut s = cell.as_slice();
        assert_eq!(s.load_uint(4).unwrap(), 0b1011);
        assert_eq!(s.load_uint(16).unwrap(), 0xdead);
        assert!(s.load_bit().unwrap());
        assert!(s.load_bit().is_err());
    }

    #[test]
    fn test_store_coins() {
        let mut b = CellBuilder::new();
        b.store_coins(50_000_000).unwrap(); // 0.05 TON
        let cell = b.build().unwrap();
        let mut s = cell.as_slice();
        assert_eq!(s.load_uint(4).unwrap(), 4); // four value bytes
        assert_eq!(s.load_uint(32).unwrap(), 50_000_000);

        let mut b = CellBuilder::new();
        b.store_coins(0).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(cell.bit_len(), 4);
    }

    #[test]
    fn test_repr_hash_changes_with_content() {
        let a = leaf(1, 8);
        let b = leaf(2, 8);
        assert_ne!(a.repr_hash(), b.repr_hash());
        assert_eq!(a.repr_hash(), leaf(1, 8).repr_hash());
    }

    #[test]
    fn test_depth() {
        let inner = leaf(7, 3);
        let mut b = CellBuilder::new();
        b.store_ref(Arc::clone(&inner)).unwrap();
        let mid = Arc::new(b.build().unwrap());
        let mut b = CellBuilder::new();
        b.store_ref(Arc::clone(&mid)).unwrap();
        let outer = b.build().unwrap();
        assert_eq!(inner.depth(), 0);
        assert_eq!(mid.depth(), 1);
        assert_eq!(outer.depth(), 2);
    }

    #[test]
    fn test_boc_round_trip() {
        let body = leaf(0x1234_5678, 32);
        let mut b = CellBuilder::new();
        b.store_uint(0b101, 3).unwrap();
        b.store_ref(Arc::clone(&body)).unwrap();
        b.store_ref(Arc::clone(&body)).unwrap(); // shared reference
        let root = Arc::new(b.build().unwrap());

        let bytes = serialize_boc(&root).unwrap();
        let roots = deserialize_boc(&bytes).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].repr_hash(), root.repr_hash());
        assert_eq!(roots[0].refs().len(), 2);
        assert_eq!(roots[0].bit_len(), 3);
    }

    #[test]
    fn test_shared_subtree_deduplicated() {
        let shared = leaf(42, 16);
        let mut b = CellBuilder::new();
        b.store_ref(Arc::clone(&shared)).unwrap();
        b.store_ref(Arc::clone(&shared)).unwrap();
        let root = Arc::new(b.build().unwrap());

        let bytes = serialize_boc(&root).unwrap();
        // Header declares two cells, not three.
        let roots = deserialize_boc(&bytes).unwrap();
        assert_eq!(roots[0].refs()[0].repr_hash(), roots[0].refs()[1].repr_hash());
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        assert!(deserialize_boc(&[]).is_err());
        assert!(deserialize_boc(&[0x00, 0x01, 0x02, 0x03]).is_err());
        assert!(deserialize_boc(&[0xb5, 0xee, 0x9c]).is_err());

        // Valid BOC with the tail cut off
        let root = Arc::new({
            let mut b = CellBuilder::new();
            b.store_uint(0xff, 8).unwrap();
            b.build().unwrap()
        });
        let bytes = serialize_boc(&root).unwrap();
        assert!(deserialize_boc(&bytes[..bytes.len() - 6]).is_err());
    }

    #[test]
    fn test_deserialize_rejects_corrupted_checksum() {
        let root = Arc::new({
            let mut b = CellBuilder::new();
            b.store_uint(0xabcd, 16).unwrap();
            b.build().unwrap()
        });
        let mut bytes = serialize_boc(&root).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(deserialize_boc(&bytes).is_err());
    }

    #[test]
    fn test_store_cell_copies_bits_and_refs() {
        let inner = leaf(9, 5);
        let mut b = CellBuilder::new();
        b.store_uint(0x3ff, 10).unwrap();
        b.store_ref(Arc::clone(&inner)).unwrap();
        let src = b.build().unwrap();

        let mut b = CellBuilder::new();
        b.store_bit(true).unwrap();
        b.store_cell(&src).unwrap();
        let copy = b.build().unwrap();

        assert_eq!(copy.bit_len(), 11);
        assert_eq!(copy.refs().len(), 1);
        let mut s = copy.as_slice();
        assert!(s.load_bit().unwrap());
        assert_eq!(s.load_uint(10).unwrap(), 0x3ff);
    }
}
