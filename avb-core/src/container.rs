//! AVB container header and chunk table

use crate::codec::{ByteOrder, Reader, Writer};
use crate::types::FourCC;
use crate::{text, Error, Result};
use chrono::{DateTime, Utc};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

/// Magic bytes following the byte order marker: "Domain"
pub const MAGIC: [u8; 6] = *b"Domain";

/// Type code of the synthetic root chunk (index 0)
pub const ROOT_CLASS_ID: FourCC = FourCC::new(b"OBJD");

const DOCUMENT_TYPE: &str = "AObjDoc";
const FORMAT_VERSION: u8 = 0x04;
const SENTINEL: u32 = 0x4949_4949;
const FILE_TYPE: FourCC = FourCC::new(b"ATob");
const CREATOR: FourCC = FourCC::new(b"ATve");

/// Bytes reserved for the creator version, including its u16 length.
const CREATOR_FIELD: usize = 32;
const CREATOR_MAX: usize = CREATOR_FIELD - 2;
const RESERVED: usize = 16;

/// Creator version stamped into new files
pub const DEFAULT_CREATOR: &str = concat!("avb-rs ", env!("CARGO_PKG_VERSION"));

/// AVB file header
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    /// Session byte order, from the two-byte platform marker
    pub byte_order: ByteOrder,
    /// Human-readable save time as stored; regenerated on write
    pub last_save_str: Option<String>,
    /// Number of chunks following the header
    pub object_count: u32,
    /// Chunk index of the content object
    pub root_index: u32,
    /// Save time
    pub last_save: DateTime<Utc>,
    /// Application that wrote the file
    pub creator_version: String,
}

impl FileHeader {
    /// Creates a header for a new, empty file
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            last_save_str: None,
            object_count: 0,
            root_index: 0,
            last_save: crate::classes::now(),
            creator_version: DEFAULT_CREATOR.to_string(),
        }
    }

    /// Stamps the current time as the save time
    pub fn touch(&mut self) {
        self.last_save = crate::classes::now();
    }

    fn save_time_string(&self) -> String {
        self.last_save.format("%Y/%m/%d %H:%M:%S").to_string()
    }

    /// Reads a header, returning it with the root chunk it spans
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<(Self, AvbChunk)> {
        let mut marker = [0u8; 2];
        reader.read_exact(&mut marker)?;
        let byte_order = ByteOrder::from_marker(marker).ok_or_else(|| Error::MalformedHeader {
            field: "byte_order",
            detail: format!("marker {}", hex::encode(marker)),
        })?;

        let mut magic = [0u8; 6];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::MalformedHeader {
                field: "magic",
                detail: format!("{:?}", String::from_utf8_lossy(&magic)),
            });
        }

        let start = reader.stream_position()?;
        let mut r = Reader::new(&mut *reader, byte_order);

        expect(r.read_fourcc()? == ROOT_CLASS_ID, "root_class", "OBJD")?;
        expect(
            r.read_string()?.as_deref() == Some(DOCUMENT_TYPE),
            "document_type",
            DOCUMENT_TYPE,
        )?;
        let version = r.read_u8()?;
        expect(version == FORMAT_VERSION, "version", &format!("{FORMAT_VERSION}, found {version}"))?;

        let last_save_str = r.read_string()?;
        let object_count = r.read_u32()?;
        let root_index = r.read_u32()?;
        let sentinel = r.read_u32()?;
        expect(sentinel == SENTINEL, "sentinel", &format!("{SENTINEL:#x}, found {sentinel:#x}"))?;
        let last_save = r.read_datetime()?;
        r.read_u32()?;
        expect(r.read_fourcc()? == FILE_TYPE, "file_type", "ATob")?;
        expect(r.read_fourcc()? == CREATOR, "creator", "ATve")?;
        let creator_version = r
            .read_string()?
            .map(|s| s.trim_end_matches(' ').to_string())
            .unwrap_or_default();
        r.read_bytes(RESERVED)?;

        let end = reader.stream_position()?;
        reader.seek(SeekFrom::Start(start))?;
        let mut data = vec![0u8; (end - start) as usize];
        reader.read_exact(&mut data)?;

        let header = Self {
            byte_order,
            last_save_str,
            object_count,
            root_index,
            last_save,
            creator_version,
        };
        let root = AvbChunk {
            index: 0,
            class_id: ROOT_CLASS_ID,
            offset: start,
            order: byte_order,
            data,
        };
        Ok((header, root))
    }

    /// Root chunk this header serializes to
    pub fn root_chunk(&self) -> Result<AvbChunk> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)?;
        cursor.set_position(0);
        let (_, root) = Self::read(&mut cursor)?;
        Ok(root)
    }

    /// Writes the header with placeholder counts, returning the offset to patch
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<u64> {
        writer.write_all(&self.byte_order.marker())?;
        writer.write_all(&MAGIC)?;

        let mut w = Writer::new(&mut *writer, self.byte_order);
        w.write_fourcc(ROOT_CLASS_ID)?;
        w.write_string(Some(DOCUMENT_TYPE))?;
        w.write_u8(FORMAT_VERSION)?;
        w.write_string(Some(&self.save_time_string()))?;

        let count_pos = w.get_mut().stream_position()?;
        w.write_u32(self.object_count)?;
        w.write_u32(self.root_index)?;
        w.write_u32(SENTINEL)?;
        w.write_datetime(&self.last_save)?;
        w.write_u32(0)?;
        w.write_fourcc(FILE_TYPE)?;
        w.write_fourcc(CREATOR)?;

        // Fixed-width field: nominal length 30, truncated, space padded.
        let mut creator = text::encode(&self.creator_version)?;
        creator.truncate(CREATOR_MAX);
        creator.resize(CREATOR_MAX, b' ');
        w.write_u16(CREATOR_MAX as u16)?;
        w.write_bytes(&creator)?;
        w.write_bytes(&[0u8; RESERVED])?;

        Ok(count_pos)
    }

    /// Overwrites the object count and root index, leaving the stream at its end
    pub fn patch_count<W: Write + Seek>(
        writer: &mut W,
        count_pos: u64,
        order: ByteOrder,
        count: u32,
    ) -> Result<()> {
        let end = writer.stream_position()?;
        writer.seek(SeekFrom::Start(count_pos))?;
        let mut w = Writer::new(&mut *writer, order);
        w.write_u32(count)?;
        w.write_u32(count)?;
        writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}

fn expect(ok: bool, field: &'static str, expected: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::MalformedHeader {
            field,
            detail: format!("expected {expected}"),
        })
    }
}

/// One object's raw on-disk record
#[derive(Debug, Clone, PartialEq)]
pub struct AvbChunk {
    /// Position in the chunk table
    pub index: u32,
    pub class_id: FourCC,
    /// Stream offset of the body
    pub offset: u64,
    order: ByteOrder,
    data: Vec<u8>,
}

impl AvbChunk {
    /// Body bytes
    pub fn read(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Hex dump of the full record: type code as on disk, LE length, body
    pub fn hex(&self) -> String {
        let mut record = Vec::with_capacity(8 + self.data.len());
        record.extend_from_slice(&self.class_id.to_disk(self.order));
        record.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        record.extend_from_slice(&self.data);
        hex::encode(record)
    }
}

/// Offsets of every chunk; index 0 is the root chunk
#[derive(Debug, Clone)]
pub struct ChunkTable {
    order: ByteOrder,
    root: AvbChunk,
    positions: Vec<u64>,
}

impl ChunkTable {
    /// Table of a file with no chunks besides `root`
    pub fn empty(root: AvbChunk) -> Self {
        Self {
            order: root.order,
            positions: vec![root.offset],
            root,
        }
    }

    /// Walks `count` chunk records starting at the reader's position
    pub fn scan<R: Read + Seek>(reader: &mut R, root: AvbChunk, count: u32) -> Result<Self> {
        let order = root.order;
        let file_len = reader.seek(SeekFrom::End(0))?;
        let mut pos = root.offset + root.len() as u64;
        reader.seek(SeekFrom::Start(pos))?;

        // Every record carries at least its 8-byte type code and length.
        if u64::from(count) > file_len.saturating_sub(pos) / 8 {
            return Err(Error::MalformedHeader {
                field: "chunk_table",
                detail: format!("{count} chunks cannot fit in {} bytes", file_len.saturating_sub(pos)),
            });
        }
        let mut positions = Vec::with_capacity(count as usize + 1);
        positions.push(root.offset);

        let mut r = Reader::new(&mut *reader, order);
        for i in 1..=count {
            positions.push(pos);
            r.read_fourcc()?;
            let len = r.read_u32_le()? as u64;
            let next = pos + 8 + len;
            if next > file_len {
                return Err(Error::MalformedHeader {
                    field: "chunk_table",
                    detail: format!("chunk {i} at {pos:#x} overruns the file ({len} bytes)"),
                });
            }
            r.seek(SeekFrom::Start(next))?;
            pos = next;
        }

        Ok(Self {
            order,
            root,
            positions,
        })
    }

    /// Number of entries, root chunk included
    pub fn len(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.positions.len() <= 1
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// The header chunk at index 0
    pub fn root(&self) -> &AvbChunk {
        &self.root
    }

    pub fn contains(&self, index: u32) -> bool {
        (index as usize) < self.positions.len()
    }

    /// Reads chunk `index` from `reader`
    pub fn read_chunk<R: Read + Seek>(&self, reader: &mut R, index: u32) -> Result<AvbChunk> {
        if index == 0 {
            return Ok(self.root.clone());
        }
        let offset = *self
            .positions
            .get(index as usize)
            .ok_or(Error::InvalidReferenceIndex {
                index,
                len: self.len(),
            })?;

        let mut r = Reader::new(&mut *reader, self.order);
        r.seek(SeekFrom::Start(offset))?;
        let class_id = r.read_fourcc()?;
        let len = r.read_u32_le()? as usize;
        let data = r.read_bytes(len)?;
        Ok(AvbChunk {
            index,
            class_id,
            offset: offset + 8,
            order: self.order,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_file(header: &FileHeader, chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let count_pos = header.write(&mut cursor).unwrap();
        for (code, body) in chunks {
            let mut w = Writer::new(&mut cursor, header.byte_order);
            w.write_fourcc(FourCC::new(code)).unwrap();
            w.write_u32_le(body.len() as u32).unwrap();
            w.write_bytes(body).unwrap();
        }
        FileHeader::patch_count(&mut cursor, count_pos, header.byte_order, chunks.len() as u32)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_header_roundtrip() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let header = FileHeader::new(order);
            let data = write_file(&header, &[]);
            assert_eq!(&data[..2], &order.marker());
            assert_eq!(&data[2..8], b"Domain");

            let (read, root) = FileHeader::read(&mut Cursor::new(&data)).unwrap();
            assert_eq!(read.byte_order, order);
            assert_eq!(read.last_save, header.last_save);
            assert_eq!(read.creator_version, DEFAULT_CREATOR);
            assert_eq!(read.last_save_str, Some(header.save_time_string()));
            assert_eq!(root.class_id, ROOT_CLASS_ID);
            assert_eq!(root.offset, 8);
            assert_eq!(root.len(), data.len() - 8);
        }
    }

    #[test]
    fn test_creator_field_is_fixed_width() {
        let mut short = FileHeader::new(ByteOrder::Little);
        short.creator_version = "x".to_string();
        let mut long = short.clone();
        long.creator_version = "y".repeat(64);

        let a = write_file(&short, &[]);
        let b = write_file(&long, &[]);
        assert_eq!(a.len(), b.len());

        let (read, _) = FileHeader::read(&mut Cursor::new(&b)).unwrap();
        assert_eq!(read.creator_version, "y".repeat(CREATOR_MAX));
    }

    #[test]
    fn test_rejects_bad_marker_and_magic() {
        let data = write_file(&FileHeader::new(ByteOrder::Little), &[]);

        let mut bad = data.clone();
        bad[0] = 0x07;
        assert!(matches!(
            FileHeader::read(&mut Cursor::new(&bad)),
            Err(Error::MalformedHeader { field: "byte_order", .. })
        ));

        let mut bad = data.clone();
        bad[2] = b'd';
        assert!(matches!(
            FileHeader::read(&mut Cursor::new(&bad)),
            Err(Error::MalformedHeader { field: "magic", .. })
        ));

        let sentinel = data
            .windows(4)
            .position(|w| w == SENTINEL.to_le_bytes())
            .unwrap();
        let mut bad = data;
        bad[sentinel] = 0;
        assert!(matches!(
            FileHeader::read(&mut Cursor::new(&bad)),
            Err(Error::MalformedHeader { field: "sentinel", .. })
        ));
    }

    #[test]
    fn test_chunk_table_scan() {
        let header = FileHeader::new(ByteOrder::Little);
        let data = write_file(&header, &[(b"FILL", &[0x02, 0x01, 0x03][..]), (b"ATTR", &[0xAA][..])]);

        let mut cursor = Cursor::new(&data);
        let (read, root) = FileHeader::read(&mut cursor).unwrap();
        assert_eq!(read.object_count, 2);
        assert_eq!(read.root_index, 2);

        let table = ChunkTable::scan(&mut cursor, root, read.object_count).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.contains(2) && !table.contains(3));

        let chunk = table.read_chunk(&mut cursor, 1).unwrap();
        assert_eq!(chunk.class_id, FourCC::new(b"FILL"));
        assert_eq!(chunk.read(), &[0x02, 0x01, 0x03]);
        assert_eq!(chunk.hex(), "4c4c494603000000020103");

        assert_eq!(table.read_chunk(&mut cursor, 0).unwrap().class_id, ROOT_CLASS_ID);
        assert!(matches!(
            table.read_chunk(&mut cursor, 3),
            Err(Error::InvalidReferenceIndex { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_impossible_chunk_count() {
        let header = FileHeader::new(ByteOrder::Little);
        let mut cursor = Cursor::new(Vec::new());
        let count_pos = header.write(&mut cursor).unwrap() as usize;
        let mut data = cursor.into_inner();
        data[count_pos..count_pos + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut cursor = Cursor::new(&data);
        let (read, root) = FileHeader::read(&mut cursor).unwrap();
        assert_eq!(read.object_count, u32::MAX);
        assert!(matches!(
            ChunkTable::scan(&mut cursor, root, read.object_count),
            Err(Error::MalformedHeader { field: "chunk_table", .. })
        ));
    }

    #[test]
    fn test_empty_table_serves_root() {
        let header = FileHeader::new(ByteOrder::Big);
        let table = ChunkTable::empty(header.root_chunk().unwrap());
        assert_eq!(table.len(), 1);
        assert!(table.is_empty());
        let root = table.read_chunk(&mut Cursor::new(Vec::new()), 0).unwrap();
        assert_eq!(root.class_id, ROOT_CLASS_ID);
        assert_eq!(root.offset, 8);
        assert_eq!(&root, table.root());
    }

    #[test]
    fn test_chunk_overrun_is_malformed() {
        let header = FileHeader::new(ByteOrder::Little);
        let mut data = write_file(&header, &[(b"FILL", &[0x02, 0x01, 0x03][..])]);
        data.pop();

        let mut cursor = Cursor::new(&data);
        let (read, root) = FileHeader::read(&mut cursor).unwrap();
        assert!(matches!(
            ChunkTable::scan(&mut cursor, root, read.object_count),
            Err(Error::MalformedHeader { field: "chunk_table", .. })
        ));
    }
}
