//! Container emitter

use crate::plan::WritePlan;
use crate::{Error, Result, WriteOptions};
use avb_core::record::{tag, wire_count};
use avb_core::{AvbFile, Error as CoreError, FileHeader, Writer};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use tracing::debug;

/// Outcome of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// Chunks written, excluding the root chunk
    pub objects: u32,
    /// Bytes written, header included
    pub bytes: u64,
}

/// Writes every object reachable from the file's content to `out`
pub fn write_to<W: Write + Seek>(
    file: &AvbFile,
    out: &mut W,
    options: &WriteOptions,
) -> Result<WriteSummary> {
    let plan = WritePlan::build(file)?;
    let order = options.byte_order;

    let mut header = file.header().clone();
    header.byte_order = order;
    header.object_count = 0;
    header.root_index = 0;
    if options.update_save_time {
        header.touch();
    }

    let start = out.stream_position()?;
    let count_pos = header.write(out)?;

    for obj in plan.objects() {
        let obj = obj.borrow();
        let class = obj.class();
        let class_id = class.class_id.ok_or(CoreError::NotAChunkClass(class.name))?;

        let body = class.encode(&obj, order, Some(plan.mapping()))?;
        if body.last() != Some(&tag::END) {
            return Err(Error::UnterminatedRecord { class: class.name });
        }

        let mut w = Writer::new(&mut *out, order);
        w.write_fourcc(class_id)?;
        w.write_u32_le(wire_count(class.name, "chunk", body.len())?)?;
        w.write_bytes(&body)?;
    }

    let objects: u32 = wire_count("FileHeader", "objects", plan.len())?;
    FileHeader::patch_count(out, count_pos, order, objects)?;
    let bytes = out.stream_position()? - start;

    debug!(objects, bytes, byte_order = ?order, "wrote AVB file");
    Ok(WriteSummary { objects, bytes })
}

/// Writes `file` to a new file at `path`
pub fn write_file<P: AsRef<Path>>(
    file: &AvbFile,
    path: P,
    options: &WriteOptions,
) -> Result<WriteSummary> {
    let mut out = BufWriter::new(File::create(path)?);
    let summary = write_to(file, &mut out, options)?;
    out.flush()?;
    Ok(summary)
}

/// Write support on [`AvbFile`]
pub trait AvbFileExt {
    /// Writes with default options
    fn write<P: AsRef<Path>>(&self, path: P) -> Result<WriteSummary>;

    fn write_with<P: AsRef<Path>>(&self, path: P, options: &WriteOptions) -> Result<WriteSummary>;
}

impl AvbFileExt for AvbFile {
    fn write<P: AsRef<Path>>(&self, path: P) -> Result<WriteSummary> {
        write_file(self, path, &WriteOptions::default())
    }

    fn write_with<P: AsRef<Path>>(&self, path: P, options: &WriteOptions) -> Result<WriteSummary> {
        write_file(self, path, options)
    }
}
