//! Streaming backup driver (C8, §4.8): header negotiation against the
//! server, a per-volume receive loop multiplexed over one long-lived
//! request, optional LZO1X decompression, and a final patch-back of the
//! header's LSA/end-time fields once the server reports them.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::buffer::{PackedReader, PackedWriter};
use crate::protocol::codec::{pack_lsa, unpack_lsa, Lsa};
use crate::protocol::constants::{
    Opcode, BK_BACKUP_HEADER_IO_SIZE, BK_BACKUP_MINIMUM_NUM_PAGES_FULL_LEVEL,
    BK_BACKUP_PAGE_OVERHEAD, END_PAGE_ID, FULL_LEVEL_EXP,
};

/// The system's base I/O page size, used for the destination partition's
/// free-space check (§4.8 step 2). CUBRID's own default; unrelated to the
/// backup stream's own page size negotiated in the header.
const IO_PAGESIZE: u64 = 4096;

/// Compression method negotiated for this backup session (§3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipMethod {
    None,
    Lzo1x,
}

/// Options a caller passes to `run_backup`/`Connection::backup_prepare`
/// (§4.8 step 1's `(num_threads, do_compress, sleep_msecs, make_slave)`).
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub num_threads: i32,
    pub do_compress: bool,
    pub sleep_msecs: i32,
    pub make_slave: bool,
    pub force_overwrite: bool,
}

/// The header persisted at offset 0 of the backup volume (§3 "Backup
/// session"). `backuptime_lsa`/`end_time` start at their sentinel values
/// and are only filled in by [`BackupSession::finish`].
#[derive(Debug, Clone)]
pub struct BackupHeader {
    pub magic: [u8; 16],
    pub db_version: i32,
    pub header_version: i32,
    pub db_creation_time: i64,
    pub start_time: i64,
    pub db_name: String,
    pub db_host: String,
    pub server_io_page_size: i32,
    pub checkpoint_lsa: Lsa,
    pub backup_io_page_size: i32,
    pub first_arv_needed: i32,
    pub run_nxchkpt_atpageid: i32,
    pub num_perm_vols: i32,
    pub zip_method: ZipMethod,
    pub make_slave: bool,
    pub backuptime_lsa: Lsa,
    pub end_time: i64,
}

fn unpack_header_from_wire(r: &mut PackedReader, zip_method: ZipMethod, make_slave: bool) -> Result<BackupHeader> {
    let magic_bytes = r.read_bytes(16)?;
    let mut magic = [0u8; 16];
    magic.copy_from_slice(&magic_bytes);
    let db_version = r.read_i32()?;
    let header_version = r.read_i32()?;
    r.align8()?;
    let db_creation_time = r.read_i64()?;
    let start_time = r.read_i64()?;
    let db_name = r.read_string_prefixed()?;
    let db_host = r.read_string_prefixed()?;
    let server_io_page_size = r.read_i32()?;
    let checkpoint_lsa = unpack_lsa(r)?;
    let backup_io_page_size = r.read_i32()?;
    let first_arv_needed = r.read_i32()?;
    let run_nxchkpt_atpageid = r.read_i32()?;
    let num_perm_vols = r.read_i32()?;
    Ok(BackupHeader {
        magic,
        db_version,
        header_version,
        db_creation_time,
        start_time,
        db_name,
        db_host,
        server_io_page_size,
        checkpoint_lsa,
        backup_io_page_size,
        first_arv_needed,
        run_nxchkpt_atpageid,
        num_perm_vols,
        zip_method,
        make_slave,
        backuptime_lsa: Lsa::NULL,
        end_time: -1,
    })
}

/// Pack `h` into a fixed `BK_BACKUP_HEADER_IO_SIZE` block, returning the
/// byte offsets of the `backuptime_lsa`/`end_time` fields so the finish
/// step can seek straight to them.
fn pack_header(h: &BackupHeader) -> Result<(Bytes, u64, u64)> {
    let mut w = PackedWriter::with_capacity(BK_BACKUP_HEADER_IO_SIZE);
    w.write_bytes(&h.magic);
    w.write_i32(h.db_version);
    w.write_i32(h.header_version);
    w.align8();
    w.write_i64(h.db_creation_time);
    w.write_i64(h.start_time);
    w.write_string_prefixed(&h.db_name);
    w.write_string_prefixed(&h.db_host);
    w.write_i32(h.server_io_page_size);
    pack_lsa(&mut w, &h.checkpoint_lsa);
    w.write_i32(h.backup_io_page_size);
    w.write_i32(h.first_arv_needed);
    w.write_i32(h.run_nxchkpt_atpageid);
    w.write_i32(h.num_perm_vols);
    w.write_u8(matches!(h.zip_method, ZipMethod::Lzo1x) as u8);
    w.write_u8(h.make_slave as u8);
    w.align8();
    let backuptime_lsa_offset = w.len() as u64;
    pack_lsa(&mut w, &h.backuptime_lsa);
    let end_time_offset = w.len() as u64;
    w.write_i64(h.end_time);
    let written = w.len();
    if written > BK_BACKUP_HEADER_IO_SIZE {
        return Err(Error::protocol("backup header exceeds its fixed I/O block"));
    }
    w.write_zeros(BK_BACKUP_HEADER_IO_SIZE - written);
    Ok((w.freeze(), backuptime_lsa_offset, end_time_offset))
}

/// One packet in the per-volume streaming receive loop (§4.8 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacketTag {
    VolStart,
    VolEnd,
    Data,
    VolsBackupEnd,
    LogsBackupEnd,
}

impl PacketTag {
    fn from_i32(v: i32) -> Result<Self> {
        Ok(match v {
            0 => PacketTag::VolStart,
            1 => PacketTag::VolEnd,
            2 => PacketTag::Data,
            3 => PacketTag::VolsBackupEnd,
            4 => PacketTag::LogsBackupEnd,
            other => return Err(Error::protocol(format!("unknown backup packet tag {other}"))),
        })
    }

    fn is_loop_end(self) -> bool {
        matches!(self, PacketTag::VolsBackupEnd | PacketTag::LogsBackupEnd)
    }
}

/// A live backup session: the negotiated header, the open destination, and
/// the running byte counter (§3 "Backup session").
pub struct BackupSession {
    header: BackupHeader,
    file: File,
    path: PathBuf,
    io_size: usize,
    #[allow(dead_code)]
    sleep_msecs: i32,
    voltotalio: u64,
    backuptime_lsa_offset: u64,
    end_time_offset: u64,
    /// One open file per server volume, used only in `make_slave` mode.
    slave_volumes: Vec<File>,
}

impl BackupSession {
    pub fn header(&self) -> &BackupHeader {
        &self.header
    }

    pub fn bytes_written(&self) -> u64 {
        self.voltotalio
    }

    async fn write_header_block(&mut self) -> Result<()> {
        let (bytes, backuptime_lsa_offset, end_time_offset) = pack_header(&self.header)?;
        self.backuptime_lsa_offset = backuptime_lsa_offset;
        self.end_time_offset = end_time_offset;
        self.file.seek(std::io::SeekFrom::Start(0)).await?;
        write_retrying(&mut self.file, &bytes).await?;
        self.voltotalio += bytes.len() as u64;
        Ok(())
    }

    /// Drive the per-volume receive loop for either the database-volume or
    /// log-volume phase (§4.8 steps 3-4), ending when a `*BackupEnd` packet
    /// arrives.
    async fn receive_volumes(&mut self, conn: &mut Connection, opcode: Opcode) -> Result<()> {
        loop {
            let mut r = conn.dispatcher.dispatch(opcode, &[]).await?;
            let tag = PacketTag::from_i32(r.read_i32()?)?;
            let unzip_nbytes = r.read_i32()?;

            match tag {
                PacketTag::VolsBackupEnd | PacketTag::LogsBackupEnd => {
                    r.align8()?;
                    let lsa = unpack_lsa(&mut r)?;
                    let end_time = r.read_i64()?;
                    if lsa == Lsa::NULL || end_time <= 0 {
                        return Err(Error::protocol("backup end packet missing final lsa/end_time"));
                    }
                    self.header.backuptime_lsa = lsa;
                    self.header.end_time = end_time;
                    return Ok(());
                }
                PacketTag::VolStart => {
                    log::debug!("backup: starting new server volume");
                    if self.header.make_slave {
                        self.slave_volumes.push(self.open_slave_volume_file().await?);
                    }
                    self.write_packet(&mut r, unzip_nbytes).await?;
                }
                PacketTag::VolEnd => {
                    log::debug!("backup: volume complete, {} bytes so far", self.voltotalio);
                }
                PacketTag::Data => {
                    self.write_packet(&mut r, unzip_nbytes).await?;
                }
            }

            if tag.is_loop_end() {
                unreachable!("handled above");
            }
        }
    }

    async fn open_slave_volume_file(&self) -> Result<File> {
        let index = self.slave_volumes.len();
        let dir = self.path.with_extension("slave");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}_vol{:03}", self.header.db_name, index));
        Ok(OpenOptions::new().write(true).create(true).truncate(true).open(path).await?)
    }

    /// Decompress (if needed) and write one data/vol-start packet (§4.8
    /// step 5).
    async fn write_packet(&mut self, r: &mut PackedReader, unzip_nbytes: i32) -> Result<()> {
        let unzip_nbytes = unzip_nbytes as usize;
        let page: Bytes = match self.header.zip_method {
            ZipMethod::None => r.read_bytes(unzip_nbytes)?,
            ZipMethod::Lzo1x => {
                let compressed_len = r.read_i32()? as usize;
                if compressed_len == 0 || compressed_len > unzip_nbytes {
                    return Err(Error::LzoCompressFail);
                }
                if compressed_len == unzip_nbytes {
                    r.read_bytes(compressed_len)?
                } else {
                    let compressed = r.read_bytes(compressed_len)?;
                    let decompressed = minilzo::decompress(&compressed, unzip_nbytes)
                        .map_err(|_| Error::LzoDecompressFail)?;
                    if decompressed.len() != unzip_nbytes {
                        return Err(Error::DatasizeMismatch {
                            expected: unzip_nbytes,
                            actual: decompressed.len(),
                        });
                    }
                    Bytes::from(decompressed)
                }
            }
        };

        if self.header.make_slave {
            if page.len() < BK_BACKUP_PAGE_OVERHEAD {
                return Err(Error::DatasizeMismatch {
                    expected: BK_BACKUP_PAGE_OVERHEAD,
                    actual: page.len(),
                });
            }
            let inner = page.slice(BK_BACKUP_PAGE_OVERHEAD..);
            let file = self
                .slave_volumes
                .last_mut()
                .ok_or_else(|| Error::protocol("backup data packet before VOL_START"))?;
            write_retrying(file, &inner).await?;
            self.voltotalio += inner.len() as u64;
        } else {
            write_retrying(&mut self.file, &page).await?;
            self.voltotalio += page.len() as u64;
        }
        Ok(())
    }

    /// Write the sentinel end page (unless `make_slave`) and patch the
    /// header's LSA/end-time fields back in (§4.8 step 6).
    pub async fn finish(&mut self) -> Result<()> {
        if self.header.backuptime_lsa == Lsa::NULL || self.header.end_time <= 0 {
            return Err(Error::protocol("finish() called before the server reported backuptime_lsa/end_time"));
        }

        if !self.header.make_slave {
            let mut end_page = vec![0u8; self.io_size];
            end_page[0..4].copy_from_slice(&END_PAGE_ID.to_be_bytes());
            write_retrying(&mut self.file, &end_page).await?;
            self.voltotalio += end_page.len() as u64;

            self.file.seek(std::io::SeekFrom::Start(self.backuptime_lsa_offset)).await?;
            let mut w = PackedWriter::new();
            pack_lsa(&mut w, &self.header.backuptime_lsa);
            write_retrying(&mut self.file, &w.freeze()).await?;

            self.file.seek(std::io::SeekFrom::Start(self.end_time_offset)).await?;
            let mut w = PackedWriter::new();
            w.write_i64(self.header.end_time);
            write_retrying(&mut self.file, &w.freeze()).await?;

            self.file.flush().await?;
        } else {
            let first = self
                .slave_volumes
                .first_mut()
                .ok_or_else(|| Error::protocol("make_slave backup produced no volumes"))?;
            first.seek(std::io::SeekFrom::Start(self.backuptime_lsa_offset)).await?;
            let mut w = PackedWriter::new();
            pack_lsa(&mut w, &self.header.backuptime_lsa);
            write_retrying(&mut *first, &w.freeze()).await?;

            first.seek(std::io::SeekFrom::Start(self.end_time_offset)).await?;
            let mut w = PackedWriter::new();
            w.write_i64(self.header.end_time);
            write_retrying(&mut *first, &w.freeze()).await?;
            first.flush().await?;
        }

        Ok(())
    }

    /// Unlink whatever volume(s) were created and drop the session (§4.8
    /// step 7).
    pub async fn abort(self) {
        if self.header.make_slave {
            let dir = self.path.with_extension("slave");
            let _ = tokio::fs::remove_dir_all(&dir).await;
        } else {
            let _ = tokio::fs::remove_file(&self.path).await;
        }
    }
}

async fn write_retrying(file: &mut File, buf: &[u8]) -> Result<()> {
    match file.write_all(buf).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::OutOfMemory || e.raw_os_error() == Some(28) => {
            Err(Error::WriteOutOfSpace)
        }
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(unix)]
async fn check_free_space(path: &Path) -> Result<()> {
    use nix::sys::statvfs::statvfs;
    let path = path.to_path_buf();
    let stat = tokio::task::spawn_blocking(move || statvfs(&path))
        .await
        .map_err(|_| Error::protocol("free-space check task panicked"))?
        .map_err(|_| Error::protocol("statvfs failed"))?;
    let free_bytes = stat.blocks_available() as u64 * stat.fragment_size() as u64;
    let free_pages = free_bytes / IO_PAGESIZE;
    if free_pages < BK_BACKUP_MINIMUM_NUM_PAGES_FULL_LEVEL {
        return Err(Error::FormatOutOfSpace {
            needed_pages: BK_BACKUP_MINIMUM_NUM_PAGES_FULL_LEVEL,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
async fn check_free_space(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
async fn open_fifo_with_retry(path: &Path) -> Result<File> {
    use nix::errno::Errno;
    use nix::fcntl::{open, OFlag};
    use nix::sys::stat::Mode;
    use std::os::fd::FromRawFd;

    let path = path.to_path_buf();
    loop {
        let path = path.clone();
        let attempt = tokio::task::spawn_blocking(move || open(&path, OFlag::O_WRONLY | OFlag::O_NONBLOCK, Mode::empty()))
            .await
            .map_err(|_| Error::protocol("fifo open task panicked"))?;
        match attempt {
            Ok(fd) => {
                let std_file = unsafe { std::fs::File::from_raw_fd(fd) };
                return Ok(File::from_std(std_file));
            }
            Err(Errno::ENXIO) => {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            Err(e) => return Err(Error::Io(std::io::Error::from(e))),
        }
    }
}

#[cfg(not(unix))]
async fn open_fifo_with_retry(_path: &Path) -> Result<File> {
    Err(Error::protocol("FIFO backup destinations are only supported on unix"))
}

async fn open_backup_volume(path: &Path, force_overwrite: bool) -> Result<File> {
    if let Ok(meta) = tokio::fs::metadata(path).await {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if meta.file_type().is_fifo() {
                return open_fifo_with_retry(path).await;
            }
        }
        if !force_overwrite {
            return Err(Error::BackupDestinationExists {
                path: path.display().to_string(),
            });
        }
        if meta.is_file() {
            check_free_space(path).await?;
        }
    }
    let file = OpenOptions::new().write(true).create(true).truncate(true).open(path).await?;
    Ok(file)
}

impl Connection {
    /// Negotiate a backup session: send `(num_threads, do_compress,
    /// sleep_msecs, make_slave)`, receive the header, then open the local
    /// destination and write the header once (§4.8 steps 1-3).
    pub async fn backup_prepare(&mut self, path: impl AsRef<Path>, opts: &BackupOptions) -> Result<BackupSession> {
        let path = path.as_ref();

        let mut w = PackedWriter::new();
        w.write_i32(opts.num_threads);
        w.write_u8(opts.do_compress as u8);
        w.write_i32(opts.sleep_msecs);
        w.write_u8(opts.make_slave as u8);
        w.align8();

        let mut r = self.dispatcher.dispatch(Opcode::BackupPrepare, &[w.freeze()]).await?;
        let zip_method = if opts.do_compress { ZipMethod::Lzo1x } else { ZipMethod::None };
        let header = unpack_header_from_wire(&mut r, zip_method, opts.make_slave)?;

        let file = open_backup_volume(path, opts.force_overwrite).await?;
        let io_size = (header.backup_io_page_size as usize) * FULL_LEVEL_EXP + BK_BACKUP_PAGE_OVERHEAD;

        let mut session = BackupSession {
            header,
            file,
            path: path.to_path_buf(),
            io_size,
            sleep_msecs: opts.sleep_msecs,
            voltotalio: 0,
            backuptime_lsa_offset: 0,
            end_time_offset: 0,
            slave_volumes: Vec::new(),
        };
        session.write_header_block().await?;
        Ok(session)
    }
}

/// Run a full backup end to end: prepare, receive database volumes, receive
/// log volumes, finish; aborts and propagates the error on any failure
/// (§4.8, the `bk_run_backup` entry point).
pub async fn run_backup(conn: &mut Connection, path: impl AsRef<Path>, opts: BackupOptions) -> Result<BackupHeader> {
    let path = path.as_ref();
    let mut session = conn.backup_prepare(path, &opts).await?;

    let outcome: Result<()> = async {
        session.receive_volumes(conn, Opcode::BackupVolume).await?;
        session.receive_volumes(conn, Opcode::BackupLogVolume).await?;
        session.finish().await
    }
    .await;

    match outcome {
        Ok(()) => Ok(session.header.clone()),
        Err(e) => {
            session.abort().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BackupHeader {
        BackupHeader {
            magic: *b"RYE_BACKUP_v0001",
            db_version: 1,
            header_version: 1,
            db_creation_time: 1000,
            start_time: 2000,
            db_name: "demodb".to_string(),
            db_host: "localhost".to_string(),
            server_io_page_size: 16384,
            checkpoint_lsa: Lsa { pageid: 5, offset: 0 },
            backup_io_page_size: 16384,
            first_arv_needed: 0,
            run_nxchkpt_atpageid: 100,
            num_perm_vols: 2,
            zip_method: ZipMethod::None,
            make_slave: false,
            backuptime_lsa: Lsa::NULL,
            end_time: -1,
        }
    }

    #[test]
    fn pack_header_fits_fixed_block_and_offsets_are_patchable() {
        let h = sample_header();
        let (bytes, backuptime_lsa_offset, end_time_offset) = pack_header(&h).unwrap();
        assert_eq!(bytes.len(), BK_BACKUP_HEADER_IO_SIZE);

        let mut patched = h.clone();
        patched.backuptime_lsa = Lsa { pageid: 42, offset: 7 };
        patched.end_time = 99999;
        let (patched_bytes, _, _) = pack_header(&patched).unwrap();

        let mut r = PackedReader::new(patched_bytes.slice(backuptime_lsa_offset as usize..));
        assert_eq!(unpack_lsa(&mut r).unwrap(), patched.backuptime_lsa);

        let mut r = PackedReader::new(patched_bytes.slice(end_time_offset as usize..));
        assert_eq!(r.read_i64().unwrap(), 99999);
    }

    #[test]
    fn packet_tag_rejects_unknown_value() {
        assert!(PacketTag::from_i32(9).is_err());
    }

    #[test]
    fn backup_end_tags_are_loop_ends() {
        assert!(PacketTag::VolsBackupEnd.is_loop_end());
        assert!(PacketTag::LogsBackupEnd.is_loop_end());
        assert!(!PacketTag::Data.is_loop_end());
    }
}
