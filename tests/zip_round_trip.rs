use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};

use ziptar::result::ArchiveError;
use ziptar::zip::entry::*;
use ziptar::zip::spec;
use ziptar::zip::*;

const HI_CRC: u32 = 0xd882_0481;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn xorshift_bytes(mut state: u64, len: usize) -> Vec<u8> {
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

fn when(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 5, 6)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

fn stored() -> EntryOptions {
    EntryOptions::default().compression_method(CompressionMethod::Stored)
}

fn read_all<R: Read + Seek>(archive: &mut ZipArchive<R>, index: usize) -> Result<Vec<u8>> {
    let mut contents = Vec::new();
    archive.read(index)?.read_to_end(&mut contents)?;
    Ok(contents)
}

#[test]
fn hi_is_stored_with_its_crc() -> Result<()> {
    init_logger();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()))?;
    zip.add_entry("a.txt", stored(), &mut &b"hi"[..])?;
    let bytes = zip.finish()?.into_inner();

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let entry = &archive.entries()[0];
    assert_eq!(entry.name, "a.txt");
    assert_eq!(entry.crc32, HI_CRC);
    assert_eq!(entry.size, 2);
    assert_eq!(entry.compressed_size, 2);
    assert_eq!(entry.compression_method, CompressionMethod::Stored);
    assert_eq!(read_all(&mut archive, 0)?, b"hi");
    Ok(())
}

#[test]
fn small_sizes_round_trip() -> Result<()> {
    init_logger();
    for &size in &[0usize, 1, 511, 512, 513] {
        let data = xorshift_bytes(size as u64 + 1, size);
        for method in [CompressionMethod::Stored, CompressionMethod::Deflated] {
            for streaming in [false, true] {
                let options = EntryOptions::default()
                    .compression_method(method)
                    .last_modified(when(7, 8, 10));
                let bytes = if streaming {
                    // Stored entries in a stream have to be declared up front.
                    let options = if method == CompressionMethod::Stored {
                        let mut hasher = crc32fast::Hasher::new();
                        hasher.update(&data);
                        options.known_payload(hasher.finalize(), size as u64)
                    } else {
                        options
                    };
                    let mut zip = ZipWriter::new_streaming(Vec::new());
                    zip.add_entry("entry.bin", options, &mut &data[..])?;
                    zip.finish()?
                } else {
                    let mut zip = ZipWriter::new(Cursor::new(Vec::new()))?;
                    zip.add_entry("entry.bin", options, &mut &data[..])?;
                    zip.finish()?.into_inner()
                };

                let context = format!("{} bytes, {:?}, streaming: {}", size, method, streaming);
                let mut archive = ZipArchive::new(Cursor::new(&bytes[..])).context(context.clone())?;
                let entry = archive.entries()[0].clone();
                assert_eq!(entry.name, "entry.bin", "{}", context);
                assert_eq!(entry.size, size as u64, "{}", context);
                assert_eq!(entry.compression_method, method, "{}", context);
                assert_eq!(entry.last_modified, when(7, 8, 10), "{}", context);
                if method == CompressionMethod::Stored {
                    assert_eq!(entry.compressed_size, size as u64, "{}", context);
                }
                assert_eq!(read_all(&mut archive, 0)?, data, "{}", context);

                let mut stream = ZipStreamReader::new(&bytes[..]);
                let streamed = stream.next_entry()?.context(context.clone())?;
                assert_eq!(streamed.name, "entry.bin");
                let mut contents = Vec::new();
                stream.read_to_end(&mut contents)?;
                assert_eq!(contents, data, "{}", context);
                let closed = stream.current().context("No current entry")?;
                assert_eq!(closed.crc32, entry.crc32, "{}", context);
                assert_eq!(closed.compressed_size, entry.compressed_size, "{}", context);
                assert!(stream.next_entry()?.is_none());
            }
        }
    }
    Ok(())
}

#[test]
fn dos_times_lose_odd_seconds() -> Result<()> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()))?;
    zip.add_entry(
        "odd",
        EntryOptions::default().last_modified(when(23, 59, 59)),
        &mut &b"x"[..],
    )?;
    let archive = ZipArchive::new(zip.finish()?)?;
    assert_eq!(archive.entries()[0].last_modified, when(23, 59, 58));
    Ok(())
}

/// Writes a single stored entry's records around a payload that isn't there.
/// Only the central directory is read, so the sizes can be anything.
fn huge_entry(size: u64) -> ZipEntry {
    let zip64 = size >= ZIP64_SIZE_THRESHOLD;
    ZipEntry {
        raw_name: b"huge.bin".to_vec(),
        name: "huge.bin".to_owned(),
        version_made_by: VERSION_MADE_BY,
        version_needed: version_needed(CompressionMethod::Stored, zip64, false),
        flags: 0,
        compression_method: CompressionMethod::Stored,
        last_modified: when(12, 0, 0),
        crc32: 0x1234_5678,
        compressed_size: size,
        size,
        header_offset: 0,
        disk_start: 0,
        internal_attributes: 0,
        external_attributes: 0,
        extra_field: ExtraField::new(),
        comment: Vec::new(),
    }
}

#[test]
fn sizes_around_four_gigabytes() -> Result<()> {
    init_logger();
    for size in [
        ZIP64_SIZE_THRESHOLD - 1,
        ZIP64_SIZE_THRESHOLD,
        ZIP64_SIZE_THRESHOLD + 1,
        1 << 33,
    ] {
        let entry = huge_entry(size);
        let zip64 = size >= ZIP64_SIZE_THRESHOLD;

        let mut bytes = Vec::new();
        spec::write_local_header(&mut bytes, &entry, true, zip64)?;
        let cd_offset = bytes.len() as u64;
        spec::write_central_directory_header(&mut bytes, &entry)?;
        let cd_size = bytes.len() as u64 - cd_offset;
        spec::write_end_of_central_directory(&mut bytes, 1, cd_size, cd_offset, b"")?;

        let cde = spec::CentralDirectoryEntry::parse_and_consume(&mut &bytes[cd_offset as usize..])?;
        if zip64 {
            assert_eq!(cde.uncompressed_size, 0xffff_ffff);
            assert_eq!(cde.compressed_size, 0xffff_ffff);
            assert!(cde.minimum_extract_version >= VERSION_ZIP64);
        } else {
            assert_eq!(cde.uncompressed_size as u64, size);
        }
        // The offset fits, so it stays out of the Zip64 field.
        assert_eq!(cde.header_offset, 0);

        let archive = ZipArchive::new(Cursor::new(bytes))?;
        let back = &archive.entries()[0];
        assert_eq!(back.size, size);
        assert_eq!(back.compressed_size, size);
        assert_eq!(back.crc32, 0x1234_5678);
        assert_eq!(back.last_modified, when(12, 0, 0));
    }
    Ok(())
}

#[test]
fn entry_count_alone_promotes() -> Result<()> {
    init_logger();
    const COUNT: usize = 0xffff;
    let mut zip = ZipWriter::new_streaming(Vec::new());
    for i in 0..COUNT {
        zip.add_entry(&format!("e{:05}", i), stored().known_payload(0, 0), &mut &b""[..])?;
    }
    let bytes = zip.finish()?;
    assert!(bytes.len() < 0xffff_ffff);

    let eocd_start = bytes.len() - spec::EOCD_SIZE;
    let eocd = spec::EndOfCentralDirectory::parse(&bytes[eocd_start..])?;
    assert_eq!(eocd.entries, 0xffff);
    assert_eq!(eocd.entries_on_this_disk, 0xffff);
    // Only the count overflowed.
    assert_ne!(eocd.central_directory_size, 0xffff_ffff);
    assert_ne!(eocd.central_directory_offset, 0xffff_ffff);

    let locator_start = eocd_start - spec::ZIP64_EOCD_LOCATOR_SIZE;
    let locator =
        spec::Zip64EndOfCentralDirectoryLocator::parse(&bytes[locator_start..eocd_start])?
            .context("No Zip64 locator")?;
    let zip64_start = locator_start - spec::ZIP64_EOCD_SIZE;
    assert_eq!(locator.zip64_eocdr_offset, zip64_start as u64);
    let zip64 = spec::Zip64EndOfCentralDirectory::parse(&bytes[zip64_start..locator_start])?;
    assert_eq!(zip64.entries, COUNT as u64);

    let archive = ZipArchive::new(Cursor::new(bytes))?;
    assert_eq!(archive.len(), COUNT);
    assert_eq!(archive.entries()[COUNT - 1].name, "e65534");
    Ok(())
}

#[test]
fn entry_size_alone_promotes() -> Result<()> {
    init_logger();
    // One entry whose 4 GiB payload is a hole in a sparse file:
    // the central directory lands past 4 GiB while the count stays at one.
    let size = ZIP64_SIZE_THRESHOLD + 10;
    let entry = huge_entry(size);
    let mut file = tempfile::tempfile()?;

    let mut header = Vec::new();
    spec::write_local_header(&mut header, &entry, true, true)?;
    file.write_all(&header)?;
    let cd_offset = header.len() as u64 + size;
    file.seek(SeekFrom::Start(cd_offset))?;

    let mut tail = Vec::new();
    spec::write_central_directory_header(&mut tail, &entry)?;
    let cd_size = tail.len() as u64;
    spec::write_end_of_central_directory(&mut tail, 1, cd_size, cd_offset, b"")?;
    file.write_all(&tail)?;

    let eocd = spec::EndOfCentralDirectory::parse(&tail[tail.len() - spec::EOCD_SIZE..])?;
    assert_eq!(eocd.entries, 1);
    assert_eq!(eocd.central_directory_offset, 0xffff_ffff);
    assert!(eocd.has_zip64_sentinels());

    file.seek(SeekFrom::Start(0))?;
    let archive = ZipArchive::new(file)?;
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.entries()[0].size, size);
    Ok(())
}

fn write_sample<S: ZipSink>(mut zip: ZipWriter<S>) -> Result<S::Inner> {
    let big = xorshift_bytes(42, 70_000);
    zip.add_entry("a.txt", stored().known_payload(HI_CRC, 2), &mut &b"hi"[..])?;
    zip.add_directory("dir", EntryOptions::default())?;
    zip.add_entry(
        "dir/data.bin",
        EntryOptions::default().last_modified(when(1, 2, 4)),
        &mut &big[..],
    )?;
    zip.add_entry(
        "dir/text.txt",
        EntryOptions::default().comment("some notes"),
        &mut &b"text text text text text text"[..],
    )?;
    zip.add_entry("dir/empty", EntryOptions::default(), &mut &b""[..])?;
    Ok(zip.finish()?)
}

#[test]
fn streaming_and_seekable_agree() -> Result<()> {
    init_logger();
    let seekable = write_sample(ZipWriter::new(Cursor::new(Vec::new()))?)?.into_inner();
    let streamed = write_sample(ZipWriter::new_streaming(Vec::new()))?;
    assert_ne!(seekable, streamed);

    let mut from_seekable = ZipArchive::new(Cursor::new(&seekable[..]))?;
    let mut from_streamed = ZipArchive::new(Cursor::new(&streamed[..]))?;
    assert_eq!(from_seekable.len(), from_streamed.len());

    for index in 0..from_seekable.len() {
        let a = from_seekable.entries()[index].clone();
        let b = from_streamed.entries()[index].clone();
        assert_eq!(a.name, b.name);
        assert_eq!(a.crc32, b.crc32);
        assert_eq!(a.size, b.size);
        assert_eq!(a.compressed_size, b.compressed_size);
        assert_eq!(a.compression_method, b.compression_method);
        assert_eq!(a.last_modified, b.last_modified);
        assert_eq!(a.comment, b.comment);
        assert_eq!(
            read_all(&mut from_seekable, index)?,
            read_all(&mut from_streamed, index)?
        );
    }

    // Only the streamed entries of unknown size carry descriptors.
    let described: Vec<_> = from_streamed
        .entries()
        .iter()
        .filter(|e| e.has_data_descriptor())
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(described, ["dir/data.bin", "dir/text.txt", "dir/empty"]);
    assert!(!from_seekable.entries().iter().any(ZipEntry::has_data_descriptor));

    // And both read forward-only.
    for bytes in [&seekable, &streamed] {
        let report = ZipStreamReader::new(&bytes[..]).verify();
        assert!(report.is_ok(), "{}", report);
        assert_eq!(report.entries.len(), 5);
    }
    Ok(())
}

#[test]
fn eocd_signature_in_the_comment() -> Result<()> {
    init_logger();
    let comment = "Look, an EOCD: PK\u{5}\u{6}\0\0\0\0\u{1}\0\u{1}\0 and some trailing text";
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()))?
        .with_options(ZipWriteOptions::default().comment(comment));
    zip.add_entry("real.txt", EntryOptions::default(), &mut &b"real"[..])?;
    let bytes = zip.finish()?.into_inner();

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    assert_eq!(archive.comment(), comment.as_bytes());
    assert_eq!(archive.len(), 1);
    assert_eq!(read_all(&mut archive, 0)?, b"real");
    Ok(())
}

#[test]
fn zip64_mode_never_refuses_large_entries() -> Result<()> {
    let mut zip = ZipWriter::new_streaming(Vec::new())
        .with_options(ZipWriteOptions::default().zip64(Zip64Mode::Never));
    let err = zip
        .start_entry("big", EntryOptions::default().large_file(true))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::State(_)));
    Ok(())
}

#[test]
fn zip64_always_round_trips() -> Result<()> {
    init_logger();
    let data = xorshift_bytes(3, 2000);
    for streaming in [false, true] {
        let options = ZipWriteOptions::default().zip64(Zip64Mode::Always);
        let bytes = if streaming {
            let mut zip = ZipWriter::new_streaming(Vec::new()).with_options(options);
            zip.add_entry("z", EntryOptions::default(), &mut &data[..])?;
            zip.finish()?
        } else {
            let mut zip = ZipWriter::new(Cursor::new(Vec::new()))?.with_options(options);
            zip.add_entry("z", EntryOptions::default(), &mut &data[..])?;
            zip.finish()?.into_inner()
        };
        let local = spec::LocalFileHeader::parse_and_consume(&mut &bytes[..])?;
        assert_eq!(local.uncompressed_size, 0xffff_ffff);
        assert!(local.minimum_extract_version >= VERSION_ZIP64);

        let mut archive = ZipArchive::new(Cursor::new(&bytes[..]))?;
        assert_eq!(read_all(&mut archive, 0)?, data);
        let report = ZipStreamReader::new(&bytes[..]).verify();
        assert!(report.is_ok(), "{}", report);
    }
    Ok(())
}

#[test]
fn unsupported_methods_are_listed_not_read() -> Result<()> {
    let entry = ZipEntry {
        compression_method: CompressionMethod::BZip2,
        version_needed: VERSION_BZIP2,
        size: 10,
        compressed_size: 10,
        ..huge_entry(0)
    };
    let mut bytes = Vec::new();
    spec::write_local_header(&mut bytes, &entry, true, false)?;
    bytes.extend_from_slice(&[0u8; 10]);
    let cd_offset = bytes.len() as u64;
    spec::write_central_directory_header(&mut bytes, &entry)?;
    let cd_size = bytes.len() as u64 - cd_offset;
    spec::write_end_of_central_directory(&mut bytes, 1, cd_size, cd_offset, b"")?;

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    assert_eq!(archive.entries()[0].compression_method, CompressionMethod::BZip2);
    assert!(matches!(archive.read(0), Err(ArchiveError::Unsupported(_))));
    Ok(())
}

#[test]
fn on_disk_round_trip() -> Result<()> {
    init_logger();
    let tempdir = tempfile::tempdir()?;
    let path = tempdir.path().join("out.zip");
    let data = xorshift_bytes(99, 100_000);
    {
        let mut zip = ZipWriter::new(File::create(&path)?)?;
        zip.add_entry("random.bin", EntryOptions::default(), &mut &data[..])?;
        zip.finish()?;
    }
    let mut archive = ZipArchive::new(File::open(&path)?)?;
    assert_eq!(read_all(&mut archive, 0)?, data);
    Ok(())
}
