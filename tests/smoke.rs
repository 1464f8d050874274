use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use anyhow::{Context, Result};
use camino::Utf8Path;
use log::*;

use ziptar::result::ArchiveError;
use ziptar::tar::*;
use ziptar::zip::*;

const HELLO: &[u8] = b"Hello, world!\n";

/// Deterministic filler so payloads aren't all one byte
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

fn sr71() -> Vec<u8> {
    b"The SR-71 Blackbird is a long-range, high-altitude, Mach 3+ reconnaissance aircraft. "
        .repeat(200)
}

#[test]
fn smoke() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let tempdir = tempfile::tempdir()?;
    let temp_path = Utf8Path::from_path(tempdir.path()).context("Temp dir isn't UTF-8")?;

    let zip_path = temp_path.join("hello.zip");
    write_zip(File::create(&zip_path)?)?;
    read_zip(&zip_path, 0)?;

    // A self-extracting stub in front shouldn't matter.
    let prefixed_path = temp_path.join("hello-prefixed.zip");
    {
        let mut prefixed = File::create(&prefixed_path)?;
        let stub = xorshift_bytes(7, 1000);
        prefixed.write_all(&stub)?;
        write_zip(&mut prefixed)?;
    }
    read_zip(&prefixed_path, 1000)?;

    let tar_path = temp_path.join("hello.tar");
    write_tar(BufWriter::new(File::create(&tar_path)?))?;
    read_tar(&tar_path)?;

    tempdir.close()?;
    Ok(())
}

fn write_zip<W: Write + Seek>(w: W) -> Result<()> {
    let mut zip = ZipWriter::new(w)?;
    zip.add_directory("hello", EntryOptions::default())?;
    zip.add_entry("hello/hi.txt", EntryOptions::default(), &mut &HELLO[..])?;
    zip.add_entry(
        "hello/rip.txt",
        EntryOptions::default()
            .compression_method(CompressionMethod::Stored)
            .unix_permissions(0o600),
        &mut &b"Rest in peace"[..],
    )?;
    zip.add_entry(
        "hello/sr71.txt",
        EntryOptions::default().compression_level(9),
        &mut &sr71()[..],
    )?;
    zip.finish()?.flush()?;
    Ok(())
}

fn read_zip(zip_path: &Utf8Path, prepended: u64) -> Result<()> {
    info!("Reading {}", zip_path);
    let zip_file = BufReader::new(File::open(zip_path).context("Couldn't open zip file")?);

    let mut archive = if prepended == 0 {
        ZipArchive::new(zip_file).context("Couldn't load archive")?
    } else {
        let (archive, offset) = ZipArchive::with_prepended_data(zip_file, ZipReadOptions::default())
            .context("Couldn't load archive")?;
        assert_eq!(offset, prepended);
        archive
    };

    let names: Vec<_> = archive.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        ["hello/", "hello/hi.txt", "hello/rip.txt", "hello/sr71.txt"]
    );
    assert!(archive.entries()[0].is_dir());
    assert_eq!(archive.entries()[2].unix_mode(), Some(0o100600));
    let sr71_entry = &archive.entries()[3];
    assert!(sr71_entry.compressed_size < sr71_entry.size);

    let mut hi = Vec::new();
    archive.read_by_name("hello/hi.txt")?.read_to_end(&mut hi)?;
    assert_eq!(hi, HELLO);

    let mut sr71_back = Vec::new();
    archive.read_by_name("hello/sr71.txt")?.read_to_end(&mut sr71_back)?;
    assert_eq!(sr71_back, sr71());

    match archive.read_by_name("no/such/file") {
        Err(ArchiveError::Format(_)) => { /* Cool. */ }
        Err(other) => panic!("Got incorrect error from path with no file: {:?}", other),
        Ok(_) => panic!("Got a file back from a path with no file"),
    };

    // Read out each file in the archive, checking CRCs along the way.
    let report = archive.verify();
    assert!(report.is_ok(), "{}", report);
    assert_eq!(report.entries.len(), 4);

    // The local headers lead the archive, so a forward-only reader can walk it too.
    if prepended == 0 {
        let mut file = archive.into_inner();
        file.seek(SeekFrom::Start(0))?;
        let report = ZipStreamReader::new(file).verify();
        assert!(report.is_ok(), "{}", report);
        assert_eq!(report.entries.len(), 4);
    }
    Ok(())
}

fn write_tar<W: Write>(w: W) -> Result<()> {
    let mut tar = TarWriter::new(w)?;
    tar.append(&TarHeader::new_directory("hello"), io::empty())?;
    tar.append(
        &TarHeader::new("hello/hi.txt", HELLO.len() as u64),
        HELLO,
    )?;
    let big = sr71();
    tar.start_entry(&TarHeader::new("hello/sr71.txt", big.len() as u64))?;
    for chunk in big.chunks(1000) {
        tar.write_all(chunk)?;
    }
    tar.finish()?.flush()?;
    Ok(())
}

fn read_tar(tar_path: &Utf8Path) -> Result<()> {
    info!("Reading {}", tar_path);
    let file = File::open(tar_path)?;
    assert_eq!(
        file.metadata()?.len() % (DEFAULT_BLOCK_FACTOR * BLOCK_SIZE) as u64,
        0
    );

    let mut reader = TarReader::new(file)?;
    let dir = reader.next_entry()?.context("Missing directory")?;
    assert_eq!(dir.name, "hello/");
    assert!(dir.is_dir());

    let hi = reader.next_entry()?.context("Missing hi.txt")?;
    assert_eq!(hi.name, "hello/hi.txt");
    let mut contents = Vec::new();
    reader.read_to_end(&mut contents)?;
    assert_eq!(contents, HELLO);

    // Leave this one unread; it should be skipped.
    let sr71_entry = reader.next_entry()?.context("Missing sr71.txt")?;
    assert_eq!(sr71_entry.size, sr71().len() as u64);

    assert!(reader.next_entry()?.is_none());

    let report = TarReader::new(File::open(tar_path)?)?.verify();
    assert!(report.is_ok(), "{}", report);
    assert_eq!(report.entries.len(), 3);
    Ok(())
}
