//! The loaded set of classes and auxiliary files a search runs over.
//!
//! Loading never stops at one bad class: parse failures are collected into
//! the [`LoadReport`] and the offending entry is left out of the workspace.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use memmap2::Mmap;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use zip::ZipArchive;

use crate::class_record::{ClassRecord, ParseOptions};
use crate::error::ClassFormatError;

/// A non-class resource (manifest, properties, text, native blob, ...).
#[derive(Debug, Clone)]
pub struct FileRecord {
    path: String,
    bytes: Arc<[u8]>,
    digest: String,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let digest = hash_content(&bytes);
        Self {
            path: path.into(),
            bytes: bytes.into(),
            digest,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex SHA-256 of the raw content.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The content as text, without a leading byte-order mark. `None` for
    /// content that is not valid UTF-8 or contains NUL bytes.
    pub fn text(&self) -> Option<&str> {
        if self.bytes.contains(&0) {
            return None;
        }
        let text = std::str::from_utf8(&self.bytes).ok()?;
        Some(text.strip_prefix('\u{FEFF}').unwrap_or(text))
    }
}

pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub classes: usize,
    pub files: usize,
    pub failures: Vec<LoadFailure>,
    /// Classes that loaded with non-fatal structural anomalies.
    pub anomalies: usize,
}

impl LoadReport {
    pub fn merge(&mut self, other: LoadReport) {
        self.classes += other.classes;
        self.files += other.files;
        self.failures.extend(other.failures);
        self.anomalies += other.anomalies;
    }
}

/// A point-in-time copy of the workspace contents. Cheap to take: records
/// are shared, not cloned.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub classes: Vec<Arc<ClassRecord>>,
    pub files: Vec<Arc<FileRecord>>,
}

impl Snapshot {
    pub fn unit_count(&self) -> usize {
        self.classes.len() + self.files.len()
    }
}

#[derive(Debug, Default)]
pub struct Workspace {
    classes: BTreeMap<String, Arc<ClassRecord>>,
    files: BTreeMap<String, Arc<FileRecord>>,
    options: ParseOptions,
}

impl Workspace {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            classes: BTreeMap::new(),
            files: BTreeMap::new(),
            options,
        }
    }

    /// Adds an already parsed class under its internal name. A class with
    /// the same name replaces the earlier one.
    pub fn add_class(&mut self, class: ClassRecord) -> Arc<ClassRecord> {
        let class = Arc::new(class);
        if let Some(previous) = self
            .classes
            .insert(class.name().to_string(), Arc::clone(&class))
        {
            log::debug!("{} loaded twice, keeping the later copy", previous.name());
        }
        class
    }

    pub fn add_class_bytes(&mut self, bytes: Vec<u8>) -> Result<Arc<ClassRecord>, ClassFormatError> {
        let class = ClassRecord::parse_with(bytes, &self.options)?;
        Ok(self.add_class(class))
    }

    pub fn add_file(&mut self, file: FileRecord) {
        self.files.insert(file.path.clone(), Arc::new(file));
    }

    pub fn class(&self, name: &str) -> Option<&Arc<ClassRecord>> {
        self.classes.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassRecord>> {
        self.classes.values()
    }

    pub fn files(&self) -> impl Iterator<Item = &Arc<FileRecord>> {
        self.files.values()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            classes: self.classes.values().cloned().collect(),
            files: self.files.values().cloned().collect(),
        }
    }

    /// Loads a jar/zip archive, a directory tree, or a single file.
    pub fn load_path(&mut self, path: &Path) -> Result<LoadReport> {
        if path.is_dir() {
            return self.load_directory(path);
        }
        if is_archive(path) {
            return self.load_archive(path);
        }
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(self.ingest(vec![(name, bytes)]))
    }

    pub fn load_archive(&mut self, archive_path: &Path) -> Result<LoadReport> {
        let entries = read_archive(archive_path)?;
        let mut report = LoadReport::default();
        let mut readable = Vec::with_capacity(entries.len());
        for (name, bytes) in entries {
            match bytes {
                Ok(bytes) => readable.push((name, bytes)),
                Err(error) => {
                    log::warn!("{}!{name}: {error}", archive_path.display());
                    report.failures.push(LoadFailure { path: name, error });
                }
            }
        }
        report.merge(self.ingest(readable));
        Ok(report)
    }

    pub fn load_directory(&mut self, base: &Path) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut entries = Vec::new();
        for path in walk_files(base) {
            if is_archive(&path) {
                match self.load_archive(&path) {
                    Ok(nested) => report.merge(nested),
                    Err(err) => {
                        log::warn!("{}: {err:#}", path.display());
                        report.failures.push(LoadFailure {
                            path: path.display().to_string(),
                            error: format!("{err:#}"),
                        });
                    }
                }
                continue;
            }
            let name = relative_name(base, &path);
            match std::fs::read(&path) {
                Ok(bytes) => entries.push((name, bytes)),
                Err(err) => report.failures.push(LoadFailure {
                    path: name,
                    error: err.to_string(),
                }),
            }
        }
        report.merge(self.ingest(entries));
        Ok(report)
    }

    /// Parses class entries in parallel, then inserts everything in input
    /// order so duplicate resolution does not depend on scheduling.
    fn ingest(&mut self, entries: Vec<(String, Vec<u8>)>) -> LoadReport {
        let options = self.options;
        let parsed: Vec<(String, Entry)> = entries
            .into_par_iter()
            .map(|(name, bytes)| {
                let entry = if name.ends_with(".class") {
                    Entry::Class(ClassRecord::parse_with(bytes, &options))
                } else {
                    Entry::File(bytes)
                };
                (name, entry)
            })
            .collect();

        let mut report = LoadReport::default();
        for (name, entry) in parsed {
            match entry {
                Entry::Class(Ok(class)) => {
                    if !class.anomalies().is_empty() {
                        report.anomalies += 1;
                    }
                    self.add_class(class);
                    report.classes += 1;
                }
                Entry::Class(Err(err)) => {
                    log::warn!("{name}: {err}");
                    report.failures.push(LoadFailure {
                        path: name,
                        error: err.to_string(),
                    });
                }
                Entry::File(bytes) => {
                    self.add_file(FileRecord::new(name, bytes));
                    report.files += 1;
                }
            }
        }
        report
    }
}

enum Entry {
    Class(Result<ClassRecord, ClassFormatError>),
    File(Vec<u8>),
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("jar") || e.eq_ignore_ascii_case("zip"))
}

type ArchiveEntry = (String, std::result::Result<Vec<u8>, String>);

fn read_archive(archive_path: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    // SAFETY: The file is opened read-only and outlives the mapping.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap archive: {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", archive_path.display()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(err) => {
                entries.push((format!("#{i}"), Err(err.to_string())));
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let declared = entry.size();
        let read = read_entry(&mut entry, declared).map_err(|err| err.to_string());
        entries.push((name, read));
    }
    Ok(entries)
}

/// Upper bound on the buffer reserved up front for one archive entry.
const MAX_ENTRY_PREALLOC: u64 = 1 << 20;

/// Reads one entry; the size from the zip header is only a capacity hint.
fn read_entry(reader: &mut impl Read, declared_size: u64) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(declared_size.min(MAX_ENTRY_PREALLOC) as usize);
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Every regular file under `base`, sorted by path.
fn walk_files(base: &Path) -> Vec<PathBuf> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry
                && entry.file_type().is_some_and(|t| t.is_file())
            {
                let _ = tx.send(entry.into_path());
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut paths: Vec<PathBuf> = rx.iter().collect();
    paths.sort();
    paths
}

fn relative_name(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
