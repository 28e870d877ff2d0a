//! Shared test utilities for minimize tests.
//!
//! The fakes stand in for dnf, curl, rpm2cpio/cpio and ldd. Each keeps a
//! call log behind an `Rc` so a test can hand the fake to the pipeline and
//! still inspect what was asked of it.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use minimize::error::{Error, Result};
use minimize::extract::ArchiveExtractor;
use minimize::fetch::ArtifactFetcher;
use minimize::index::{DownloadRef, PackageIndex, ProviderRecord};
use minimize::ldd::LinkInspector;
use minimize::package::{CacheLayout, PackageResolver};
use minimize::pipeline::Pipeline;
use tempfile::TempDir;

pub const REPO_URL: &str = "https://mirror.example/el9/aarch64";

/// Test environment with temporary cache and model directories.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub package_dir: PathBuf,
    pub unpack_dir: PathBuf,
    pub model_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            package_dir: base.join("packages"),
            unpack_dir: base.join("unpack"),
            model_dir: base.join("model"),
        }
    }

    pub fn layout(&self) -> CacheLayout {
        CacheLayout::new(&self.package_dir, &self.unpack_dir)
    }

    /// A pipeline wired to the given fakes.
    pub fn pipeline(&self, world: &FakeWorld, ldd_report: &str) -> Pipeline {
        let resolver = PackageResolver::new(
            Box::new(world.index.clone()),
            Box::new(world.fetcher.clone()),
            Box::new(world.extractor.clone()),
            self.layout(),
        );
        Pipeline::new(
            resolver,
            Box::new(FakeInspector::new(ldd_report)),
            &self.model_dir,
        )
    }
}

/// One file in a fake package payload.
#[derive(Debug, Clone)]
pub enum Entry {
    File { path: &'static str, mode: u32 },
    Link { path: &'static str, target: &'static str },
}

pub fn file(path: &'static str, mode: u32) -> Entry {
    Entry::File { path, mode }
}

pub fn link(path: &'static str, target: &'static str) -> Entry {
    Entry::Link { path, target }
}

/// Package index answering from in-memory tables.
#[derive(Clone, Default)]
pub struct FakeIndex {
    providers: Rc<RefCell<HashMap<String, Vec<ProviderRecord>>>>,
    requires: Rc<RefCell<HashMap<String, Vec<String>>>>,
    pub queries: Rc<RefCell<Vec<String>>>,
}

impl FakeIndex {
    /// Register `full_name` as a provider of `query`.
    pub fn provide(&self, query: &str, full_name: &str, filename: Option<&str>) {
        self.providers
            .borrow_mut()
            .entry(query.to_string())
            .or_default()
            .push(ProviderRecord {
                full_name: full_name.to_string(),
                summary: String::new(),
                repo: "baseos".to_string(),
                filename: filename.map(str::to_string),
            });
    }

    /// Make `dependency` an install-time dependency of `full_name`.
    pub fn requires(&self, full_name: &str, dependency: &str) {
        self.requires
            .borrow_mut()
            .entry(full_name.to_string())
            .or_default()
            .push(dependency.to_string());
    }

    pub fn query_count(&self, query: &str) -> usize {
        self.queries.borrow().iter().filter(|q| *q == query).count()
    }
}

impl PackageIndex for FakeIndex {
    fn providers_of(&self, query: &str) -> Result<Vec<ProviderRecord>> {
        self.queries.borrow_mut().push(query.to_string());
        match self.providers.borrow().get(query) {
            Some(records) => Ok(records.clone()),
            None => Err(Error::NotFound {
                query: query.to_string(),
            }),
        }
    }

    fn download_url(&self, query: &str) -> Result<DownloadRef> {
        Ok(DownloadRef {
            url: format!("{}/{}.rpm", REPO_URL, query),
            filename: format!("{}.rpm", query),
        })
    }

    fn download_urls_with_deps(&self, query: &str) -> Result<Vec<DownloadRef>> {
        // dnf download --resolve lists the package itself among the results
        let mut refs = vec![self.download_url(query)?];
        for dependency in self.requires.borrow().get(query).into_iter().flatten() {
            refs.push(self.download_url(dependency)?);
        }
        Ok(refs)
    }
}

/// Fetcher that writes the URL into the destination file.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    failing: Rc<RefCell<HashSet<String>>>,
    pub calls: Rc<RefCell<Vec<String>>>,
}

impl FakeFetcher {
    /// Make downloads of `filename` fail.
    pub fn fail_on(&self, filename: &str) {
        self.failing.borrow_mut().insert(filename.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Number of downloads of the archive named `filename`.
    pub fn fetches_of(&self, filename: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|url| url.rsplit('/').next() == Some(filename))
            .count()
    }
}

impl ArtifactFetcher for FakeFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        self.calls.borrow_mut().push(url.to_string());
        let filename = url.rsplit('/').next().unwrap_or(url);
        if self.failing.borrow().contains(filename) {
            return Err(Error::Tool {
                program: "curl".to_string(),
                message: format!("404 for {}", url),
            });
        }
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(dest, url).unwrap();
        Ok(())
    }
}

/// Extractor that lays out a fixed payload per archive file name.
#[derive(Clone, Default)]
pub struct FakeExtractor {
    payloads: Rc<RefCell<HashMap<String, Vec<Entry>>>>,
    pub calls: Rc<RefCell<Vec<PathBuf>>>,
}

impl FakeExtractor {
    pub fn payload(&self, full_name: &str, entries: Vec<Entry>) {
        self.payloads
            .borrow_mut()
            .insert(format!("{}.rpm", full_name), entries);
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl ArchiveExtractor for FakeExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        self.calls.borrow_mut().push(archive.to_path_buf());
        let name = archive.file_name().unwrap().to_string_lossy().into_owned();
        let payloads = self.payloads.borrow();
        let Some(entries) = payloads.get(&name) else {
            return Err(Error::Tool {
                program: "cpio".to_string(),
                message: format!("premature end of archive {}", name),
            });
        };
        for entry in entries {
            match entry {
                Entry::File { path, mode } => {
                    let p = dest.join(path);
                    fs::create_dir_all(p.parent().unwrap()).unwrap();
                    fs::write(&p, format!("payload of {}", path)).unwrap();
                    fs::set_permissions(&p, fs::Permissions::from_mode(*mode)).unwrap();
                }
                Entry::Link { path, target } => {
                    let p = dest.join(path);
                    fs::create_dir_all(p.parent().unwrap()).unwrap();
                    symlink(target, &p).unwrap();
                }
            }
        }
        Ok(())
    }
}

/// Link inspector returning a canned report.
pub struct FakeInspector {
    report: String,
}

impl FakeInspector {
    pub fn new(report: &str) -> Self {
        Self {
            report: report.to_string(),
        }
    }
}

impl LinkInspector for FakeInspector {
    fn inspect(&self, _executable: &Path) -> Result<String> {
        Ok(self.report.clone())
    }
}

/// The three stateful fakes of one scenario.
#[derive(Clone, Default)]
pub struct FakeWorld {
    pub index: FakeIndex,
    pub fetcher: FakeFetcher,
    pub extractor: FakeExtractor,
}

pub const DAEMON_RELEASE: &str = "example-server-1.0-1.el9.aarch64";
pub const LIBFOO_RELEASE: &str = "libfoo-2.3.1-4.el9.aarch64";

/// `example-server` shipping `/usr/sbin/exampled`, which links `libfoo.so.2`.
pub fn example_world() -> FakeWorld {
    let world = FakeWorld::default();

    world.index.provide("example-server", DAEMON_RELEASE, None);
    world.extractor.payload(
        DAEMON_RELEASE,
        vec![
            file("usr/sbin/exampled", 0o755),
            file("usr/share/doc/example-server/README", 0o644),
            file("etc/exampled.conf", 0o644),
        ],
    );

    world.index.provide(
        "/usr/lib64/libfoo.so.2",
        "libfoo-2.2.0-1.el9.aarch64",
        Some("/usr/lib64/libfoo.so.2"),
    );
    world.index.provide(
        "/usr/lib64/libfoo.so.2",
        LIBFOO_RELEASE,
        Some("/usr/lib64/libfoo.so.2"),
    );
    world.extractor.payload(
        LIBFOO_RELEASE,
        vec![
            link("usr/lib64/libfoo.so.2", "libfoo.so.2.3.1"),
            file("usr/lib64/libfoo.so.2.3.1", 0o755),
        ],
    );

    world
}

pub const LIBFOO_REPORT: &str = "\
\tlinux-vdso.so.1 (0x0000ffff8f7e0000)
\tlibfoo.so.2 => /usr/lib64/libfoo.so.2 (0x0000ffff8f700000)
";

/// Assert that a path is a symlink pointing to `expected_target`.
pub fn assert_symlink(path: &Path, expected_target: &str) {
    assert!(
        path.is_symlink(),
        "Expected symlink at {}, found something else",
        path.display()
    );
    let target = fs::read_link(path).expect("Failed to read symlink");
    assert_eq!(
        target.to_string_lossy(),
        expected_target,
        "Symlink {} points to wrong target",
        path.display()
    );
}

/// Assert that a path is a regular file with the execute bit set.
pub fn assert_executable(path: &Path) {
    let meta = fs::metadata(path)
        .unwrap_or_else(|_| panic!("Expected file at {}, found nothing", path.display()));
    assert!(meta.is_file(), "{} is not a regular file", path.display());
    assert!(
        meta.permissions().mode() & 0o111 != 0,
        "{} is not executable",
        path.display()
    );
}
