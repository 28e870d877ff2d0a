//! Package resolution, download and unpacking.
//!
//! Resolution is two-phase: a [`PackageRef`] (a name or a file path) is
//! resolved once into a [`ResolvedPackage`] carrying every candidate release
//! newest first; later steps work from the resolved record. All index
//! answers are memoized in tables owned by the [`PackageResolver`], which is
//! built once per run.
//!
//! Fetching and unpacking are idempotent through existence checks on the
//! cache directories. Concurrent runs against the same directories are not
//! supported.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, IoContext, Result};
use crate::extract::ArchiveExtractor;
use crate::fetch::ArtifactFetcher;
use crate::index::{DownloadRef, PackageIndex, ProviderRecord};
use crate::release::{self, Release};

/// How a package was first identified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PackageRef {
    ByName(String),
    /// A file the package provides, e.g. `/usr/lib64/libfoo.so.2`.
    ByFile(PathBuf),
}

impl PackageRef {
    pub fn name(name: impl Into<String>) -> Self {
        Self::ByName(name.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::ByFile(path.into())
    }

    fn query(&self) -> String {
        match self {
            Self::ByName(name) => name.clone(),
            Self::ByFile(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// One candidate release with the index metadata that came with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidedRelease {
    pub release: Release,
    pub repo: String,
    /// Path the package registers for the queried file.
    pub filename: Option<PathBuf>,
}

/// Canonical record for a package after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: String,
    /// The query that produced this record, after any prefix retry.
    pub query: String,
    /// Candidates, newest first. Never empty.
    pub releases: Vec<ProvidedRelease>,
}

impl ResolvedPackage {
    /// The newest release; this is the one that gets installed.
    pub fn selected(&self) -> &ProvidedRelease {
        &self.releases[0]
    }

    /// The selected release's version string, e.g. `2.3.1-4`.
    pub fn version(&self) -> String {
        self.selected().release.version()
    }
}

/// Where downloaded archives and unpacked trees live.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    pub package_dir: PathBuf,
    pub unpack_dir: PathBuf,
}

impl CacheLayout {
    pub fn new(package_dir: impl Into<PathBuf>, unpack_dir: impl Into<PathBuf>) -> Self {
        Self {
            package_dir: package_dir.into(),
            unpack_dir: unpack_dir.into(),
        }
    }

    /// Extraction root for one package: `unpack/<name>/`.
    pub fn unpacked(&self, package: &str) -> PathBuf {
        self.unpack_dir.join(package)
    }
}

/// Turn provider records into sorted candidate releases.
///
/// Every record must parse; an unparseable name is an error, not a skip.
pub fn releases_from_records(records: &[ProviderRecord]) -> Result<Vec<ProvidedRelease>> {
    let mut releases = records
        .iter()
        .map(|record| {
            Ok(ProvidedRelease {
                release: Release::parse(&record.full_name)?,
                repo: record.repo.clone(),
                filename: record.filename.as_ref().map(PathBuf::from),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    release::sort_descending(&mut releases, |p| &p.release)?;
    // The same release is often listed once per repo (e.g. @System and baseos)
    releases.dedup_by(|a, b| a.release == b.release);
    Ok(releases)
}

/// The other spelling of a library path: `/usr/lib64/x` <-> `/lib64/x`.
pub fn prefix_variant(path: &Path) -> Option<PathBuf> {
    match path.strip_prefix("/usr") {
        Ok(rest) if !rest.as_os_str().is_empty() => Some(Path::new("/").join(rest)),
        Ok(_) => None,
        Err(_) if path.is_absolute() => {
            let rest = path.strip_prefix("/").ok()?;
            Some(Path::new("/usr").join(rest))
        }
        Err(_) => None,
    }
}

/// Resolves packages against an index and manages the local caches.
pub struct PackageResolver {
    index: Box<dyn PackageIndex>,
    fetcher: Box<dyn ArtifactFetcher>,
    extractor: Box<dyn ArchiveExtractor>,
    layout: CacheLayout,
    resolved: HashMap<PackageRef, ResolvedPackage>,
    downloads: HashMap<String, DownloadRef>,
    dependencies: HashMap<String, Vec<DownloadRef>>,
}

impl PackageResolver {
    pub fn new(
        index: Box<dyn PackageIndex>,
        fetcher: Box<dyn ArtifactFetcher>,
        extractor: Box<dyn ArchiveExtractor>,
        layout: CacheLayout,
    ) -> Self {
        Self {
            index,
            fetcher,
            extractor,
            layout,
            resolved: HashMap::new(),
            downloads: HashMap::new(),
            dependencies: HashMap::new(),
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Resolve a package reference into its candidate releases.
    ///
    /// Fails with [`Error::NotFound`] when the index has nothing, with
    /// [`Error::Parse`] when a candidate name is malformed, and with
    /// [`Error::Mismatch`] when candidates cannot be ordered.
    pub fn resolve(&mut self, package: &PackageRef) -> Result<ResolvedPackage> {
        if let Some(hit) = self.resolved.get(package) {
            return Ok(hit.clone());
        }

        let query = package.query();
        let mut records = self.index.providers_of(&query)?;

        if let PackageRef::ByName(name) = package {
            // "provides <name>" also matches packages that merely provide the capability
            records.retain(|r| {
                Release::parse(&r.full_name)
                    .map(|rel| rel.name() == name)
                    .unwrap_or(true)
            });
        }
        if records.is_empty() {
            return Err(Error::NotFound { query });
        }

        let releases = releases_from_records(&records)?;
        let resolved = ResolvedPackage {
            name: releases[0].release.name().to_string(),
            query,
            releases,
        };
        debug!(
            "{} resolved to {} ({} candidates)",
            resolved.query,
            resolved.selected().release,
            resolved.releases.len()
        );

        self.resolved.insert(package.clone(), resolved.clone());
        Ok(resolved)
    }

    /// Resolve the package providing a library file.
    ///
    /// Indices register library paths either with or without the `/usr`
    /// prefix, so a not-found answer is retried once with the other form.
    pub fn resolve_library(&mut self, path: &Path) -> Result<ResolvedPackage> {
        match self.resolve(&PackageRef::file(path)) {
            Err(e) if e.is_not_found() => match prefix_variant(path) {
                Some(alt) => {
                    debug!("{} not found, retrying as {}", path.display(), alt.display());
                    self.resolve(&PackageRef::file(alt))
                }
                None => Err(e),
            },
            other => other,
        }
    }

    /// Download location for the selected release of `package`.
    pub fn download_ref(&mut self, package: &ResolvedPackage) -> Result<DownloadRef> {
        if let Some(hit) = self.downloads.get(&package.name) {
            return Ok(hit.clone());
        }
        let query = package.selected().release.to_string();
        let dl = self.index.download_url(&query)?;
        self.downloads.insert(package.name.clone(), dl.clone());
        Ok(dl)
    }

    /// Download locations for the install-time dependencies of `package`,
    /// not including the package itself.
    pub fn dependency_refs(&mut self, package: &ResolvedPackage) -> Result<Vec<DownloadRef>> {
        if let Some(hit) = self.dependencies.get(&package.name) {
            return Ok(hit.clone());
        }
        let own = self.download_ref(package)?;
        let query = package.selected().release.to_string();
        let deps: Vec<_> = self
            .index
            .download_urls_with_deps(&query)?
            .into_iter()
            .filter(|d| d.filename != own.filename)
            .collect();
        self.dependencies.insert(package.name.clone(), deps.clone());
        Ok(deps)
    }

    /// Path of the downloaded archive for `package`.
    pub fn archive_path(&mut self, package: &ResolvedPackage) -> Result<PathBuf> {
        let dl = self.download_ref(package)?;
        Ok(self.layout.package_dir.join(dl.filename))
    }

    /// Download the package archive (and optionally its dependencies) into
    /// the package directory. Existing files are not downloaded again and
    /// are not re-validated.
    pub fn fetch(&mut self, package: &ResolvedPackage, with_dependencies: bool) -> Result<PathBuf> {
        let dir = self.layout.package_dir.clone();
        fs::create_dir_all(&dir).io_context(|| format!("creating {}", dir.display()))?;

        let own = self.download_ref(package)?;
        let archive = dir.join(&own.filename);
        if archive.exists() {
            debug!("{} already downloaded", own.filename);
        } else {
            info!("Fetching {}", own.filename);
            self.fetcher.fetch(&own.url, &archive)?;
        }

        if with_dependencies {
            for dep in self.dependency_refs(package)? {
                let path = dir.join(&dep.filename);
                if !path.exists() {
                    info!("Fetching dependency {}", dep.filename);
                    self.fetcher.fetch(&dep.url, &path)?;
                }
            }
        }

        Ok(archive)
    }

    /// Extract the package archive into `unpack/<name>/`.
    ///
    /// Skipped when the directory already has content, unless `force` is
    /// set, in which case the tree is removed and extracted again.
    pub fn unpack(&mut self, package: &ResolvedPackage, force: bool) -> Result<PathBuf> {
        let dest = self.layout.unpacked(&package.name);
        let populated = fs::read_dir(&dest)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);

        if populated && !force {
            debug!("{} already unpacked", package.name);
            return Ok(dest);
        }
        if populated {
            warn!("Re-extracting {} into {}", package.name, dest.display());
            fs::remove_dir_all(&dest).io_context(|| format!("removing {}", dest.display()))?;
        }

        let archive = self.archive_path(package)?;
        fs::create_dir_all(&dest).io_context(|| format!("creating {}", dest.display()))?;
        info!("Unpacking {}", package.name);
        if let Err(e) = self.extractor.extract(&archive, &dest) {
            // leave no half-populated tree behind for the next existence check
            let _ = fs::remove_dir_all(&dest);
            return Err(e);
        }
        Ok(dest)
    }
}

impl std::fmt::Debug for PackageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageResolver")
            .field("layout", &self.layout)
            .field("resolved", &self.resolved.len())
            .finish()
    }
}
