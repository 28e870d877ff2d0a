//! The end-to-end run: fetch, unpack, resolve, model, manifest.
//!
//! Anything that goes wrong with the daemon's own package aborts the run.
//! Library-level problems are collected and reported in the outcome and
//! the manifest instead.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Config;
use crate::dependencies::{resolve_dependencies, DependencySet};
use crate::error::{Error, Result};
use crate::executable::{find_executables, Executable, ExecutableSet};
use crate::extract::RpmExtractor;
use crate::fetch::CurlFetcher;
use crate::index::DnfIndex;
use crate::ldd::{LddInspector, LinkInspector};
use crate::manifest::Manifest;
use crate::model::{Materializer, ModelReport};
use crate::package::{CacheLayout, PackageRef, PackageResolver, ResolvedPackage};
use crate::timing::Timer;

/// Which stages to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stages {
    pub fetch: bool,
    pub unpack: bool,
    pub resolve: bool,
    pub model: bool,
    pub manifest: bool,
}

impl Stages {
    pub fn all() -> Self {
        Self {
            fetch: true,
            unpack: true,
            resolve: true,
            model: true,
            manifest: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Modelling and the manifest both need the library closure.
    fn needs_resolution(&self) -> bool {
        self.resolve || self.model || self.manifest
    }
}

/// One pipeline invocation.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Daemon package name, e.g. `dhcp-server`.
    pub package: String,
    /// Executable file name inside the package, e.g. `dhcpd`.
    pub daemon_file: Option<String>,
    pub stages: Stages,
    /// Where to write the manifest; `-` means stdout. Defaults to
    /// `<model_dir>/<executable>.json`.
    pub manifest_path: Option<PathBuf>,
}

impl BuildRequest {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            daemon_file: None,
            stages: Stages::all(),
            manifest_path: None,
        }
    }

    pub fn daemon_file(mut self, name: impl Into<String>) -> Self {
        self.daemon_file = Some(name.into());
        self
    }

    pub fn stages(mut self, stages: Stages) -> Self {
        self.stages = stages;
        self
    }
}

/// Everything a run produced, stage by stage.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub package: ResolvedPackage,
    pub executable: Option<Executable>,
    pub dependencies: Option<DependencySet>,
    pub model: Option<ModelReport>,
    pub manifest: Option<Manifest>,
    pub manifest_path: Option<PathBuf>,
}

impl BuildOutcome {
    /// Number of libraries the image is missing.
    pub fn gap_count(&self) -> usize {
        match (&self.manifest, &self.model, &self.dependencies) {
            (Some(m), _, _) => m.unresolved.len(),
            (None, Some(model), Some(deps)) => deps.gaps.len() + model.gaps().count(),
            (None, None, Some(deps)) => deps.gaps.len(),
            _ => 0,
        }
    }
}

/// Runs the stages against a resolver and a link inspector.
pub struct Pipeline {
    resolver: PackageResolver,
    inspector: Box<dyn LinkInspector>,
    model_dir: PathBuf,
    force_unpack: bool,
    fetch_dependencies: bool,
}

impl Pipeline {
    pub fn new(
        resolver: PackageResolver,
        inspector: Box<dyn LinkInspector>,
        model_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resolver,
            inspector,
            model_dir: model_dir.into(),
            force_unpack: false,
            fetch_dependencies: true,
        }
    }

    /// Wire up the real collaborators: dnf, curl, rpm2cpio/cpio and ldd.
    pub fn from_config(config: &Config) -> Self {
        let timeout = config.command_timeout;
        let resolver = PackageResolver::new(
            Box::new(DnfIndex::new(&config.url_protocol, timeout)),
            Box::new(CurlFetcher::new(timeout)),
            Box::new(RpmExtractor::new(timeout)),
            CacheLayout::new(&config.package_dir, &config.unpack_dir),
        );
        Self::new(resolver, Box::new(LddInspector::new(timeout)), &config.model_dir)
            .fetch_dependencies(config.fetch_dependencies)
    }

    pub fn force_unpack(mut self, force: bool) -> Self {
        self.force_unpack = force;
        self
    }

    pub fn fetch_dependencies(mut self, fetch: bool) -> Self {
        self.fetch_dependencies = fetch;
        self
    }

    /// List the executables of an already unpacked package.
    pub fn executables(&self, package: &str) -> Result<ExecutableSet> {
        find_executables(&self.resolver.layout().unpacked(package), Some(package))
    }

    /// Library composition of every executable in an unpacked package.
    ///
    /// Executables the link inspector cannot handle are logged and left
    /// out; only fatal errors abort.
    pub fn executable_manifests(&mut self, package: &str) -> Result<Vec<Manifest>> {
        let executables = self.executables(package)?;
        let mut manifests = Vec::with_capacity(executables.len());
        for executable in executables.iter() {
            match resolve_dependencies(&mut self.resolver, self.inspector.as_ref(), executable) {
                Ok(deps) => manifests.push(Manifest::build(executable, package, &deps, None)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("{}: {}", executable.image_path().display(), e),
            }
        }
        Ok(manifests)
    }

    pub fn run(&mut self, request: &BuildRequest) -> Result<BuildOutcome> {
        let stages = request.stages;

        let timer = Timer::start("resolve package");
        let package = self.resolver.resolve(&PackageRef::name(&request.package))?;
        timer.finish();
        info!("{} -> {}", request.package, package.selected().release);

        // modelling places the daemon itself, so it needs the package on disk;
        // both steps are no-ops when the cache already has it
        if stages.fetch || stages.model {
            let timer = Timer::start("fetch");
            self.resolver.fetch(&package, self.fetch_dependencies)?;
            timer.finish();
        }
        if stages.unpack || stages.model {
            let timer = Timer::start("unpack");
            self.resolver.unpack(&package, self.force_unpack)?;
            timer.finish();
        }

        let mut outcome = BuildOutcome {
            package,
            executable: None,
            dependencies: None,
            model: None,
            manifest: None,
            manifest_path: None,
        };
        if !stages.needs_resolution() {
            return Ok(outcome);
        }

        let unpacked = self.resolver.layout().unpacked(&outcome.package.name);
        let executables = find_executables(&unpacked, Some(&outcome.package.name))?;
        let executable = select_executable(&executables, request.daemon_file.as_deref(), &outcome.package.name)?;
        info!("Daemon executable: {}", executable.image_path().display());

        let timer = Timer::start("resolve libraries");
        let deps = resolve_dependencies(&mut self.resolver, self.inspector.as_ref(), &executable)?;
        timer.finish();
        info!(
            "{} libraries from {} packages, {} unresolved",
            deps.libraries.len(),
            deps.package_names().len(),
            deps.gaps.len()
        );

        if stages.model {
            let timer = Timer::start("model");
            outcome.model = Some(self.model(&unpacked, &executable, &deps)?);
            timer.finish();
        }

        if stages.manifest {
            let manifest = Manifest::build(
                &executable,
                &outcome.package.name,
                &deps,
                outcome.model.as_ref(),
            );
            let dest = request
                .manifest_path
                .clone()
                .unwrap_or_else(|| self.model_dir.join(format!("{}.json", executable.name)));
            manifest.write(&dest)?;
            if dest != Path::new("-") {
                info!("Manifest written to {}", dest.display());
            }
            outcome.manifest = Some(manifest);
            outcome.manifest_path = Some(dest);
        }

        outcome.executable = Some(executable);
        outcome.dependencies = Some(deps);
        Ok(outcome)
    }

    fn model(
        &mut self,
        unpacked: &Path,
        executable: &Executable,
        deps: &DependencySet,
    ) -> Result<ModelReport> {
        let materializer = Materializer::new(self.model_dir.join(&executable.name))
            .force_unpack(self.force_unpack)
            .fetch_dependencies(self.fetch_dependencies);

        materializer.init()?;
        let placed = materializer.place_binary(unpacked, executable)?;
        let libraries = materializer.place_libraries(&mut self.resolver, &deps.libraries);

        let report = ModelReport {
            root: materializer.root().to_path_buf(),
            executable: placed,
            libraries,
        };
        let gaps = report.gaps().count();
        if gaps > 0 {
            warn!("{} libraries could not be placed", gaps);
        }
        Ok(report)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("resolver", &self.resolver)
            .field("model_dir", &self.model_dir)
            .finish()
    }
}

/// Pick the daemon from a package's executables.
///
/// Without an explicit name the package must hold exactly one executable,
/// or one named after the package.
pub fn select_executable(
    executables: &ExecutableSet,
    daemon_file: Option<&str>,
    package: &str,
) -> Result<Executable> {
    let names = || {
        executables
            .by_name
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };

    let found = match daemon_file {
        Some(name) => executables.get(name),
        None if executables.len() == 1 => executables.iter().next(),
        None => executables.get(package),
    };

    found.cloned().ok_or_else(|| Error::Missing {
        what: match daemon_file {
            Some(name) => format!("executable '{}' in {} (have: {})", name, package, names()),
            None => format!(
                "unambiguous daemon executable in {} (have: {}; pick one with --daemon-file)",
                package,
                names()
            ),
        },
    })
}
