//! Build command - runs the pipeline for one daemon package.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use minimize::config::Config;
use minimize::pipeline::{BuildRequest, Pipeline, Stages};

/// Arguments for the build command, already parsed by clap.
pub struct BuildArgs {
    pub package: String,
    pub daemon_file: Option<String>,
    pub package_dir: Option<PathBuf>,
    pub unpack_dir: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    /// Empty means every stage.
    pub stages: Stages,
    pub force_unpack: bool,
    pub manifest_path: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub no_deps: bool,
}

impl BuildArgs {
    /// Layer CLI flags over the environment configuration.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(dir) = &self.package_dir {
            config.package_dir = dir.clone();
        }
        if let Some(dir) = &self.unpack_dir {
            config.unpack_dir = dir.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        match self.timeout {
            Some(0) => config.command_timeout = None,
            Some(secs) => config.command_timeout = Some(Duration::from_secs(secs)),
            None => {}
        }
        if self.no_deps {
            config.fetch_dependencies = false;
        }
        config
    }

    fn request(&self) -> BuildRequest {
        let stages = if self.stages.is_empty() {
            Stages::all()
        } else {
            self.stages
        };
        let mut request = BuildRequest::new(&self.package).stages(stages);
        request.daemon_file = self.daemon_file.clone();
        request.manifest_path = self.manifest_path.clone();
        request
    }
}

/// Execute the build command.
pub fn cmd_build(args: BuildArgs, config: Config) -> Result<()> {
    let config = args.apply(config);
    let request = args.request();
    let start = Instant::now();

    let mut pipeline = Pipeline::from_config(&config).force_unpack(args.force_unpack);
    let outcome = pipeline
        .run(&request)
        .with_context(|| format!("Failed to build image for {}", args.package))?;

    let to_stdout = outcome
        .manifest_path
        .as_deref()
        .is_some_and(|p| p.as_os_str() == "-");
    if to_stdout {
        return Ok(());
    }

    println!();
    println!("Package:  {}", outcome.package.selected().release);
    if let Some(exe) = &outcome.executable {
        println!("Daemon:   {}", exe.image_path().display());
    }
    if let Some(model) = &outcome.model {
        println!("Image:    {}", model.root.display());
        println!("Placed:   {} libraries", model.placed().count());
    }
    if let Some(manifest) = &outcome.manifest {
        println!("Packages: {}", manifest.packages().join(", "));
    }
    if let Some(path) = &outcome.manifest_path {
        println!("Manifest: {}", path.display());
    }
    let gaps = outcome.gap_count();
    if gaps > 0 {
        println!("Missing:  {} libraries (see manifest 'unresolved')", gaps);
    }
    println!("Done in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn args() -> BuildArgs {
        BuildArgs {
            package: "dhcp-server".into(),
            daemon_file: Some("dhcpd".into()),
            package_dir: None,
            unpack_dir: None,
            model_dir: None,
            stages: Stages::default(),
            force_unpack: false,
            manifest_path: None,
            timeout: None,
            no_deps: false,
        }
    }

    #[test]
    fn test_no_stage_flags_runs_everything() {
        assert_eq!(args().request().stages, Stages::all());
    }

    #[test]
    fn test_stage_flags_are_kept() {
        let mut a = args();
        a.stages.fetch = true;
        let stages = a.request().stages;
        assert!(stages.fetch);
        assert!(!stages.model);
    }

    #[test]
    fn test_flags_override_config() {
        let base = Config::from_lookup(Path::new("/w"), |_| None);
        let mut a = args();
        a.model_dir = Some("/out".into());
        a.timeout = Some(0);
        a.no_deps = true;
        let cfg = a.apply(base);
        assert_eq!(cfg.model_dir, PathBuf::from("/out"));
        assert_eq!(cfg.command_timeout, None);
        assert!(!cfg.fetch_dependencies);
        assert_eq!(cfg.package_dir, PathBuf::from("/w/minimize/packages"));
    }
}
