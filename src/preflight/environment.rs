//! Cache and output directory checks.

use std::fs;
use std::path::Path;

use crate::config::Config;

use super::types::CheckResult;

/// Check that every cache directory exists (or can be created) and is writable.
pub fn check_directories(config: &Config) -> Vec<CheckResult> {
    [
        ("package dir", config.package_dir.as_path()),
        ("unpack dir", config.unpack_dir.as_path()),
        ("model dir", config.model_dir.as_path()),
    ]
    .into_iter()
    .map(|(label, dir)| check_writable(label, dir))
    .collect()
}

fn check_writable(label: &str, dir: &Path) -> CheckResult {
    let name = format!("{} writable", label);
    if let Err(e) = fs::create_dir_all(dir) {
        return CheckResult::fail(&name, &format!("Cannot create {}: {}", dir.display(), e));
    }

    let test_file = dir.join(".preflight-test");
    match fs::write(&test_file, "test") {
        Ok(_) => {
            let _ = fs::remove_file(&test_file);
            CheckResult::pass_with(&name, &dir.display().to_string())
        }
        Err(e) => CheckResult::fail(&name, &format!("Cannot write to {}: {}", dir.display(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::types::CheckStatus;
    use tempfile::TempDir;

    #[test]
    fn test_directories_created_and_writable() {
        let tmp = TempDir::new().unwrap();
        let config = Config::from_lookup(tmp.path(), |_| None);
        let results = check_directories(&config);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.status == CheckStatus::Pass));
        assert!(config.unpack_dir.is_dir());
    }
}
