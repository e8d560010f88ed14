//! Loads a batch of subprocess-backed jobs from a TOML manifest.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use scheduler_core::JobSpec;
use serde::Deserialize;

fn default_slots() -> u32 {
    1
}

fn default_max_time_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestJob {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_slots")]
    pub slots: u32,
    #[serde(default = "default_max_time_secs")]
    pub max_time_secs: u64,
    /// Names of other jobs in this same manifest, by `name`. Resolved to indices once the whole
    /// file has been read -- a manifest's own job list is the only place job identity exists
    /// before `JobDag::from_specs` hands out `JobId`s.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "job")]
    jobs: Vec<ManifestJob>,
}

/// Reads and parses `path`, resolving each job's `depends_on` names to the positional indices
/// `JobSpec` expects.
pub fn load(path: &Path) -> Result<Vec<JobSpec<ManifestJob>>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading manifest {}", path.display()))?;
    let manifest: Manifest = toml::from_str(&raw).with_context(|| format!("parsing manifest {}", path.display()))?;

    if manifest.jobs.is_empty() {
        bail!("manifest {} declares no [[job]] entries", path.display());
    }

    let index_by_name: HashMap<&str, usize> =
        manifest.jobs.iter().enumerate().map(|(i, j)| (j.name.as_str(), i)).collect();

    let mut specs = Vec::with_capacity(manifest.jobs.len());
    for job in &manifest.jobs {
        let mut dependencies = Vec::with_capacity(job.depends_on.len());
        for dep_name in &job.depends_on {
            let &dep_index = index_by_name
                .get(dep_name.as_str())
                .with_context(|| format!("job '{}' depends on unknown job '{dep_name}'", job.name))?;
            dependencies.push(dep_index);
        }
        specs.push(JobSpec {
            name: job.name.clone(),
            slots: job.slots,
            max_time: Duration::from_secs(job.max_time_secs),
            dependencies,
            payload: job.clone(),
        });
    }

    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    struct ScratchFile(std::path::PathBuf);

    impl ScratchFile {
        fn new(contents: &str) -> Self {
            let n = COUNTER.fetch_add(1, Ordering::SeqCst);
            let path = std::env::temp_dir().join(format!("scheduler-cli-manifest-test-{}-{n}.toml", std::process::id()));
            std::fs::write(&path, contents).unwrap();
            ScratchFile(path)
        }
    }

    impl Drop for ScratchFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn resolves_depends_on_names_to_indices() {
        let file = ScratchFile::new(
            r#"
            [[job]]
            name = "build"
            command = "make"

            [[job]]
            name = "test"
            command = "make"
            args = ["test"]
            depends_on = ["build"]
            "#,
        );
        let specs = load(&file.0).unwrap();
        assert_eq!(specs[0].name, "build");
        assert_eq!(specs[1].dependencies, vec![0]);
    }

    #[test]
    fn unknown_dependency_name_is_an_error() {
        let file = ScratchFile::new(
            r#"
            [[job]]
            name = "only"
            command = "true"
            depends_on = ["missing"]
            "#,
        );
        assert!(load(&file.0).is_err());
    }

    #[test]
    fn empty_manifest_is_rejected() {
        let file = ScratchFile::new("");
        assert!(load(&file.0).is_err());
    }
}
