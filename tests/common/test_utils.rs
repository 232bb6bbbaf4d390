use rand::Rng;
use std::{fs, path::PathBuf};

/// Temporary state location that is removed when dropped
pub struct TestPath {
    path: PathBuf,
}

impl TestPath {
    /// Unique path under the system temp dir, named after the test
    pub fn new(test_name: &str) -> Self {
        let suffix: u64 = rand::rng().random();
        let path = std::env::temp_dir()
            .join("tbloom-tests")
            .join(format!("{test_name}_{suffix:016x}.state"));
        Self { path }
    }

    #[allow(dead_code)]
    pub fn path(&self) -> PathBuf {
        self.path.clone()
    }

    #[allow(dead_code)]
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    /// Sibling location with a different extension, cleaned up together
    /// with this one
    #[allow(dead_code)]
    pub fn sibling(&self, extension: &str) -> String {
        self.path
            .with_extension(extension)
            .to_string_lossy()
            .to_string()
    }
}

impl Drop for TestPath {
    fn drop(&mut self) {
        for ext in ["state", "state.tmp", "pool", "pool.tmp", "redb"] {
            let candidate = self.path.with_extension(ext);
            if candidate.exists() {
                let _ = fs::remove_file(&candidate);
            }
        }
    }
}

/// Random hex keys sharing `prefix`
#[allow(dead_code)]
pub fn random_keys(count: usize, prefix: &str) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            let n: u64 = rng.random();
            format!("{prefix}{n:016x}")
        })
        .collect()
}
