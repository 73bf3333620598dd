//! Integration tests: the aria2 backend driven through `BatchManager`, with a
//! shell script standing in for `aria2c`.
#![cfg(unix)]

mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bdm_core::downloader::Aria2Downloader;
use bdm_core::{BatchManager, Backends, JobOptions, JobStatus};
use common::{settings, wait_idle};

/// Writes to `--dir/--out` like aria2c does, refusing to touch an existing file.
const FAKE_ARIA2C: &str = r#"#!/bin/sh
dir=
out=
while [ $# -gt 0 ]; do
  case "$1" in
    --version) exit 0 ;;
    --dir) dir=$2; shift ;;
    --out) out=$2; shift ;;
  esac
  shift
done
if [ -e "$dir/$out" ]; then
  echo "file $dir/$out already exists" >&2
  exit 13
fi
printf 'payload' > "$dir/$out"
echo "[NOTICE] Download complete: $dir/$out"
"#;

fn fake_aria2c(dir: &Path) -> PathBuf {
    let path = dir.join("aria2c");
    std::fs::write(&path, FAKE_ARIA2C).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test(flavor = "multi_thread")]
async fn same_url_twice_writes_two_files() {
    let bin = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let aria2 = Aria2Downloader::new(fake_aria2c(bin.path()), downloads.path());
    assert!(aria2.is_available());

    let mut backends = Backends::new();
    backends.register(Arc::new(aria2));
    let manager = BatchManager::start(settings(2), backends, None);

    let url = "https://mirror.example.com/pub/disk.iso";
    let ids: Vec<_> = manager
        .submit_many(&[url, url][..], JobOptions::default())
        .into_iter()
        .map(Result::unwrap)
        .collect();
    wait_idle(&manager).await;

    let jobs: Vec<_> = ids.iter().map(|id| manager.query(*id).unwrap()).collect();
    for job in &jobs {
        assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error);
        let file = job.output_file.as_ref().unwrap();
        assert!(file.starts_with(downloads.path()));
        assert_eq!(std::fs::read_to_string(file).unwrap(), "payload");
        assert_eq!(job.total_bytes, 7);
    }
    assert_ne!(jobs[0].output_file, jobs[1].output_file);
    assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 2);

    manager.stop().await;
}
