use crossbeam_channel::{Receiver, Sender, bounded};
use ignore::{
    WalkBuilder, WalkState,
    overrides::{Override, OverrideBuilder},
};
use std::{
    mem,
    path::{Path, PathBuf},
    thread,
};

use crate::utils::Config;
use crate::utils::ext::lowercase_ext;

// ---------------------------------------------------------------------------
// Internal constants / helpers
// ---------------------------------------------------------------------------
const DEFAULT_BATCH: usize = 8;

pub type Batch = Vec<PathBuf>;

struct Batcher {
    tx: Sender<Batch>,
    batch: Batch,
}

impl Batcher {
    fn push(&mut self, p: PathBuf) {
        self.batch.push(p);
        if self.batch.len() == DEFAULT_BATCH {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if !self.batch.is_empty() {
            let _ = self.tx.send(mem::take(&mut self.batch));
        }
    }
}

impl Drop for Batcher {
    fn drop(&mut self) {
        self.flush();
    }
}

fn overrides(root: &Path, cfg: &Config) -> Override {
    let mut ob = OverrideBuilder::new(root);
    for dir in &cfg.scanner.excluded_directories {
        if let Err(e) = ob.add(&format!("!**/{dir}/**")) {
            tracing::warn!("cannot add ignore pattern '{dir}': {e}");
        }
    }
    ob.build().unwrap_or_else(|e| {
        tracing::warn!("ignore patterns rejected, scanning without them: {e}");
        Override::empty()
    })
}

// ---------------------------------------------------------------------------
/// Walk `root` and send *batches* of Python source paths through the
/// returned channel. The channel closes when the walk is done.
pub fn spawn_senders(root: &Path, cfg: &Config) -> Receiver<Batch> {
    let overrides = overrides(root, cfg);

    let workers = cfg.performance.worker_threads.unwrap_or_else(num_cpus::get).max(1);
    let (tx, rx) = bounded::<Batch>(workers * cfg.performance.channel_multiplier.max(1));

    let root = root.to_path_buf();
    let scan_hidden = cfg.scanner.scan_hidden_files;
    let follow = cfg.scanner.follow_symlinks;
    let max_bytes = cfg.scanner.max_file_size_mb.unwrap_or(0) * 1_048_576;

    thread::spawn(move || {
        WalkBuilder::new(root)
            .hidden(!scan_hidden)
            .follow_links(follow)
            .threads(workers)
            .overrides(overrides)
            .build_parallel()
            .run(move || {
                let mut b = Batcher { tx: tx.clone(), batch: Vec::with_capacity(DEFAULT_BATCH) };

                Box::new(move |entry| {
                    let entry = match entry {
                        Ok(e) if e.file_type().is_some_and(|ft| ft.is_file()) => e,
                        Ok(_) => return WalkState::Continue,
                        Err(e) => {
                            tracing::warn!("walk error: {e}");
                            return WalkState::Continue;
                        }
                    };
                    if lowercase_ext(entry.path()).is_none() {
                        return WalkState::Continue;
                    }

                    if max_bytes != 0 {
                        match entry.metadata() {
                            Ok(m) if m.len() > max_bytes => {
                                tracing::debug!("skipping oversized {:?}", entry.path());
                                return WalkState::Continue;
                            }
                            Err(e) => {
                                tracing::debug!("metadata failed for {:?}: {e}", entry.path());
                                return WalkState::Continue;
                            }
                            _ => {}
                        }
                    }

                    tracing::debug!("sending {:?}", entry.path());
                    b.push(entry.into_path());
                    WalkState::Continue
                })
            });
    });

    rx
}

#[test]
fn only_python_sources_outside_excluded_dirs_are_sent() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("pkg")).unwrap();
    std::fs::create_dir_all(root.join("venv/lib")).unwrap();
    std::fs::write(root.join("main.py"), "print(1)\n").unwrap();
    std::fs::write(root.join("pkg/util.py"), "x = 1\n").unwrap();
    std::fs::write(root.join("pkg/data.json"), "{}\n").unwrap();
    std::fs::write(root.join("venv/lib/site.py"), "y = 2\n").unwrap();

    let cfg = Config::default();
    let mut found: Vec<PathBuf> = spawn_senders(root, &cfg).into_iter().flatten().collect();
    found.sort();

    let rel: Vec<_> = found
        .iter()
        .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(rel, vec!["main.py", "pkg/util.py"]);
}
