//! Inbox ingestion: the one-shot sweep and the polling watcher.
//!
//! Both hand each candidate file to its own worker thread running the full
//! document pipeline. A shared in-flight set keeps the sweep and the
//! watcher from claiming the same file twice.

pub mod stability;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::RunConfig;
use crate::models::DocumentKind;
use crate::pipeline::orchestrator::DocumentPipeline;
use stability::{wait_for_stable, Stability};

/// Size samples taken before giving up on a file settling.
pub const STABILITY_SAMPLES: usize = 10;

/// Pause between stability samples.
pub const STABILITY_INTERVAL: Duration = Duration::from_millis(500);

/// Pause between inbox scans in watch mode.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Paths currently claimed by a worker, shared between sweep and watcher.
pub type InFlight = Arc<Mutex<HashSet<PathBuf>>>;

pub fn new_in_flight() -> InFlight {
    Arc::new(Mutex::new(HashSet::new()))
}

/// Files in the inbox (non-recursive) whose extension we handle. The
/// processed directory is a subdirectory and is never descended into.
pub fn list_candidates(input_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(input_dir) else {
        tracing::warn!(dir = %input_dir.display(), "Could not read input directory");
        return Vec::new();
    };
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && DocumentKind::from_path(path).is_some())
        .collect();
    candidates.sort_unstable();
    candidates
}

/// Process everything currently in the inbox, one worker thread per file,
/// and wait for all of them.
pub fn sweep(config: &RunConfig, in_flight: &InFlight) {
    let candidates = list_candidates(&config.input_dir);
    tracing::info!(count = candidates.len(), "Sweeping inbox");

    let mut workers = Vec::new();
    for path in candidates {
        if !claim(in_flight, &path) {
            continue;
        }
        let config = config.clone();
        let in_flight = Arc::clone(in_flight);
        workers.push(thread::spawn(move || {
            process_file(&path, &config);
            release(&in_flight, &path);
        }));
    }
    for worker in workers {
        let _ = worker.join();
    }
}

/// Run one file through the pipeline, logging the outcome.
fn process_file(path: &Path, config: &RunConfig) {
    let Some(kind) = DocumentKind::from_path(path) else {
        return;
    };
    let pipeline = match DocumentPipeline::build(config.clone()) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Could not build pipeline");
            return;
        }
    };
    match pipeline.run(path, kind) {
        Ok(state) => {
            if state.errors.is_empty() {
                tracing::info!(
                    path = %path.display(),
                    label = state.classification.as_ref().map(|c| c.label.as_str()).unwrap_or("-"),
                    "Document processed"
                );
            } else {
                tracing::warn!(
                    path = %path.display(),
                    errors = ?state.errors,
                    "Document processed with errors"
                );
            }
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Document pipeline failed");
        }
    }
}

fn claim(in_flight: &InFlight, path: &Path) -> bool {
    let mut set = in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    set.insert(path.to_path_buf())
}

fn release(in_flight: &InFlight, path: &Path) {
    let mut set = in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    set.remove(path);
}

/// Running watcher. Dropping the handle shuts the watch loop down and
/// joins it.
pub struct WatcherHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Ask the watch loop to stop after its current scan.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Block until the watch loop exits. Without an external shutdown this
    /// blocks indefinitely.
    pub fn wait(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Start polling the inbox for new files on a background thread.
pub fn start_watching(config: RunConfig, in_flight: InFlight) -> WatcherHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || watch_loop(&config, &in_flight, &shutdown_flag));
    WatcherHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn watch_loop(config: &RunConfig, in_flight: &InFlight, shutdown: &AtomicBool) {
    tracing::info!(dir = %config.input_dir.display(), "Watching inbox");
    let mut known: HashSet<PathBuf> = list_candidates(&config.input_dir).into_iter().collect();
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    while !shutdown.load(Ordering::SeqCst) {
        let current = list_candidates(&config.input_dir);
        for path in &current {
            if known.contains(path) || !claim(in_flight, path) {
                continue;
            }
            tracing::info!(path = %path.display(), "New file detected");
            known.insert(path.clone());
            let path = path.clone();
            let config = config.clone();
            let in_flight = Arc::clone(in_flight);
            workers.push(thread::spawn(move || {
                match wait_for_stable(&path, STABILITY_SAMPLES, STABILITY_INTERVAL) {
                    Stability::Vanished => {
                        tracing::warn!(path = %path.display(), "File vanished before it settled");
                        release(&in_flight, &path);
                        return;
                    }
                    Stability::Unstable => {
                        tracing::warn!(
                            path = %path.display(),
                            "File never settled; processing anyway"
                        );
                    }
                    Stability::Stable => {}
                }
                process_file(&path, &config);
                release(&in_flight, &path);
            }));
        }
        // Forget files that left the inbox so a same-named drop re-triggers.
        let current_set: HashSet<PathBuf> = current.into_iter().collect();
        known.retain(|path| current_set.contains(path));

        workers.retain(|worker| !worker.is_finished());
        thread::sleep(POLL_INTERVAL);
    }

    for worker in workers {
        let _ = worker.join();
    }
    tracing::info!("Watcher stopped");
}
