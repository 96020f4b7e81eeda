//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched, not the file: editors that save by
//! writing a new file and renaming it over the old one would otherwise
//! detach the watch after the first save. Events for other files in the
//! directory are ignored.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::ServerConfig;
use crate::context::ServerContext;

/// Watches one configuration file and forwards every valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ServerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ServerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching on notify's background thread.
    ///
    /// The returned watcher must be kept alive for events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut reloader = Reloader::new(self.path.clone(), self.update_tx);
        // The file as it is now is what the server started with.
        reloader.last_applied = fs::read_to_string(&self.path).ok();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| reloader.on_event(res),
            Config::default(),
        )?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Turns file events into parsed configurations.
struct Reloader {
    path: PathBuf,
    tx: mpsc::UnboundedSender<ServerConfig>,
    /// Contents of the last version forwarded; repeats are skipped.
    last_applied: Option<String>,
}

impl Reloader {
    fn new(path: PathBuf, tx: mpsc::UnboundedSender<ServerConfig>) -> Self {
        Self {
            path,
            tx,
            last_applied: None,
        }
    }

    fn on_event(&mut self, res: notify::Result<Event>) {
        match res {
            Ok(event) if self.concerns(&event) => self.reload(),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, path = ?self.path, "Config watch error"),
        }
    }

    fn concerns(&self, event: &Event) -> bool {
        let target = self.path.file_name();
        (event.kind.is_modify() || event.kind.is_create())
            && event.paths.iter().any(|p| p.file_name() == target)
    }

    fn reload(&mut self) {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            // Between unlink and rename while an editor saves.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::error!(error = %e, path = ?self.path, "Failed to read config");
                return;
            }
        };
        if self.last_applied.as_deref() == Some(content.as_str()) {
            return;
        }

        match parse_config(&content) {
            Ok(config) => {
                if self.tx.send(config).is_err() {
                    tracing::warn!(path = ?self.path, "Config update dropped, receiver is gone");
                    return;
                }
                tracing::info!(path = ?self.path, "Config change detected");
                self.last_applied = Some(content);
            }
            Err(e) => tracing::error!(
                error = %e,
                path = ?self.path,
                "Ignoring invalid config, keeping current configuration"
            ),
        }
    }
}

/// Apply reloaded configurations until the watcher goes away.
pub async fn apply_updates(
    mut updates: mpsc::UnboundedReceiver<ServerConfig>,
    context: ServerContext,
) {
    while let Some(config) = updates.recv().await {
        context.apply_config_update(&config);
    }
    tracing::debug!("Config update channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use notify::event::{CreateKind, ModifyKind};
    use notify::EventKind;

    use crate::routing::Router;

    fn modified(path: &Path) -> notify::Result<Event> {
        Ok(Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path.to_path_buf()))
    }

    #[test]
    fn forwards_valid_versions_and_ignores_invalid_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reloader = Reloader::new(path.clone(), tx);

        fs::write(&path, "[cache]\nenabled = false\n").unwrap();
        reloader.on_event(modified(&path));
        let config = rx.try_recv().unwrap();
        assert!(!config.cache.enabled);

        fs::write(&path, "[cache\nenabled = ").unwrap();
        reloader.on_event(modified(&path));
        assert!(rx.try_recv().is_err());

        // Fails validation: zero workers.
        fs::write(&path, "[workers]\ncount = 0\n").unwrap();
        reloader.on_event(modified(&path));
        assert!(rx.try_recv().is_err());

        fs::write(&path, "[cache]\nttl_secs = 5\n").unwrap();
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        reloader.on_event(Ok(created));
        assert_eq!(rx.try_recv().unwrap().cache.ttl_secs, 5);
    }

    #[test]
    fn skips_other_files_and_unchanged_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reloader = Reloader::new(path.clone(), tx);
        fs::write(&path, "debug = true\n").unwrap();

        reloader.on_event(modified(&dir.path().join("other.toml")));
        assert!(rx.try_recv().is_err());

        reloader.on_event(modified(&path));
        assert!(rx.try_recv().is_ok());
        reloader.on_event(modified(&path));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_survivable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut reloader = Reloader::new(path.clone(), tx);

        fs::write(&path, "debug = true\n").unwrap();
        reloader.on_event(modified(&path));
        assert!(reloader.last_applied.is_none());
    }

    #[tokio::test]
    async fn file_rewrite_toggles_live_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(&path, "[cache]\nenabled = true\n").unwrap();

        let context = ServerContext::new(ServerConfig::default(), Arc::new(Router::new()));
        let (watcher, updates) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();
        tokio::spawn(apply_updates(updates, context.clone()));

        fs::write(&path, "this is not toml [").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(context.cache.is_enabled());

        fs::write(&path, "[cache]\nenabled = false\n").unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while context.cache.is_enabled() {
            assert!(tokio::time::Instant::now() < deadline, "reload never applied");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
