use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::relay::{RelayLoop, RelayStats};

/// Owns the relay tasks and the shutdown token they observe.
pub struct Supervisor {
    cancel: CancellationToken,
    handles: Vec<(String, JoinHandle<RelayStats>)>,
}

impl Supervisor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            handles: Vec::new(),
        }
    }

    pub fn spawn(&mut self, relay: RelayLoop) {
        let name = relay.name().to_string();
        let token = self.cancel.clone();
        info!("Spawning relay loop: {}", name);
        self.handles.push((name, tokio::spawn(relay.run(token))));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signals every loop to drain and waits for all of them.
    pub async fn shutdown(self) -> Vec<(String, RelayStats)> {
        self.cancel.cancel();
        self.join().await
    }

    pub async fn join(self) -> Vec<(String, RelayStats)> {
        let mut finished = Vec::with_capacity(self.handles.len());
        for (name, handle) in self.handles {
            match handle.await {
                Ok(stats) => finished.push((name, stats)),
                Err(e) => error!("Relay loop {} crashed: {:?}", name, e),
            }
        }
        finished
    }
}
