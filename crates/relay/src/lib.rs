mod common;
mod dispatcher;
mod drivers;
mod error;
mod relay;
mod store;
mod supervisor;
mod traits;

pub use common::codec;
pub use dispatcher::{Dispatcher, Reply, ARTICLE_NOT_FOUND};
pub use drivers::memory::{MemoryBus, MemoryConsumer};
pub use drivers::news::{HttpArticleChecker, SqlArticleChecker};
pub use error::{CheckError, CodecError, TransportError};
pub use relay::{LoopState, RelayLoop, RelaySettings, RelayStats};
pub use supervisor::Supervisor;
pub use traits::{ArticleChecker, Bus, CommandHandler, CommentStore, Consumer, Publisher, RawMessage};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Starts the list-intake and add-intake loops. Both share one publisher
/// and the same handler.
pub fn start_with_cancel_token(
    settings: &RelaySettings,
    bus: &dyn Bus,
    handler: Arc<dyn CommandHandler>,
    cancel_token: CancellationToken,
) -> Supervisor {
    info!(
        "Starting relays: list={} add={} responses={}",
        settings.list_topic, settings.add_topic, settings.response_topic
    );
    let publisher = bus.publisher();
    let mut supervisor = Supervisor::new(cancel_token);

    supervisor.spawn(RelayLoop::new(
        "list",
        bus.consumer(&settings.group, &settings.list_topic),
        publisher.clone(),
        handler.clone(),
        settings,
    ));
    supervisor.spawn(RelayLoop::new(
        "add",
        bus.consumer(&settings.group, &settings.add_topic),
        publisher,
        handler,
        settings,
    ));

    supervisor
}
