use relay::{Dispatcher, MemoryBus, RelaySettings};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub bus: MemoryBus,
    // 总线路由只允许访问这些 topic
    pub relay: RelaySettings,
}
