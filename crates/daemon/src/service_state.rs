use std::sync::Arc;

use crate::server::MountServer;

/// State shared with every HTTP handler.
#[derive(Clone, Debug)]
pub struct State {
    server: Arc<MountServer>,
}

impl State {
    pub fn new(server: Arc<MountServer>) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &Arc<MountServer> {
        &self.server
    }
}

impl AsRef<MountServer> for State {
    fn as_ref(&self) -> &MountServer {
        &self.server
    }
}
