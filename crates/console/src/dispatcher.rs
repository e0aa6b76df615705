use std::sync::Arc;

use taskdeck_core::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::app::Notice;
use crate::backend::Backend;
use crate::error::DispatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub ticket: Ulid,
    pub command: Command,
}

/// Handle on a write that is already on its way. Dropping it does not
/// cancel the request.
#[derive(Debug)]
pub struct DispatchTicket {
    pub id: Ulid,
    pub command: Command,
    handle: JoinHandle<Result<Ack, DispatchError>>,
}

impl DispatchTicket {
    pub async fn wait(self) -> Result<Ack, DispatchError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(DispatchError::Aborted(e.to_string())),
        }
    }
}

/// Fire-and-forget writes. Outcomes come back as notices, never retried.
pub struct CommandDispatcher<B> {
    backend: Arc<B>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl<B: Backend> CommandDispatcher<B> {
    pub fn new(backend: Arc<B>, notices: mpsc::UnboundedSender<Notice>) -> Self {
        Self { backend, notices }
    }

    pub fn dispatch(&self, command: Command) -> DispatchTicket {
        let id = Ulid::new();
        info!("dispatch {id}: {command}");
        let backend = Arc::clone(&self.backend);
        let notices = self.notices.clone();
        let cmd = command.clone();
        let handle = tokio::spawn(async move {
            let endpoint = cmd.endpoint();
            match backend.send(&endpoint).await {
                Ok(()) => {
                    debug!("dispatch {id} acknowledged");
                    let _ = notices.send(Notice::Dispatched {
                        command: cmd.to_string(),
                    });
                    Ok(Ack {
                        ticket: id,
                        command: cmd,
                    })
                }
                Err(e) => {
                    warn!("dispatch {id} ({cmd}) failed: {e}");
                    let _ = notices.send(Notice::DispatchFailed {
                        command: cmd.to_string(),
                        error: e.to_string(),
                    });
                    Err(e)
                }
            }
        });
        DispatchTicket {
            id,
            command,
            handle,
        }
    }
}
