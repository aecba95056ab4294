//! Asynchronous image loading
//!
//! Loads are issued by the selector and complete through a [`LoadSink`],
//! which forwards results over a channel so loaders are free to finish on
//! any thread. The peer drains completions on its own thread.

use std::cell::RefCell;
use std::rc::Rc;

use crossbeam_channel::{Receiver, Sender};

use crate::MosaicError;

/// Identifies one load attempt for one tile instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadTicket {
    /// Serial of the tile the load was issued for
    pub serial: u64,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub ticket: LoadTicket,
    pub id: String,
    pub uri: String,
}

#[derive(Debug)]
pub struct LoadResult {
    pub ticket: LoadTicket,
    pub id: String,
    pub outcome: std::result::Result<Vec<u8>, MosaicError>,
}

/// Completion side of a load. Cheap to clone and safe to send.
#[derive(Debug, Clone)]
pub struct LoadSink {
    sender: Sender<LoadResult>,
}

impl LoadSink {
    /// Delivers a result. Returns false once the receiving layer is gone.
    pub fn complete(&self, result: LoadResult) -> bool {
        self.sender.send(result).is_ok()
    }

    pub fn succeed(&self, request: &LoadRequest, data: Vec<u8>) -> bool {
        self.complete(LoadResult {
            ticket: request.ticket,
            id: request.id.clone(),
            outcome: Ok(data),
        })
    }

    pub fn fail(&self, request: &LoadRequest, error: MosaicError) -> bool {
        self.complete(LoadResult {
            ticket: request.ticket,
            id: request.id.clone(),
            outcome: Err(error),
        })
    }
}

/// Creates a connected sink/receiver pair
pub fn load_channel() -> (LoadSink, Receiver<LoadResult>) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (LoadSink { sender }, receiver)
}

/// Something that can fetch tile images
pub trait ImageLoader {
    /// Starts fetching `request.uri`; the result goes to `sink`
    fn load(&mut self, request: LoadRequest, sink: LoadSink) -> Box<dyn LoadHandle>;
}

/// Best-effort cancellation of an outstanding load.
///
/// A cancelled load may still complete; the engine ignores such results.
pub trait LoadHandle {
    fn cancel(&mut self);
}

#[derive(Default)]
struct DeferredState {
    issued: Vec<LoadRequest>,
    outstanding: Vec<(LoadRequest, LoadSink)>,
    cancelled: Vec<LoadRequest>,
}

/// Loader whose requests are completed by the host.
///
/// Useful for hosts with their own fetch machinery and for driving the
/// engine deterministically.
#[derive(Default)]
pub struct DeferredLoader {
    state: Rc<RefCell<DeferredState>>,
}

impl DeferredLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for inspecting and completing the requests this loader records
    pub fn queue(&self) -> DeferredQueue {
        DeferredQueue {
            state: Rc::clone(&self.state),
        }
    }
}

impl ImageLoader for DeferredLoader {
    fn load(&mut self, request: LoadRequest, sink: LoadSink) -> Box<dyn LoadHandle> {
        let mut state = self.state.borrow_mut();
        state.issued.push(request.clone());
        state.outstanding.push((request.clone(), sink));
        Box::new(DeferredHandle {
            request,
            state: Rc::clone(&self.state),
        })
    }
}

struct DeferredHandle {
    request: LoadRequest,
    state: Rc<RefCell<DeferredState>>,
}

impl LoadHandle for DeferredHandle {
    fn cancel(&mut self) {
        self.state.borrow_mut().cancelled.push(self.request.clone());
    }
}

#[derive(Clone)]
pub struct DeferredQueue {
    state: Rc<RefCell<DeferredState>>,
}

impl DeferredQueue {
    /// Every request ever issued, in issue order
    pub fn issued(&self) -> Vec<LoadRequest> {
        self.state.borrow().issued.clone()
    }

    /// Requests that were neither completed nor cancelled
    pub fn outstanding(&self) -> Vec<LoadRequest> {
        let state = self.state.borrow();
        state
            .outstanding
            .iter()
            .filter(|(request, _)| !state.cancelled.contains(request))
            .map(|(request, _)| request.clone())
            .collect()
    }

    pub fn cancelled(&self) -> Vec<LoadRequest> {
        self.state.borrow().cancelled.clone()
    }

    /// Most recent uncompleted request for a tile id, cancelled or not
    pub fn latest(&self, id: &str) -> Option<LoadRequest> {
        self.state
            .borrow()
            .outstanding
            .iter()
            .rev()
            .find(|(request, _)| request.id == id)
            .map(|(request, _)| request.clone())
    }

    /// Completes one request, even a cancelled one. Returns false when the
    /// ticket is unknown or was already completed.
    pub fn complete(
        &self,
        ticket: LoadTicket,
        outcome: std::result::Result<Vec<u8>, MosaicError>,
    ) -> bool {
        let entry = {
            let mut state = self.state.borrow_mut();
            let position = state
                .outstanding
                .iter()
                .position(|(request, _)| request.ticket == ticket);
            position.map(|index| state.outstanding.remove(index))
        };
        match entry {
            Some((request, sink)) => sink.complete(LoadResult {
                ticket: request.ticket,
                id: request.id,
                outcome,
            }),
            None => false,
        }
    }

    /// Completes every outstanding, uncancelled request with the payload
    /// produced for it. Returns how many were completed.
    pub fn complete_all<F>(&self, mut payload: F) -> usize
    where
        F: FnMut(&LoadRequest) -> std::result::Result<Vec<u8>, MosaicError>,
    {
        let mut completed = 0;
        for request in self.outstanding() {
            let outcome = payload(&request);
            if self.complete(request.ticket, outcome) {
                completed += 1;
            }
        }
        completed
    }
}

#[cfg(feature = "tokio-runtime")]
pub use http::HttpImageLoader;

#[cfg(feature = "tokio-runtime")]
mod http {
    use super::{ImageLoader, LoadHandle, LoadRequest, LoadResult, LoadSink};
    use crate::{core::constants::USER_AGENT, MosaicError, Result};
    use futures::future::{abortable, AbortHandle};
    use once_cell::sync::Lazy;

    /// Shared async HTTP client for tile fetching
    pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .pool_max_idle_per_host(16)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    });

    /// Fetches tiles over HTTP on a tokio runtime
    #[derive(Debug, Clone)]
    pub struct HttpImageLoader {
        runtime: tokio::runtime::Handle,
    }

    impl HttpImageLoader {
        pub fn new(runtime: tokio::runtime::Handle) -> Self {
            Self { runtime }
        }

        /// Loader bound to the runtime the caller is running on
        pub fn current() -> Result<Self> {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| MosaicError::Load(format!("no tokio runtime: {}", e)))?;
            Ok(Self::new(runtime))
        }
    }

    async fn fetch(uri: String) -> std::result::Result<Vec<u8>, MosaicError> {
        let response = HTTP_CLIENT.get(&uri).send().await?.error_for_status()?;
        let data = response.bytes().await?.to_vec();
        Ok(data)
    }

    impl ImageLoader for HttpImageLoader {
        fn load(&mut self, request: LoadRequest, sink: LoadSink) -> Box<dyn LoadHandle> {
            let (task, abort) = abortable(fetch(request.uri.clone()));
            self.runtime.spawn(async move {
                match task.await {
                    Ok(outcome) => {
                        sink.complete(LoadResult {
                            ticket: request.ticket,
                            id: request.id,
                            outcome,
                        });
                    }
                    Err(_aborted) => {
                        log::debug!("Load of {} aborted", request.uri);
                    }
                }
            });
            Box::new(HttpLoadHandle { abort })
        }
    }

    struct HttpLoadHandle {
        abort: AbortHandle,
    }

    impl LoadHandle for HttpLoadHandle {
        fn cancel(&mut self) {
            self.abort.abort();
        }
    }
}
