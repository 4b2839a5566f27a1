//! Priority request engine.
//!
//! An [`AsyncServent`] owns one worker thread that pops [`Request`]s from a
//! priority queue and hands them to a [`RequestHandler`]. Handlers push
//! [`Response`]s through a [`Responder`]; the caller is woken through a
//! one-slot channel and drains them on its own thread with
//! [`AsyncServent::drain_responses`].
//!
//! Both queues are plain locked containers. The channels only carry
//! wakeups, and a wakeup that finds the channel full is dropped because
//! one is already pending.
//!
//! ```no_run
//! use mailsync_core::{AsyncServent, Backend, RequestKind, Response};
//!
//! # async fn run(backend: Backend) -> mailsync_core::Result<()> {
//! let mut engine = AsyncServent::new(backend);
//! let mut signal = engine.take_response_signal().expect("first call");
//! engine.run()?;
//! engine.push(RequestKind::Initialize);
//! engine.push(RequestKind::ListFolders);
//!
//! while signal.recv().await.is_some() {
//!     engine.drain_responses(&mut |response: Response| println!("{response:?}"));
//! }
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::collections::{BinaryHeap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, trace};

use crate::Result;
use crate::request::{Request, RequestKind};
use crate::response::Response;

/// Processes requests on the worker thread.
#[allow(async_fn_in_trait)]
pub trait RequestHandler: Send + 'static {
    /// Handles one request, pushing any number of responses.
    ///
    /// A returned error reaches the caller as [`Response::Error`], or as
    /// [`Response::LoginError`] when the request was `Initialize`.
    async fn handle(&mut self, request: Request, responses: &Responder) -> Result<()>;
}

/// Consumes responses on the caller's thread.
pub trait ResponseHandler {
    /// Handles one response.
    fn handle(&mut self, response: Response);
}

impl<F: FnMut(Response)> ResponseHandler for F {
    fn handle(&mut self, response: Response) {
        self(response);
    }
}

#[derive(Debug)]
struct Queues {
    requests: Mutex<BinaryHeap<Request>>,
    responses: Mutex<VecDeque<Response>>,
    response_signal: mpsc::Sender<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pushes responses to the caller. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Responder {
    queues: Arc<Queues>,
}

impl Responder {
    /// Queues a response and wakes the caller.
    pub fn send(&self, response: Response) {
        lock(&self.queues.responses).push_back(response);
        match self.queues.response_signal.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => trace!("response signal receiver dropped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wakeup {
    NewRequest,
    Exit,
}

#[derive(Debug)]
struct Worker {
    wakeup: mpsc::Sender<Wakeup>,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Worker {
    fn notify(&self, wakeup: Wakeup) {
        match self.wakeup.try_send(wakeup) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => trace!("worker already gone"),
        }
    }

    fn signal_exit(&self) {
        // A full channel still wakes the worker, which then sees the flag.
        self.stop.store(true, Ordering::Release);
        self.notify(Wakeup::Exit);
    }
}

/// Runs a [`RequestHandler`] on a worker thread.
///
/// Requests are served by kind priority (see [`RequestKind`]); within one
/// kind the most recently pushed request goes first.
pub struct AsyncServent<H: RequestHandler> {
    queues: Arc<Queues>,
    handler: Arc<Mutex<H>>,
    worker: Option<Worker>,
    response_signal: Option<mpsc::Receiver<()>>,
}

impl<H: RequestHandler> AsyncServent<H> {
    /// Creates a stopped engine. Call [`run`](Self::run) to start serving.
    pub fn new(handler: H) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(1);
        Self {
            queues: Arc::new(Queues {
                requests: Mutex::new(BinaryHeap::new()),
                responses: Mutex::new(VecDeque::new()),
                response_signal: signal_tx,
            }),
            handler: Arc::new(Mutex::new(handler)),
            worker: None,
            response_signal: Some(signal_rx),
        }
    }

    /// Queues a request and wakes the worker. Returns the request id.
    pub fn push(&self, request: impl Into<Request>) -> u64 {
        let request = request.into();
        let id = request.id();
        trace!(id, kind = request.kind().name(), "request queued");
        lock(&self.queues.requests).push(request);
        if let Some(worker) = &self.worker {
            worker.notify(Wakeup::NewRequest);
        }
        id
    }

    /// Queues a response as if the worker had produced it.
    pub fn push_response(&self, response: Response) {
        self.responder().send(response);
    }

    /// A handle for pushing responses from elsewhere.
    #[must_use]
    pub fn responder(&self) -> Responder {
        Responder {
            queues: Arc::clone(&self.queues),
        }
    }

    /// Requests not yet taken by the worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.queues.requests).len()
    }

    /// True while a worker thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.thread.is_finished())
    }

    /// Starts the worker, stopping the current one first.
    ///
    /// A stopped worker finishes its in-flight request; queued requests
    /// stay queued for the new worker.
    pub fn run(&mut self) -> Result<()> {
        if let Some(old) = self.worker.take() {
            info!("restarting worker");
            old.signal_exit();
        }

        let (wakeup_tx, wakeup_rx) = mpsc::channel(1);
        let stop = Arc::new(AtomicBool::new(false));
        let queues = Arc::clone(&self.queues);
        let handler = Arc::clone(&self.handler);
        let worker_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("mailsync-worker".to_string())
            .spawn(move || worker_loop(&queues, &handler, wakeup_rx, &worker_stop))?;

        let worker = Worker {
            wakeup: wakeup_tx,
            stop,
            thread,
        };
        worker.notify(Wakeup::NewRequest);
        self.worker = Some(worker);
        Ok(())
    }

    /// Takes the receiver that fires when responses are queued.
    ///
    /// Returns `None` after the first call.
    pub const fn take_response_signal(&mut self) -> Option<mpsc::Receiver<()>> {
        self.response_signal.take()
    }

    /// Hands every queued response to `handler`, oldest first.
    ///
    /// The queue is unlocked while the handler runs. Returns the number
    /// of responses handled.
    pub fn drain_responses<R: ResponseHandler + ?Sized>(&self, handler: &mut R) -> usize {
        let mut count = 0;
        loop {
            let Some(response) = lock(&self.queues.responses).pop_front() else {
                break;
            };
            handler.handle(response);
            count += 1;
        }
        count
    }

    /// Stops the worker and waits for it to finish its in-flight request.
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.signal_exit();
            if worker.thread.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

impl<H: RequestHandler> Drop for AsyncServent<H> {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.signal_exit();
        }
    }
}

fn worker_loop<H: RequestHandler>(
    queues: &Arc<Queues>,
    handler: &Mutex<H>,
    mut wakeup: mpsc::Receiver<Wakeup>,
    stop: &AtomicBool,
) {
    let responder = Responder {
        queues: Arc::clone(queues),
    };
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start worker runtime");
            responder.send(Response::error(format!("worker runtime: {e}")));
            return;
        }
    };

    info!("worker started");
    'wakeups: while let Some(Wakeup::NewRequest) = wakeup.blocking_recv() {
        loop {
            if stop.load(Ordering::Acquire) {
                break 'wakeups;
            }
            let Some(request) = lock(&queues.requests).pop() else {
                break;
            };
            process(&runtime, handler, request, &responder);
        }
    }
    info!("worker exiting");
}

fn process<H: RequestHandler>(
    runtime: &Runtime,
    handler: &Mutex<H>,
    request: Request,
    responder: &Responder,
) {
    let id = request.id();
    let kind = request.kind().name();
    let login = matches!(request.kind(), RequestKind::Initialize);
    debug!(id, kind, "handling request");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut handler = lock(handler);
        runtime.block_on(RequestHandler::handle(&mut *handler, request, responder))
    }));

    let message = match outcome {
        Ok(Ok(())) => {
            debug!(id, kind, "request finished");
            return;
        }
        Ok(Err(e)) => {
            error!(id, kind, error = %e, "request failed");
            e.to_string()
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(id, kind, panic = %message, "request handler panicked");
            message
        }
    };

    responder.send(if login {
        Response::LoginError { message }
    } else {
        Response::Error { message }
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "request handler panicked".to_string())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::folder::FolderPath;
    use crate::request::Indices;
    use std::time::Duration;

    /// Records the ids it sees and answers each with a status.
    struct Recorder {
        seen: Arc<Mutex<Vec<u64>>>,
    }

    impl RequestHandler for Recorder {
        async fn handle(&mut self, request: Request, responses: &Responder) -> Result<()> {
            self.seen.lock().unwrap().push(request.id());
            match request.into_kind() {
                RequestKind::DeleteFolder { .. } => panic!("boom"),
                RequestKind::Initialize => Err(Error::Config("bad password".to_string())),
                RequestKind::ExpungeFolder { .. } => {
                    Err(Error::FolderNotFound("Trash".to_string()))
                }
                kind => {
                    responses.send(Response::status(kind.name()));
                    Ok(())
                }
            }
        }
    }

    fn engine() -> (AsyncServent<Recorder>, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = AsyncServent::new(Recorder {
            seen: Arc::clone(&seen),
        });
        (engine, seen)
    }

    fn list() -> RequestKind {
        RequestKind::ListMessages {
            path: FolderPath::parse("INBOX"),
            indices: Indices::new(),
        }
    }

    /// Collects responses until `count` arrived or a second passes.
    fn collect(engine: &mut AsyncServent<Recorder>, count: usize) -> Vec<Response> {
        let mut signal = engine.take_response_signal().unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let mut out = Vec::new();
        rt.block_on(async {
            while out.len() < count {
                let woke = tokio::time::timeout(Duration::from_secs(1), signal.recv()).await;
                if !matches!(woke, Ok(Some(()))) {
                    break;
                }
                engine.drain_responses(&mut |r: Response| out.push(r));
            }
        });
        out
    }

    #[test]
    fn test_same_kind_newest_first() {
        let (mut engine, seen) = engine();
        let first = engine.push(list());
        let second = engine.push(list());
        engine.run().unwrap();
        let responses = collect(&mut engine, 2);
        engine.shutdown();

        assert_eq!(responses.len(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![second, first]);
    }

    #[test]
    fn test_kind_priority() {
        let (mut engine, seen) = engine();
        let flags = engine.push(RequestKind::SetFlags {
            path: FolderPath::parse("INBOX"),
            indices: Indices::from([0]),
            flags: mailsync_mime::MessageFlags::SEEN,
        });
        let listing = engine.push(list());
        let folders = engine.push(RequestKind::ListFolders);
        engine.run().unwrap();
        collect(&mut engine, 3);
        engine.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec![folders, listing, flags]);
    }

    #[test]
    fn test_errors_become_responses() {
        let (mut engine, _) = engine();
        engine.push(RequestKind::Initialize);
        engine.run().unwrap();
        engine.push(RequestKind::ExpungeFolder {
            path: FolderPath::parse("Trash"),
        });
        let responses = collect(&mut engine, 2);
        engine.shutdown();

        assert!(responses.contains(&Response::LoginError {
            message: "Configuration error: bad password".to_string(),
        }));
        assert!(responses.contains(&Response::Error {
            message: "Folder not found: Trash".to_string(),
        }));
    }

    #[test]
    fn test_panic_does_not_stop_worker() {
        let (mut engine, _) = engine();
        engine.push(RequestKind::DeleteFolder {
            path: FolderPath::parse("x"),
        });
        engine.run().unwrap();
        let mut signal = engine.take_response_signal().unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let mut out = Vec::new();
        rt.block_on(async {
            signal.recv().await.unwrap();
            engine.drain_responses(&mut |r: Response| out.push(r));
            engine.push(RequestKind::ListFolders);
            while out.len() < 2 {
                tokio::time::timeout(Duration::from_secs(1), signal.recv())
                    .await
                    .unwrap()
                    .unwrap();
                engine.drain_responses(&mut |r: Response| out.push(r));
            }
        });
        engine.shutdown();

        assert_eq!(out[0], Response::error("boom"));
        assert_eq!(out[1], Response::status("list-folders"));
    }

    #[test]
    fn test_restart_after_exit() {
        let (mut engine, seen) = engine();
        engine.run().unwrap();
        engine.shutdown();
        assert!(!engine.is_running());

        engine.run().unwrap();
        let id = engine.push(RequestKind::ListFolders);
        let responses = collect(&mut engine, 1);
        engine.shutdown();

        assert_eq!(responses, vec![Response::status("list-folders")]);
        assert_eq!(*seen.lock().unwrap(), vec![id]);
    }

    #[test]
    fn test_run_replaces_worker() {
        let (mut engine, _) = engine();
        engine.run().unwrap();
        engine.run().unwrap();
        engine.push(RequestKind::ListFolders);
        let responses = collect(&mut engine, 1);
        engine.shutdown();
        assert_eq!(responses, vec![Response::status("list-folders")]);
    }

    #[test]
    fn test_drain_without_worker() {
        let (engine, _) = engine();
        engine.push_response(Response::status("a"));
        engine.push_response(Response::status("b"));
        let mut got = Vec::new();
        assert_eq!(engine.drain_responses(&mut |r: Response| got.push(r)), 2);
        assert_eq!(got, vec![Response::status("a"), Response::status("b")]);
        assert_eq!(engine.pending(), 0);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "request handler panicked");
    }
}
