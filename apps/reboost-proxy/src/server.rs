use std::{
	fmt,
	net::SocketAddr,
	sync::{Arc, mpsc},
	thread::{self, JoinHandle},
	time::Duration,
};

use axum::Router;
use tokio::{
	net::{self, TcpListener, TcpSocket},
	runtime::Builder,
	sync::{Notify, oneshot},
	time,
};

use crate::{
	Error, Result,
	routes::{self, AppState},
	state::ServerState,
};
use reboost_config::{Config, ShutdownMode};
use reboost_service::Pipeline;

const LISTEN_BACKLOG: u32 = 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Created,
	Starting,
	Ready,
	Stopping,
	Stopped,
}
impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Created => "created",
			Self::Starting => "starting",
			Self::Ready => "ready",
			Self::Stopping => "stopping",
			Self::Stopped => "stopped",
		};

		f.write_str(name)
	}
}

/// The listener, running on a dedicated OS thread that owns a current-thread runtime.
///
/// `start` returns once the socket is bound and routes are live, or with the reason it never got
/// there. `close` stops the thread and waits for it to exit. By default in-flight requests are
/// dropped; `shutdown = "drain"` lets them finish for up to `drain_timeout_ms`.
pub struct ProxyServer {
	cfg: reboost_config::Server,
	state: Arc<ServerState>,
	router: Option<Router>,
	phase: Phase,
	running: Option<Running>,
}

struct Running {
	addr: SocketAddr,
	stop: oneshot::Sender<()>,
	thread: JoinHandle<()>,
}

impl ProxyServer {
	/// Validates the route set and builds the router. Nothing is bound yet.
	pub fn new(
		cfg: &reboost_config::Server,
		state: Arc<ServerState>,
		pipeline: Arc<Pipeline>,
	) -> Result<Self> {
		let app = AppState { pipeline, server: state.clone() };
		let router = routes::router(app, &cfg.status_path, &cfg.status_method)?;

		Ok(Self {
			cfg: cfg.clone(),
			state,
			router: Some(router),
			phase: Phase::Created,
			running: None,
		})
	}

	/// Builds every component from `cfg` and wires them into a server.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let state = Arc::new(ServerState::new(&cfg.server, &[cfg.codex.status_path.as_str()]));
		let pipeline = reboost_service::build_pipeline(cfg, state.clone())?;

		Self::new(&cfg.server, state, Arc::new(pipeline))
	}

	pub fn phase(&self) -> Phase {
		self.phase
	}

	pub fn state(&self) -> &Arc<ServerState> {
		&self.state
	}

	pub fn local_addr(&self) -> Option<SocketAddr> {
		self.running.as_ref().map(|running| running.addr)
	}

	pub fn start(&mut self) -> Result<SocketAddr> {
		let Some(router) = self.router.take().filter(|_| self.phase == Phase::Created) else {
			return Err(Error::InvalidState { operation: "start", phase: self.phase });
		};

		self.phase = Phase::Starting;

		let runtime = match Builder::new_current_thread().enable_all().build() {
			Ok(runtime) => runtime,
			Err(err) => {
				self.phase = Phase::Stopped;

				return Err(Error::Runtime(err));
			},
		};
		let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<SocketAddr>>(1);
		let (stop, stopped) = oneshot::channel::<()>();
		let cfg = self.cfg.clone();
		let state = self.state.clone();
		let spawned = thread::Builder::new().name("reboost-proxy".to_string()).spawn(move || {
			runtime.block_on(serve(cfg, router, state, ready_tx, stopped));
			// Connection tasks still running are abandoned, not awaited.
			runtime.shutdown_background();
		});
		let thread = match spawned {
			Ok(thread) => thread,
			Err(err) => {
				self.phase = Phase::Stopped;

				return Err(Error::Runtime(err));
			},
		};
		let timeout_ms = self.cfg.startup_timeout_ms;

		match ready_rx.recv_timeout(Duration::from_millis(timeout_ms)) {
			Ok(Ok(addr)) => {
				self.phase = Phase::Ready;
				self.running = Some(Running { addr, stop, thread });

				Ok(addr)
			},
			Ok(Err(err)) => {
				self.phase = Phase::Stopped;

				let _ = thread.join();

				Err(err)
			},
			Err(mpsc::RecvTimeoutError::Timeout) => {
				self.phase = Phase::Stopped;

				let _ = stop.send(());

				tracing::error!(timeout_ms, "Proxy server did not become ready.");

				Err(Error::StartupTimeout { timeout_ms })
			},
			Err(mpsc::RecvTimeoutError::Disconnected) => {
				self.phase = Phase::Stopped;

				Err(Error::ServerExited { message: exit_message(thread) })
			},
		}
	}

	pub fn close(&mut self) -> Result<()> {
		match self.phase {
			Phase::Created => {
				self.phase = Phase::Stopped;
				self.router = None;

				return Ok(());
			},
			Phase::Stopped => return Ok(()),
			Phase::Ready => {},
			phase => return Err(Error::InvalidState { operation: "close", phase }),
		}

		let Some(running) = self.running.take() else {
			self.phase = Phase::Stopped;

			return Ok(());
		};

		self.phase = Phase::Stopping;

		if self.cfg.shutdown == ShutdownMode::FailFast {
			tracing::warn!(addr = %running.addr, "Stopping proxy server without draining.");
		} else {
			tracing::info!(addr = %running.addr, "Draining proxy server.");
		}

		let _ = running.stop.send(());
		let joined = running.thread.join();

		self.phase = Phase::Stopped;
		self.state.mark_stopped();

		match joined {
			Ok(()) => {
				tracing::info!(addr = %running.addr, "Proxy server stopped.");

				Ok(())
			},
			Err(panic) => Err(Error::ServerExited { message: panic_text(panic) }),
		}
	}
}
impl Drop for ProxyServer {
	fn drop(&mut self) {
		if self.running.is_some()
			&& let Err(err) = self.close()
		{
			tracing::warn!(error = %err, "Proxy server did not stop cleanly.");
		}
	}
}

async fn serve(
	cfg: reboost_config::Server,
	router: Router,
	state: Arc<ServerState>,
	ready: mpsc::SyncSender<Result<SocketAddr>>,
	stopped: oneshot::Receiver<()>,
) {
	let listener = match bind(&cfg).await {
		Ok(listener) => listener,
		Err(err) => {
			tracing::error!(error = %err, "Proxy server failed to start.");

			let _ = ready.send(Err(err));

			return;
		},
	};
	let addr = match listener.local_addr() {
		Ok(addr) => addr,
		Err(source) => {
			let _ = ready.send(Err(Error::Bind { addr: bind_target(&cfg), source }));

			return;
		},
	};

	state.mark_ready(addr);

	tracing::info!(%addr, status_path = %cfg.status_path, "Proxy server listening.");

	if ready.send(Ok(addr)).is_err() {
		// `start` gave up waiting.
		state.mark_stopped();

		return;
	}

	let served = match cfg.shutdown {
		ShutdownMode::FailFast => {
			tokio::select! {
				served = axum::serve(listener, router).into_future() => served,
				_ = stopped => Ok(()),
			}
		},
		ShutdownMode::Drain => {
			let stopping = Arc::new(Notify::new());
			let signal = {
				let stopping = stopping.clone();

				async move {
					let _ = stopped.await;

					stopping.notify_one();
				}
			};
			let drain_timeout = Duration::from_millis(cfg.drain_timeout_ms);

			tokio::select! {
				served = axum::serve(listener, router)
					.with_graceful_shutdown(signal)
					.into_future() => served,
				_ = async {
					stopping.notified().await;
					time::sleep(drain_timeout).await;
				} => {
					tracing::warn!(
						drain_timeout_ms = cfg.drain_timeout_ms,
						"Drain timed out. Dropping remaining requests."
					);

					Ok(())
				},
			}
		},
	};

	state.mark_stopped();

	if let Err(err) = served {
		tracing::error!(error = %err, "Proxy server stopped with an error.");
	}
}

async fn bind(cfg: &reboost_config::Server) -> Result<TcpListener> {
	let target = bind_target(cfg);
	let bind_err = |source| Error::Bind { addr: target.clone(), source };
	let addr = net::lookup_host((cfg.host.as_str(), cfg.port))
		.await
		.map_err(bind_err)?
		.next()
		.ok_or_else(|| {
			bind_err(std::io::Error::new(std::io::ErrorKind::NotFound, "host did not resolve"))
		})?;
	let socket = if addr.is_ipv4() { TcpSocket::new_v4() } else { TcpSocket::new_v6() };
	let socket = socket.map_err(bind_err)?;

	socket.set_reuseaddr(true).map_err(bind_err)?;
	socket.set_recv_buffer_size(cfg.read_bytes.min(u32::MAX as usize) as u32).map_err(bind_err)?;
	socket.bind(addr).map_err(bind_err)?;

	socket.listen(LISTEN_BACKLOG).map_err(bind_err)
}

fn bind_target(cfg: &reboost_config::Server) -> String {
	format!("{}:{}", cfg.host, cfg.port)
}

fn exit_message(thread: JoinHandle<()>) -> String {
	match thread.join() {
		Ok(()) => "server thread exited before reporting readiness.".to_string(),
		Err(panic) => panic_text(panic),
	}
}

fn panic_text(panic: Box<dyn std::any::Any + Send>) -> String {
	match panic.downcast::<String>() {
		Ok(message) => *message,
		Err(panic) => match panic.downcast::<&str>() {
			Ok(message) => message.to_string(),
			Err(_) => "server thread panicked.".to_string(),
		},
	}
}
