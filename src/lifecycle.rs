//! Gateway lifecycle: startup, graceful shutdown, and hot reapply of
//! settings changes.
//!
//! The controller owns the two listeners (REST on `api_port`, WebSocket
//! on `ws_port`) and the optional key-gated sub-lifecycle: the mDNS
//! advertiser and the signaling idle sweeper run only while an access
//! key is configured. It is also the sole writer of the settings watch
//! channel, so snapshot replacement is atomic for every reader.
//!
//! State machine: `Stopped → Starting → Running → Stopping → Stopped`.
//! Partial startup failure unwinds whatever already started and reports
//! `StartupFailed`.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::config::{SettingsSnapshot, SettingsTx};
use crate::discovery::DiscoveryAdvertiser;
use crate::domain::CloseReason;
use crate::error::GatewayError;
use crate::service::SessionService;
use crate::ws::handler::ws_handler;

/// Position in the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Nothing is bound or advertised.
    Stopped,
    /// `start` is in progress.
    Starting,
    /// Listeners are serving.
    Running,
    /// `stop` is in progress.
    Stopping,
}

#[derive(Debug)]
struct ListenerHandle {
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Debug)]
struct RunningState {
    api: ListenerHandle,
    ws: ListenerHandle,
    sweeper: Option<JoinHandle<()>>,
    app: AppState,
}

#[derive(Debug)]
struct Inner {
    phase: LifecyclePhase,
    running: Option<RunningState>,
}

/// Owns startup, shutdown, and reconfiguration of every component.
#[derive(Debug)]
pub struct Lifecycle {
    settings_tx: SettingsTx,
    service: Arc<SessionService>,
    advertiser: Option<Arc<DiscoveryAdvertiser>>,
    inner: Mutex<Inner>,
}

impl Lifecycle {
    /// Creates a stopped controller. Pass `None` for the advertiser to
    /// run without mDNS (tests, containers without multicast).
    #[must_use]
    pub fn new(
        settings_tx: SettingsTx,
        service: Arc<SessionService>,
        advertiser: Option<Arc<DiscoveryAdvertiser>>,
    ) -> Self {
        Self {
            settings_tx,
            service,
            advertiser,
            inner: Mutex::new(Inner {
                phase: LifecyclePhase::Stopped,
                running: None,
            }),
        }
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> LifecyclePhase {
        self.inner.lock().await.phase
    }

    /// Actually-bound listener addresses `(rest, websocket)` while
    /// running. Relevant with OS-assigned port `0`.
    pub async fn bound_addrs(&self) -> Option<(SocketAddr, SocketAddr)> {
        self.inner
            .lock()
            .await
            .running
            .as_ref()
            .map(|r| (r.api.addr, r.ws.addr))
    }

    /// Brings the gateway up with the current settings snapshot.
    ///
    /// # Errors
    ///
    /// [`GatewayError::StartupFailed`] when a listener cannot bind or
    /// the advertiser cannot register; everything already started is
    /// unwound first. [`GatewayError::InvalidRequest`] when not
    /// currently stopped.
    pub async fn start(&self, app: AppState) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().await;
        if inner.phase != LifecyclePhase::Stopped {
            return Err(GatewayError::InvalidRequest(
                "gateway already started".to_string(),
            ));
        }
        inner.phase = LifecyclePhase::Starting;
        let snapshot = self.settings_tx.borrow().clone();

        let api = match spawn_listener(snapshot.api_port, rest_router(app.clone()), "rest").await {
            Ok(handle) => handle,
            Err(err) => {
                inner.phase = LifecyclePhase::Stopped;
                return Err(err);
            }
        };
        let ws = match spawn_listener(snapshot.ws_port, ws_router(app.clone()), "websocket").await {
            Ok(handle) => handle,
            Err(err) => {
                shutdown_listener(api, snapshot.shutdown_grace).await;
                inner.phase = LifecyclePhase::Stopped;
                return Err(err);
            }
        };

        let mut sweeper = None;
        if snapshot.api_key.is_some() {
            if let Some(advertiser) = &self.advertiser
                && let Err(err) = advertiser.start(api.addr.port(), ws.addr.port()).await
            {
                shutdown_listener(api, snapshot.shutdown_grace).await;
                shutdown_listener(ws, snapshot.shutdown_grace).await;
                inner.phase = LifecyclePhase::Stopped;
                return Err(err);
            }
            sweeper = Some(self.spawn_sweeper(snapshot.signal_idle_timeout));
        }

        tracing::info!(rest = %api.addr, websocket = %ws.addr, "gateway running");
        inner.running = Some(RunningState {
            api,
            ws,
            sweeper,
            app,
        });
        inner.phase = LifecyclePhase::Running;
        Ok(())
    }

    /// Replaces the settings snapshot and reapplies the difference.
    ///
    /// Port changes rebind both listeners; existing connections are
    /// closed with the `Restarting` reason first, never dropped
    /// abruptly. A key change alone leaves the listeners up, revokes
    /// every connection's authentication, closes all peer sessions, and
    /// restarts the key-gated sub-lifecycle.
    ///
    /// # Errors
    ///
    /// [`GatewayError::StartupFailed`] when a rebind or advertiser
    /// restart fails; a failed rebind stops the gateway.
    pub async fn apply_settings(&self, next: SettingsSnapshot) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().await;
        let previous = self.settings_tx.borrow().clone();
        let next = Arc::new(next);
        let _ = self.settings_tx.send(Arc::clone(&next));

        // Not running: the new snapshot simply takes effect on the next start.
        let Some(RunningState {
            mut api,
            mut ws,
            mut sweeper,
            app,
        }) = inner.running.take()
        else {
            return Ok(());
        };

        let ports_changed =
            previous.api_port != next.api_port || previous.ws_port != next.ws_port;
        let key_changed = previous.api_key != next.api_key;
        let registry = self.service.registry();

        if ports_changed {
            registry.close_all(CloseReason::Restarting).await;
            shutdown_listener(api, next.shutdown_grace).await;
            shutdown_listener(ws, next.shutdown_grace).await;

            api = match spawn_listener(next.api_port, rest_router(app.clone()), "rest").await {
                Ok(handle) => handle,
                Err(err) => {
                    self.unwind_after_failed_rebind(&mut inner, sweeper).await;
                    return Err(err);
                }
            };
            ws = match spawn_listener(next.ws_port, ws_router(app.clone()), "websocket").await {
                Ok(handle) => handle,
                Err(err) => {
                    shutdown_listener(api, next.shutdown_grace).await;
                    self.unwind_after_failed_rebind(&mut inner, sweeper).await;
                    return Err(err);
                }
            };
            tracing::info!(rest = %api.addr, websocket = %ws.addr, "listeners rebound");
        }

        if key_changed {
            registry.revoke_all_auth().await;
            self.service.broker().close_all_sessions().await;
        }

        // The advertiser and sweeper follow the key: present means
        // running, absent means stopped.
        if next.api_key.is_some() {
            if let Some(advertiser) = &self.advertiser
                && (ports_changed || key_changed || !advertiser.is_running().await)
            {
                if let Err(err) = advertiser.start(api.addr.port(), ws.addr.port()).await {
                    inner.running = Some(RunningState {
                        api,
                        ws,
                        sweeper,
                        app,
                    });
                    return Err(err);
                }
            }
            if sweeper.is_none() {
                sweeper = Some(self.spawn_sweeper(next.signal_idle_timeout));
            }
        } else {
            if let Some(advertiser) = &self.advertiser {
                advertiser.stop().await;
            }
            if let Some(task) = sweeper.take() {
                task.abort();
            }
        }

        inner.running = Some(RunningState {
            api,
            ws,
            sweeper,
            app,
        });
        Ok(())
    }

    /// Takes the gateway down: every connection is closed with the
    /// `Shutdown` reason, the advertiser withdraws its record, peer
    /// sessions close, and both listeners drain (force-aborted after
    /// the grace period). Idempotent from `Stopped`.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        let Some(RunningState {
            api, ws, sweeper, ..
        }) = inner.running.take()
        else {
            inner.phase = LifecyclePhase::Stopped;
            return;
        };
        inner.phase = LifecyclePhase::Stopping;
        let grace = self.settings_tx.borrow().shutdown_grace;

        self.service.registry().close_all(CloseReason::Shutdown).await;
        self.service.broker().close_all_sessions().await;
        if let Some(advertiser) = &self.advertiser {
            advertiser.stop().await;
        }
        if let Some(task) = sweeper {
            task.abort();
        }
        shutdown_listener(api, grace).await;
        shutdown_listener(ws, grace).await;

        inner.phase = LifecyclePhase::Stopped;
        tracing::info!("gateway stopped");
    }

    fn spawn_sweeper(&self, idle_timeout: Duration) -> JoinHandle<()> {
        let broker = Arc::clone(self.service.broker());
        tokio::spawn(async move {
            let period = (idle_timeout / 2).max(Duration::from_millis(250));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                broker.sweep_idle(idle_timeout).await;
            }
        })
    }

    async fn unwind_after_failed_rebind(
        &self,
        inner: &mut Inner,
        sweeper: Option<JoinHandle<()>>,
    ) {
        if let Some(advertiser) = &self.advertiser {
            advertiser.stop().await;
        }
        if let Some(task) = sweeper {
            task.abort();
        }
        inner.phase = LifecyclePhase::Stopped;
        tracing::error!("rebind failed; gateway stopped");
    }
}

fn rest_router(app: AppState) -> Router {
    let router = api::build_router();
    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/docs")
            .url("/api-docs/openapi.json", <api::ApiDoc as utoipa::OpenApi>::openapi()),
    );
    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}

fn ws_router(app: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

async fn spawn_listener(
    port: u16,
    router: Router,
    label: &'static str,
) -> Result<ListenerHandle, GatewayError> {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .await
        .map_err(|e| GatewayError::StartupFailed(format!("{label} listener bind (port {port}): {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| GatewayError::StartupFailed(format!("{label} listener address: {e}")))?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.changed().await;
        };
        if let Err(err) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(listener = label, %err, "listener error");
        }
    });

    tracing::info!(listener = label, %addr, "listener bound");
    Ok(ListenerHandle {
        addr,
        shutdown_tx,
        task,
    })
}

async fn shutdown_listener(mut handle: ListenerHandle, grace: Duration) {
    let _ = handle.shutdown_tx.send(true);
    if tokio::time::timeout(grace, &mut handle.task).await.is_err() {
        tracing::warn!(addr = %handle.addr, "listener did not drain in time; aborting");
        handle.task.abort();
    }
}
