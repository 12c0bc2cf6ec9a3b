//! Per-campaign dispatch scheduling.
//!
//! Each registered campaign owns one periodic task. A tick loads the
//! campaign, computes free concurrency slots from the gateway's active
//! count, selects fresh calls before due retries, and runs the dial
//! pipeline for the whole batch concurrently — but waits for every dial to
//! resolve before returning, so the next tick sees an accurate active
//! count. A campaign completes exactly once, when its pending population
//! (queued plus in flight) reaches zero; webhook volume is never trusted
//! for completion.

use crate::compliance::{DndChecker, DndOutcome};
use crate::error::EngineError;
use crate::publish::Publisher;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;
use voxcast_db::DbPool;
use voxcast_store::calls::RetryPolicy;
use voxcast_store::{broadcasts, calls, optouts, StoreError};
use voxcast_telephony::{PlaceRequest, TelephonyProvider, TelephonyError};
use voxcast_types::{
    broadcast_room, Broadcast, BroadcastEvent, BroadcastStatus, Call, CallStatus, CallUpdate,
    BroadcastUpdate, GLOBAL_ROOM,
};
use voxcast_voice::AssetStore;

/// Dispatch poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    /// Publicly reachable base URL; embedded in script and callback URLs
    /// handed to the provider.
    pub public_base_url: String,
}

/// What a tick decided about the campaign's future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep polling.
    Continue,
    /// The campaign is done (or gone); the loop retires.
    Stop,
}

struct DispatchHandle {
    task: JoinHandle<()>,
    /// Held for the duration of a tick; `try_lock` failure means a tick is
    /// still running and the new one is suppressed.
    gate: Arc<tokio::sync::Mutex<()>>,
}

struct Inner {
    pool: DbPool,
    provider: Arc<dyn TelephonyProvider>,
    publisher: Arc<dyn Publisher>,
    dnd: Arc<dyn DndChecker>,
    assets: Arc<dyn AssetStore>,
    settings: EngineSettings,
    registry: Mutex<HashMap<String, DispatchHandle>>,
}

/// The dispatch engine. Cheap to clone; all clones share the registry.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Runs a gateway operation on the blocking pool.
async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<T, StoreError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<T, EngineError> {
        let mut conn = pool.get()?;
        Ok(f(&mut conn)?)
    })
    .await
    .map_err(|e| EngineError::Join(e.to_string()))?
}

impl Dispatcher {
    pub fn new(
        pool: DbPool,
        provider: Arc<dyn TelephonyProvider>,
        publisher: Arc<dyn Publisher>,
        dnd: Arc<dyn DndChecker>,
        assets: Arc<dyn AssetStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                provider,
                publisher,
                dnd,
                assets,
                settings,
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, DispatchHandle>> {
        lock_registry(&self.inner)
    }

    /// Registers a campaign and starts its dispatch loop. Idempotent: a
    /// campaign that is already registered is left alone.
    pub fn start(&self, broadcast_id: &str) {
        let mut registry = self.registry();
        if registry.contains_key(broadcast_id) {
            tracing::warn!(broadcast_id, "campaign already registered, ignoring start");
            return;
        }

        let gate = Arc::new(tokio::sync::Mutex::new(()));
        let task = tokio::spawn(run_loop(
            self.inner.clone(),
            broadcast_id.to_string(),
            gate.clone(),
        ));
        registry.insert(broadcast_id.to_string(), DispatchHandle { task, gate });
        tracing::info!(broadcast_id, "registered campaign for dispatch");
    }

    /// Unregisters a campaign and kills its dispatch loop.
    pub fn stop(&self, broadcast_id: &str) {
        if let Some(handle) = self.registry().remove(broadcast_id) {
            handle.task.abort();
            tracing::info!(broadcast_id, "stopped campaign dispatch");
        }
    }

    pub fn is_registered(&self, broadcast_id: &str) -> bool {
        self.registry().contains_key(broadcast_id)
    }

    pub fn registered_count(&self) -> usize {
        self.registry().len()
    }

    /// One dispatch tick, exactly as the loop runs it. Exposed so callers
    /// (and tests) can drive a campaign deterministically; the periodic
    /// loop serializes its own invocations through the per-campaign gate.
    pub async fn tick(&self, broadcast_id: &str) -> Result<TickOutcome, EngineError> {
        run_tick(&self.inner, broadcast_id).await
    }

    /// Cancels a campaign: stops the loop, flips queued calls to
    /// `cancelled`, marks the campaign, and emits one update. Calls already
    /// in flight with the provider are left to finish via their webhooks.
    /// Returns how many queued calls were cancelled; a no-op on campaigns
    /// that already reached a terminal state.
    pub async fn cancel(&self, broadcast_id: &str) -> Result<u64, EngineError> {
        self.stop(broadcast_id);

        let now = now_ms();
        let id = broadcast_id.to_string();
        let cancelled = with_conn(&self.inner.pool, move |conn| {
            // Existence check first so a cancel of an unknown id is a 404,
            // not a silent zero.
            broadcasts::get_broadcast(conn, &id)?;
            let cancelled = calls::cancel_queued(conn, &id, now)?;
            broadcasts::mark_cancelled(conn, &id, now)?;
            Ok(cancelled)
        })
        .await?;

        emit_broadcast_update(&self.inner, broadcast_id).await?;
        self.inner.publisher.publish(
            GLOBAL_ROOM,
            BroadcastEvent::BroadcastListUpdate { timestamp: now_ms() },
        );
        self.inner.publisher.publish(
            GLOBAL_ROOM,
            BroadcastEvent::StatsUpdate { timestamp: now_ms() },
        );
        tracing::info!(broadcast_id, cancelled, "campaign cancelled");
        Ok(cancelled)
    }

    /// Deletes a campaign: cancel semantics if still live, CDN asset
    /// cleanup, then the rows (calls and assets cascade).
    pub async fn delete(&self, broadcast_id: &str) -> Result<(), EngineError> {
        self.stop(broadcast_id);

        let now = now_ms();
        let id = broadcast_id.to_string();
        let assets = with_conn(&self.inner.pool, move |conn| {
            let broadcast = broadcasts::get_broadcast(conn, &id)?;
            if !broadcast.status.is_terminal() {
                calls::cancel_queued(conn, &id, now)?;
                broadcasts::mark_cancelled(conn, &id, now)?;
            }
            broadcasts::list_audio_assets(conn, &id)
        })
        .await?;

        // Asset cleanup is best-effort; a stranded CDN object must not
        // block deletion of the campaign rows.
        for asset in assets {
            if let Err(e) = self.inner.assets.delete(&asset.unique_key).await {
                tracing::warn!(
                    broadcast_id,
                    key = %asset.unique_key,
                    error = %e,
                    "failed to delete audio asset"
                );
            }
        }

        let id = broadcast_id.to_string();
        with_conn(&self.inner.pool, move |conn| {
            broadcasts::delete_broadcast(conn, &id).map(|_| ())
        })
        .await?;

        self.inner.publisher.publish(
            GLOBAL_ROOM,
            BroadcastEvent::BroadcastListUpdate { timestamp: now_ms() },
        );
        tracing::info!(broadcast_id, "campaign deleted");
        Ok(())
    }
}

fn lock_registry(inner: &Inner) -> MutexGuard<'_, HashMap<String, DispatchHandle>> {
    match inner.registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            // A panicked registrant leaves the map itself intact; refusing
            // all dispatch over a poisoned lock would strand campaigns.
            tracing::error!("dispatch registry lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

async fn run_loop(inner: Arc<Inner>, broadcast_id: String, gate: Arc<tokio::sync::Mutex<()>>) {
    let mut ticker = tokio::time::interval(inner.settings.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Ok(_guard) = gate.try_lock() else {
            tracing::warn!(broadcast_id = %broadcast_id, "previous tick still running, skipping");
            continue;
        };

        match run_tick(&inner, &broadcast_id).await {
            Ok(TickOutcome::Continue) => {}
            Ok(TickOutcome::Stop) => break,
            Err(e) => {
                tracing::error!(broadcast_id = %broadcast_id, error = %e, "dispatch tick failed");
            }
        }
    }

    lock_registry(&inner).remove(&broadcast_id);
    tracing::info!(broadcast_id = %broadcast_id, "dispatch loop retired");
}

async fn run_tick(inner: &Arc<Inner>, broadcast_id: &str) -> Result<TickOutcome, EngineError> {
    let now = now_ms();

    let id = broadcast_id.to_string();
    let broadcast = match with_conn(&inner.pool, move |conn| broadcasts::get_broadcast(conn, &id))
        .await
    {
        Ok(b) => b,
        Err(EngineError::Store(StoreError::NotFound(_))) => {
            tracing::warn!(broadcast_id, "campaign vanished, retiring dispatch");
            return Ok(TickOutcome::Stop);
        }
        Err(e) => return Err(e),
    };

    if broadcast.status.is_terminal() {
        return Ok(TickOutcome::Stop);
    }
    if broadcast.status == BroadcastStatus::Draft {
        // Not enqueued yet (materialization still pending); check again later.
        return Ok(TickOutcome::Continue);
    }

    if broadcast.status == BroadcastStatus::Queued {
        let id = broadcast_id.to_string();
        if with_conn(&inner.pool, move |conn| broadcasts::mark_started(conn, &id, now)).await? {
            tracing::info!(broadcast_id, "campaign dispatch started");
            emit_broadcast_update(inner, broadcast_id).await?;
        }
    }

    let id = broadcast_id.to_string();
    let active = with_conn(&inner.pool, move |conn| calls::count_active(conn, &id)).await?;
    let slots = u64::from(broadcast.config.max_concurrent).saturating_sub(active);
    if slots == 0 {
        return Ok(TickOutcome::Continue);
    }
    let slots = u32::try_from(slots).unwrap_or(u32::MAX);

    let id = broadcast_id.to_string();
    let max_retries = broadcast.config.max_retries;
    let batch = with_conn(&inner.pool, move |conn| {
        let mut batch = calls::get_fresh(conn, &id, slots)?;
        let deficit = slots.saturating_sub(batch.len() as u32);
        if deficit > 0 {
            batch.extend(calls::get_retryable(conn, &id, deficit, max_retries, now)?);
        }
        Ok(batch)
    })
    .await?;

    if batch.is_empty() {
        let id = broadcast_id.to_string();
        let pending = with_conn(&inner.pool, move |conn| calls::count_pending(conn, &id)).await?;
        if pending == 0 {
            let id = broadcast_id.to_string();
            let completed =
                with_conn(&inner.pool, move |conn| broadcasts::mark_completed(conn, &id, now))
                    .await?;
            if completed {
                tracing::info!(broadcast_id, "campaign completed");
                emit_broadcast_update(inner, broadcast_id).await?;
                inner.publisher.publish(
                    GLOBAL_ROOM,
                    BroadcastEvent::BroadcastListUpdate { timestamp: now_ms() },
                );
                inner.publisher.publish(
                    GLOBAL_ROOM,
                    BroadcastEvent::StatsUpdate { timestamp: now_ms() },
                );
            }
            return Ok(TickOutcome::Stop);
        }
        return Ok(TickOutcome::Continue);
    }

    // Dial the batch concurrently but resolve it fully before returning:
    // the tick's contract is that the next active count is accurate.
    let dials = batch
        .into_iter()
        .map(|call| dial_one(inner.clone(), broadcast.clone(), call));
    join_all(dials).await;

    Ok(TickOutcome::Continue)
}

/// Error containment for one dial: a failed call never aborts its batch.
async fn dial_one(inner: Arc<Inner>, broadcast: Broadcast, call: Call) {
    let call_id = call.id.clone();
    if let Err(e) = dial_pipeline(&inner, &broadcast, call).await {
        tracing::error!(call_id = %call_id, error = %e, "dial pipeline failed");
    }
}

async fn dial_pipeline(
    inner: &Arc<Inner>,
    broadcast: &Broadcast,
    call: Call,
) -> Result<(), EngineError> {
    let now = now_ms();
    let room = broadcast_room(&broadcast.id);

    // Optimistic pre-dial update so dashboards move immediately.
    inner.publisher.publish(
        &room,
        BroadcastEvent::CallUpdate(CallUpdate {
            broadcast_id: broadcast.id.clone(),
            call_id: call.id.clone(),
            call_sid: None,
            phone: call.contact.phone.clone(),
            status: CallStatus::Calling,
            duration: None,
            timestamp: now,
        }),
    );

    // Compliance, in fixed order: DND registry first, opt-out store second.
    if broadcast.config.compliance.dnd_respect {
        let outcome = inner.dnd.check(&call.contact.phone).await;
        if outcome == DndOutcome::Blocked {
            let id = call.id.clone();
            with_conn(&inner.pool, move |conn| calls::mark_dnd_blocked(conn, &id, now)).await?;
            emit_refreshed_call(inner, &room, &call.id).await?;
            return Ok(());
        }
        let id = call.id.clone();
        with_conn(&inner.pool, move |conn| {
            calls::set_dnd_status(conn, &id, outcome.as_str())
        })
        .await?;
    }

    let phone = call.contact.phone.clone();
    let opted_out =
        with_conn(&inner.pool, move |conn| optouts::is_active_opt_out(conn, &phone, now)).await?;
    if opted_out {
        let id = call.id.clone();
        with_conn(&inner.pool, move |conn| calls::mark_opted_out(conn, &id, now)).await?;
        emit_refreshed_call(inner, &room, &call.id).await?;
        return Ok(());
    }

    // Dial. The provider pulls the script from our generator URL; nothing
    // is inlined in the request.
    let audio_url = call.audio_url.clone().unwrap_or_default();
    let request = PlaceRequest {
        to: call.contact.phone.clone(),
        script_url: build_script_url(
            &inner.settings.public_base_url,
            &audio_url,
            &broadcast.config.compliance.disclaimer_text,
        )?,
        status_callback_url: build_status_callback_url(
            &inner.settings.public_base_url,
            &call.id,
        )?,
    };

    match inner.provider.place(&request).await {
        Ok(placed) => {
            let id = call.id.clone();
            let sid = placed.provider_sid.clone();
            with_conn(&inner.pool, move |conn| {
                calls::mark_calling(conn, &id, &sid, now_ms())
            })
            .await?;
            emit_refreshed_call(inner, &room, &call.id).await?;
        }
        Err(e) => {
            let (code, message) = match &e {
                TelephonyError::Rejected { code, message } => {
                    (Some(code.clone()), message.clone())
                }
                other => (None, other.to_string()),
            };
            tracing::warn!(
                call_id = %call.id,
                phone = %call.contact.phone,
                code = code.as_deref().unwrap_or("-"),
                error = %message,
                "dial failed"
            );

            let id = call.id.clone();
            let policy = RetryPolicy {
                max_retries: broadcast.config.max_retries,
                retry_delay_ms: broadcast.config.retry_delay_ms,
            };
            with_conn(&inner.pool, move |conn| {
                calls::mark_dial_failed(
                    conn,
                    &id,
                    code.as_deref(),
                    Some(&message),
                    policy,
                    now_ms(),
                )
            })
            .await?;
            // Reflect the resolved state: back to queued, or terminal failed.
            emit_refreshed_call(inner, &room, &call.id).await?;
        }
    }

    Ok(())
}

/// Emits a `call_update` from the row as the gateway resolved it.
async fn emit_refreshed_call(
    inner: &Arc<Inner>,
    room: &str,
    call_id: &str,
) -> Result<(), EngineError> {
    let id = call_id.to_string();
    let call = with_conn(&inner.pool, move |conn| calls::get_call(conn, &id)).await?;
    inner.publisher.publish(
        room,
        BroadcastEvent::CallUpdate(CallUpdate {
            broadcast_id: call.broadcast_id.clone(),
            call_id: call.id.clone(),
            call_sid: call.provider_sid.clone(),
            phone: call.contact.phone.clone(),
            status: call.status,
            duration: call.duration_secs,
            timestamp: now_ms(),
        }),
    );
    Ok(())
}

/// Emits a `broadcast_update` with freshly recomputed stats.
async fn emit_broadcast_update(inner: &Arc<Inner>, broadcast_id: &str) -> Result<(), EngineError> {
    let id = broadcast_id.to_string();
    let (broadcast, stats, active) = with_conn(&inner.pool, move |conn| {
        let broadcast = broadcasts::get_broadcast(conn, &id)?;
        let stats = broadcasts::compute_stats(conn, &id)?;
        let active = calls::count_active(conn, &id)?;
        Ok((broadcast, stats, active))
    })
    .await?;

    inner.publisher.publish(
        &broadcast_room(broadcast_id),
        BroadcastEvent::BroadcastUpdate(BroadcastUpdate {
            broadcast_id: broadcast.id,
            status: broadcast.status,
            stats,
            active_calls: Some(active),
            timestamp: now_ms(),
        }),
    );
    Ok(())
}

fn build_script_url(base: &str, audio_url: &str, disclaimer: &str) -> Result<String, EngineError> {
    let mut url = Url::parse(base)
        .map_err(|e| EngineError::Config(format!("invalid public base url '{base}': {e}")))?;
    url.set_path("/broadcast/twiml");
    url.query_pairs_mut()
        .append_pair("audioUrl", audio_url)
        .append_pair("disclaimer", disclaimer);
    Ok(url.into())
}

fn build_status_callback_url(base: &str, call_id: &str) -> Result<String, EngineError> {
    let mut url = Url::parse(base)
        .map_err(|e| EngineError::Config(format!("invalid public base url '{base}': {e}")))?;
    url.set_path(&format!("/broadcast/{call_id}/status"));
    Ok(url.into())
}
