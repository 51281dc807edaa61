//! Fixed-window rate limiting for outbound provider calls.
//!
//! [`RateLimitedFetcher`] serialises access to the provider's call quota: at
//! most `max_calls` HTTP calls are issued within any one window. The window
//! counter, the FIFO of requests waiting for admission, and the in-flight
//! fan-out calls waiting for a fresh unit all live in one mutex-guarded
//! state value, mutated only by [`RateLimitedFetcher::fetch_product_data`]
//! and [`RateLimitedFetcher::tick`]. The production window timer is a plain
//! interval task calling `tick()`; tests call `tick()` directly and need no
//! real timers.
//!
//! A request fans out into one provider call per day covered by its fetch
//! period (30 / 7 / 1). Every constituent call consumes one quota unit, so a
//! full daily fan-out can drain an entire window by itself. When the quota
//! runs out mid-fan-out the request parks until the next window reset, and
//! parked fan-outs resume ahead of queued admissions — an admitted request
//! finishes before new ones start.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use slotsync_core::{FetchPeriod, SlotPayload};
use tokio::sync::{oneshot, Mutex};

use crate::client::ProviderClient;
use crate::error::FetchError;

/// Destination for successfully fetched inventory payloads.
///
/// The fetcher forwards each day's slot array here before counting the call
/// as complete; a sink error fails the enclosing request.
pub trait InventorySink: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist one fetched day's slot payload for a product.
    fn save_inventory(
        &self,
        product_id: i64,
        date: NaiveDate,
        slots: &[SlotPayload],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<T: InventorySink> InventorySink for Arc<T> {
    type Error = T::Error;

    fn save_inventory(
        &self,
        product_id: i64,
        date: NaiveDate,
        slots: &[SlotPayload],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        (**self).save_inventory(product_id, date, slots)
    }
}

/// Summary of one completed fetch request.
#[derive(Debug, Clone, Copy)]
pub struct FetchReport {
    pub product_id: i64,
    pub period: FetchPeriod,
    pub days_fetched: u32,
    pub slots_synced: usize,
}

struct Admission {
    product_id: i64,
    period: FetchPeriod,
    responder: oneshot::Sender<Result<FetchReport, FetchError>>,
}

struct LimiterState {
    issued_in_window: u32,
    /// In-flight fan-outs parked for the next window, in arrival order.
    unit_waiters: VecDeque<oneshot::Sender<()>>,
    /// Requests not yet admitted, in arrival order.
    pending: VecDeque<Admission>,
}

struct Inner<S> {
    client: ProviderClient,
    sink: S,
    max_calls: u32,
    state: Mutex<LimiterState>,
}

/// Rate-limited front door to the provider. Cheap to clone; all clones share
/// one quota window.
pub struct RateLimitedFetcher<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for RateLimitedFetcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: InventorySink> RateLimitedFetcher<S> {
    #[must_use]
    pub fn new(client: ProviderClient, sink: S, max_calls: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                sink,
                max_calls,
                state: Mutex::new(LimiterState {
                    issued_in_window: 0,
                    unit_waiters: VecDeque::new(),
                    pending: VecDeque::new(),
                }),
            }),
        }
    }

    /// Spawns the recurring window-reset task. The returned handle keeps
    /// running until the process shuts down.
    pub fn spawn_window_timer(&self, window: Duration) -> tokio::task::JoinHandle<()> {
        let fetcher = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(window);
            // The first tick completes immediately; skip it so the initial
            // window is not cut short.
            interval.tick().await;
            loop {
                interval.tick().await;
                fetcher.tick().await;
            }
        })
    }

    /// Submits a fetch request and waits for it to complete.
    ///
    /// The request is admitted immediately if the current window has quota
    /// left, otherwise it joins the FIFO and starts at a later window reset.
    /// The returned future resolves once every constituent daily call has
    /// been issued, synced, and acknowledged.
    ///
    /// # Errors
    ///
    /// Returns the first constituent call's [`FetchError`]; the remaining
    /// fan-out is aborted.
    pub async fn fetch_product_data(
        &self,
        product_id: i64,
        period: FetchPeriod,
    ) -> Result<FetchReport, FetchError> {
        let (responder, done) = oneshot::channel();
        let admitted = {
            let mut state = self.inner.state.lock().await;
            if state.issued_in_window < self.inner.max_calls {
                state.issued_in_window += 1;
                Some(Admission {
                    product_id,
                    period,
                    responder,
                })
            } else {
                tracing::debug!(
                    product_id,
                    %period,
                    queued = state.pending.len() + 1,
                    "call quota exhausted; queueing request"
                );
                state.pending.push_back(Admission {
                    product_id,
                    period,
                    responder,
                });
                None
            }
        };

        if let Some(admission) = admitted {
            self.spawn_request(admission);
        }

        match done.await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Shutdown),
        }
    }

    /// Resets the window counter and drains as much parked work as the fresh
    /// quota allows: parked fan-outs first, queued admissions after.
    pub async fn tick(&self) {
        let admissions = {
            let mut state = self.inner.state.lock().await;
            state.issued_in_window = 0;

            while state.issued_in_window < self.inner.max_calls {
                let Some(waiter) = state.unit_waiters.pop_front() else {
                    break;
                };
                // A closed waiter belongs to a dead task; its unit stays free.
                if waiter.send(()).is_ok() {
                    state.issued_in_window += 1;
                }
            }

            let mut admitted = Vec::new();
            while state.issued_in_window < self.inner.max_calls {
                let Some(admission) = state.pending.pop_front() else {
                    break;
                };
                state.issued_in_window += 1;
                admitted.push(admission);
            }

            if !admitted.is_empty() || state.issued_in_window > 0 {
                tracing::debug!(
                    resumed = state.issued_in_window as usize - admitted.len(),
                    admitted = admitted.len(),
                    still_pending = state.pending.len(),
                    "window reset"
                );
            }
            admitted
        };

        for admission in admissions {
            self.spawn_request(admission);
        }
    }

    fn spawn_request(&self, admission: Admission) {
        let fetcher = self.clone();
        tokio::spawn(async move {
            let Admission {
                product_id,
                period,
                responder,
            } = admission;
            let result = fetcher.run_fan_out(product_id, period).await;
            if let Err(error) = &result {
                tracing::error!(product_id, %period, %error, "fetch request failed");
            }
            // The submitter may have gone away; the outcome is already logged.
            let _ = responder.send(result);
        });
    }

    /// Runs the sequential daily fan-out for one admitted request. The first
    /// call's quota unit was consumed at admission; each further call
    /// acquires its own, parking for the next window when none remain.
    async fn run_fan_out(
        &self,
        product_id: i64,
        period: FetchPeriod,
    ) -> Result<FetchReport, FetchError> {
        let days = period.days_to_fetch();
        let today = Utc::now().date_naive();
        let mut slots_synced = 0;

        for offset in 0..days {
            if offset > 0 {
                self.acquire_unit().await?;
            }
            let date = today
                .checked_add_days(Days::new(u64::from(offset)))
                .unwrap_or(today);

            let slots = self.inner.client.fetch_inventory(product_id, date).await?;
            self.inner
                .sink
                .save_inventory(product_id, date, &slots)
                .await
                .map_err(|e| FetchError::Sync {
                    reason: e.to_string(),
                })?;
            slots_synced += slots.len();
        }

        Ok(FetchReport {
            product_id,
            period,
            days_fetched: days,
            slots_synced,
        })
    }

    async fn acquire_unit(&self) -> Result<(), FetchError> {
        let waiter = {
            let mut state = self.inner.state.lock().await;
            if state.issued_in_window < self.inner.max_calls {
                state.issued_in_window += 1;
                None
            } else {
                let (unit_tx, unit_rx) = oneshot::channel();
                state.unit_waiters.push_back(unit_tx);
                Some(unit_rx)
            }
        };

        match waiter {
            None => Ok(()),
            Some(unit_rx) => unit_rx.await.map_err(|_| FetchError::Shutdown),
        }
    }

    #[cfg(test)]
    async fn waiting_counts(&self) -> (usize, usize) {
        let state = self.inner.state.lock().await;
        (state.unit_waiters.len(), state.pending.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::convert::Infallible;
    use std::sync::Mutex as StdMutex;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingSink {
        saved: StdMutex<Vec<(i64, NaiveDate, usize)>>,
    }

    impl InventorySink for RecordingSink {
        type Error = Infallible;

        fn save_inventory(
            &self,
            product_id: i64,
            date: NaiveDate,
            slots: &[SlotPayload],
        ) -> impl Future<Output = Result<(), Self::Error>> + Send {
            let count = slots.len();
            async move {
                self.saved.lock().expect("sink lock").push((product_id, date, count));
                Ok(())
            }
        }
    }

    fn slot_body() -> serde_json::Value {
        serde_json::json!([{
            "providerSlotId": 9911,
            "startDate": "2026-03-14",
            "startTime": "09:00",
            "endTime": "11:00",
            "remaining": 12,
            "currencyCode": "SGD",
            "paxAvailability": [{
                "type": "ADULT",
                "name": "Adult",
                "remaining": 12,
                "price": {
                    "finalPrice": "35.50",
                    "currencyCode": "SGD"
                }
            }]
        }])
    }

    fn fetcher_for(
        server: &MockServer,
        sink: Arc<RecordingSink>,
        max_calls: u32,
    ) -> RateLimitedFetcher<Arc<RecordingSink>> {
        let client =
            ProviderClient::new(&server.uri(), "test-key", 10).expect("client construction");
        RateLimitedFetcher::new(client, sink, max_calls)
    }

    async fn request_count(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }

    /// Polls `condition` until it holds or a 5-second deadline passes.
    async fn wait_for<F, Fut>(condition: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if condition().await {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached within deadline");
    }

    #[tokio::test]
    async fn thirty_first_request_waits_for_the_next_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(slot_body()))
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let fetcher = fetcher_for(&server, Arc::clone(&sink), 30);

        let mut handles = Vec::new();
        for product_id in 1..=31 {
            let fetcher = fetcher.clone();
            handles.push(tokio::spawn(async move {
                fetcher
                    .fetch_product_data(product_id, FetchPeriod::FifteenMinutes)
                    .await
            }));
        }

        // Exactly 30 calls go out in the first window; one request queues.
        wait_for(|| async {
            request_count(&server).await == 30 && fetcher.waiting_counts().await == (0, 1)
        })
        .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(request_count(&server).await, 30);

        fetcher.tick().await;
        wait_for(|| async { request_count(&server).await == 31 }).await;

        for handle in handles {
            let report = handle.await.expect("join").expect("fetch result");
            assert_eq!(report.days_fetched, 1);
        }
        assert_eq!(sink.saved.lock().expect("sink lock").len(), 31);
    }

    #[tokio::test]
    async fn daily_fan_out_covers_thirty_days_in_one_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(slot_body()))
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let fetcher = fetcher_for(&server, Arc::clone(&sink), 30);

        let report = fetcher
            .fetch_product_data(14, FetchPeriod::Daily)
            .await
            .expect("daily fetch");

        assert_eq!(report.days_fetched, 30);
        assert_eq!(report.slots_synced, 30);
        assert_eq!(request_count(&server).await, 30);

        let saved = sink.saved.lock().expect("sink lock");
        assert_eq!(saved.len(), 30);
        // Sequential fan-out: today first, then consecutive days.
        let first = saved[0].1;
        let last = saved[29].1;
        assert_eq!(last - first, chrono::Duration::days(29));
    }

    #[tokio::test]
    async fn daily_fan_out_aborts_on_first_failure_keeping_prior_days() {
        let server = MockServer::start().await;
        let failing_date = Utc::now()
            .date_naive()
            .checked_add_days(Days::new(29))
            .expect("date");
        Mock::given(method("GET"))
            .and(query_param("date", failing_date.to_string()))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(slot_body()))
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let fetcher = fetcher_for(&server, Arc::clone(&sink), 30);

        let result = fetcher.fetch_product_data(14, FetchPeriod::Daily).await;
        assert!(
            matches!(result, Err(FetchError::Provider(ProviderError::Http(_)))),
            "expected provider failure, got: {result:?}"
        );
        // The 29 days synced before the failure stay persisted.
        assert_eq!(sink.saved.lock().expect("sink lock").len(), 29);
        assert_eq!(request_count(&server).await, 30);
    }

    #[tokio::test]
    async fn fan_out_parks_on_quota_exhaustion_and_resumes_on_tick() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(slot_body()))
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let fetcher = fetcher_for(&server, Arc::clone(&sink), 5);

        let worker = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.fetch_product_data(14, FetchPeriod::FourHours).await })
        };

        // Five of the seven calls fit in the first window, then the fan-out
        // parks on the limiter.
        wait_for(|| async {
            request_count(&server).await == 5 && fetcher.waiting_counts().await == (1, 0)
        })
        .await;
        assert!(!worker.is_finished());

        fetcher.tick().await;
        wait_for(|| async { request_count(&server).await == 7 }).await;

        let report = worker.await.expect("join").expect("fetch result");
        assert_eq!(report.days_fetched, 7);
    }

    #[tokio::test]
    async fn parked_fan_out_resumes_before_queued_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(slot_body()))
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let fetcher = fetcher_for(&server, Arc::clone(&sink), 1);

        let four_hours = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.fetch_product_data(14, FetchPeriod::FourHours).await })
        };
        wait_for(|| async {
            request_count(&server).await == 1 && fetcher.waiting_counts().await == (1, 0)
        })
        .await;

        let fifteen = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move {
                fetcher
                    .fetch_product_data(15, FetchPeriod::FifteenMinutes)
                    .await
            })
        };
        wait_for(|| async { fetcher.waiting_counts().await == (1, 1) }).await;

        // Six more windows finish the seven-call fan-out; the queued request
        // never steals a unit from the in-flight one.
        for expected in 2..=7 {
            fetcher.tick().await;
            wait_for(|| async {
                let done = request_count(&server).await == expected;
                let state = fetcher.waiting_counts().await;
                done && (state == (1, 1) || state == (0, 1))
            })
            .await;
        }
        let report = four_hours.await.expect("join").expect("four-hours result");
        assert_eq!(report.days_fetched, 7);
        assert!(!fifteen.is_finished());

        fetcher.tick().await;
        let report = fifteen.await.expect("join").expect("fifteen-minutes result");
        assert_eq!(report.days_fetched, 1);
        assert_eq!(request_count(&server).await, 8);
    }

    #[tokio::test]
    async fn provider_failure_rejects_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let fetcher = fetcher_for(&server, Arc::clone(&sink), 30);

        let result = fetcher
            .fetch_product_data(14, FetchPeriod::FifteenMinutes)
            .await;
        assert!(matches!(result, Err(FetchError::Provider(_))));
        assert!(sink.saved.lock().expect("sink lock").is_empty());
    }
}
