use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::api::RaceSource;
use crate::clock::{Clock, SystemClock};
use crate::logging::{self, obj, v_str, Domain};
use crate::race::{CategoryFilter, CategoryGroup, CountryFilter, RaceSummary};

pub mod views;

pub const DEFAULT_FETCH_COUNT: u32 = 100;
pub const DEFAULT_REFRESH_SECS: u64 = 60;
const FALLBACK_ERROR: &str = "Failed to fetch races";

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub fetch_count: u32,
    pub refresh_every: Duration,
    pub next_to_go_limit: usize,
    pub category: CategoryFilter,
    pub country: CountryFilter,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            fetch_count: DEFAULT_FETCH_COUNT,
            refresh_every: Duration::from_secs(DEFAULT_REFRESH_SECS),
            next_to_go_limit: views::NEXT_TO_GO_LIMIT,
            category: CategoryFilter::All,
            country: CountryFilter::All,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub races: Vec<RaceSummary>,
    pub loading: bool,
    pub error: Option<String>,
    pub category: CategoryFilter,
    pub country: CountryFilter,
}

/// State plus every derived view, computed against a single "now".
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub taken_at: DateTime<Utc>,
    pub state: StoreState,
    pub active: Vec<RaceSummary>,
    pub filtered: Vec<RaceSummary>,
    pub countries: Vec<String>,
    pub next_to_go: Vec<RaceSummary>,
    pub grouped: Vec<CategoryGroup>,
}

/// Race cache with filter selection and a periodic refresh task.
///
/// Cloning is cheap and every clone shares the same state. The refresh task
/// holds only a weak reference, so dropping the last handle cancels it.
#[derive(Clone)]
pub struct RaceStore {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn RaceSource>,
    clock: Arc<dyn Clock>,
    settings: StoreSettings,
    state: Mutex<StoreState>,
    refresh: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let slot = self.refresh.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

impl RaceStore {
    pub fn new(source: Arc<dyn RaceSource>, clock: Arc<dyn Clock>, settings: StoreSettings) -> Self {
        let state = StoreState {
            category: settings.category,
            country: settings.country.clone(),
            ..StoreState::default()
        };
        Self {
            inner: Arc::new(Inner {
                source,
                clock,
                settings,
                state: Mutex::new(state),
                refresh: Mutex::new(None),
            }),
        }
    }

    pub fn with_defaults(source: Arc<dyn RaceSource>) -> Self {
        Self::new(source, Arc::new(SystemClock), StoreSettings::default())
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.inner.settings
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner.refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    pub fn races(&self) -> Vec<RaceSummary> {
        self.state().races.clone()
    }

    pub fn loading(&self) -> bool {
        self.state().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn selected_category(&self) -> CategoryFilter {
        self.state().category
    }

    pub fn selected_country(&self) -> CountryFilter {
        self.state().country.clone()
    }

    /// Replace the whole collection.
    pub fn set_races(&self, races: Vec<RaceSummary>) {
        self.state().races = races;
    }

    pub fn set_category(&self, category: CategoryFilter) {
        self.state().category = category;
        logging::debug(
            Domain::Store,
            "category_selected",
            obj(&[("category", v_str(&format!("{:?}", category)))]),
        );
    }

    pub fn set_country(&self, country: CountryFilter) {
        logging::debug(
            Domain::Store,
            "country_selected",
            obj(&[("country", v_str(&country.to_string()))]),
        );
        self.state().country = country;
    }

    // -------------------------------------------------------------------------
    // Derived views
    // -------------------------------------------------------------------------

    pub fn active_races(&self) -> Vec<RaceSummary> {
        let now = self.inner.clock.now();
        views::active_races(&self.state().races, &now)
    }

    pub fn filtered_races(&self) -> Vec<RaceSummary> {
        let active = self.active_races();
        let (category, country) = {
            let state = self.state();
            (state.category, state.country.clone())
        };
        views::filtered_races(&active, category, &country)
    }

    pub fn available_countries(&self) -> Vec<String> {
        views::available_countries(&self.active_races())
    }

    pub fn next_to_go_races(&self) -> Vec<RaceSummary> {
        views::next_to_go(&self.active_races(), self.inner.settings.next_to_go_limit)
    }

    pub fn grouped_by_category(&self) -> Vec<CategoryGroup> {
        views::group_by_category(&self.filtered_races())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let taken_at = self.inner.clock.now();
        let state = self.state().clone();
        let active = views::active_races(&state.races, &taken_at);
        let filtered = views::filtered_races(&active, state.category, &state.country);
        StoreSnapshot {
            countries: views::available_countries(&active),
            next_to_go: views::next_to_go(&active, self.inner.settings.next_to_go_limit),
            grouped: views::group_by_category(&filtered),
            taken_at,
            state,
            active,
            filtered,
        }
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// Fetch with the configured count.
    pub async fn fetch(&self) {
        self.fetch_races(self.inner.settings.fetch_count).await
    }

    /// One request; on success the collection is replaced wholesale, on
    /// failure the previous collection stays and the message is recorded.
    pub async fn fetch_races(&self, count: u32) {
        {
            let mut state = self.state();
            state.loading = true;
            state.error = None;
        }

        let result = self.inner.source.next_races(count).await;

        match result {
            Ok(resp) => {
                let races: Vec<RaceSummary> = resp.data.race_summaries.into_values().collect();
                logging::info(
                    Domain::Store,
                    "races_replaced",
                    obj(&[("count", json!(races.len())), ("requested", json!(count))]),
                );
                let mut state = self.state();
                state.races = races;
                state.loading = false;
            }
            Err(err) => {
                let mut message = err.to_string();
                if message.trim().is_empty() {
                    message = FALLBACK_ERROR.to_string();
                }
                logging::error(
                    Domain::Store,
                    "fetch_failed",
                    obj(&[("msg", v_str(&message)), ("kind", v_str(err.kind()))]),
                );
                let mut state = self.state();
                state.error = Some(message);
                state.loading = false;
            }
        }
    }

    /// Fetch now, then every `refresh_every`. Fetches run as their own tasks
    /// and may overlap; whichever resolves last wins. Calling this while a
    /// timer is running replaces that timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_auto_refresh(&self) {
        let every = self.inner.settings.refresh_every;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let store = RaceStore { inner };
                tokio::spawn(async move { store.fetch().await });
            }
        });

        let previous = self.refresh_slot().replace(handle);
        if let Some(previous) = previous {
            previous.abort();
            logging::warn(Domain::Refresh, "refresh_replaced", obj(&[]));
        }
        logging::info(
            Domain::Refresh,
            "refresh_started",
            obj(&[("every_secs", json!(every.as_secs()))]),
        );
    }

    /// Cancel the refresh timer. Returns whether one was running.
    pub fn stop_auto_refresh(&self) -> bool {
        let handle = self.refresh_slot().take();
        match handle {
            Some(handle) => {
                handle.abort();
                logging::info(Domain::Refresh, "refresh_stopped", obj(&[]));
                true
            }
            None => false,
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.refresh_slot()
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::views::tests::{mock_race, NOW};
    use super::*;
    use crate::api::ApiError;
    use crate::clock::ManualClock;
    use crate::race::{
        AdvertisedStart, ApiResponse, Category, RaceData, GREYHOUND_RACING, HORSE_RACING,
    };
    use crate::time::{race_status, RaceStatus};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    type Reply = Result<ApiResponse, ApiError>;

    #[derive(Default)]
    struct FakeSource {
        replies: Mutex<VecDeque<(Option<oneshot::Receiver<()>>, Reply)>>,
        calls: AtomicUsize,
        last_count: Mutex<Option<u32>>,
    }

    impl FakeSource {
        fn push(&self, reply: Reply) {
            self.replies.lock().unwrap().push_back((None, reply));
        }

        /// Queue a reply that is held back until the returned sender fires.
        fn push_gated(&self, reply: Reply) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.replies.lock().unwrap().push_back((Some(rx), reply));
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RaceSource for FakeSource {
        async fn next_races(&self, count: u32) -> Result<ApiResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_count.lock().unwrap() = Some(count);
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some((gate, reply)) => {
                    if let Some(gate) = gate {
                        let _ = gate.await;
                    }
                    reply
                }
                None => Ok(response(vec![])),
            }
        }
    }

    fn response(races: Vec<RaceSummary>) -> ApiResponse {
        let race_summaries: HashMap<String, RaceSummary> =
            races.into_iter().map(|r| (r.race_id.clone(), r)).collect();
        ApiResponse {
            status: 200,
            data: RaceData {
                next_to_go_ids: race_summaries.keys().cloned().collect(),
                race_summaries,
            },
            message: "success".to_string(),
        }
    }

    fn store_with(source: Arc<FakeSource>) -> (RaceStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_secs(NOW));
        let store = RaceStore::new(source, clock.clone(), StoreSettings::default());
        (store, clock)
    }

    #[test]
    fn test_filter_by_category() {
        let (store, _) = store_with(Arc::new(FakeSource::default()));
        store.set_races(vec![
            mock_race("1"),
            RaceSummary { category_id: GREYHOUND_RACING.to_string(), ..mock_race("2") },
        ]);

        store.set_category(CategoryFilter::Only(Category::Horse));
        let filtered = store.filtered_races();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].category_id, HORSE_RACING);
        assert_eq!(store.selected_category(), CategoryFilter::Only(Category::Horse));
    }

    #[test]
    fn test_filter_by_country() {
        let (store, _) = store_with(Arc::new(FakeSource::default()));
        store.set_races(vec![
            mock_race("1"),
            RaceSummary { venue_country: "NZ".to_string(), ..mock_race("2") },
        ]);

        store.set_country(CountryFilter::Only("AUS".to_string()));
        let filtered = store.filtered_races();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].venue_country, "AUS");
        assert_eq!(store.available_countries(), vec!["AUS", "NZ"]);
    }

    #[test]
    fn test_initial_filters_from_settings() {
        let settings = StoreSettings {
            country: CountryFilter::Only("AUS".to_string()),
            category: CategoryFilter::Only(Category::Harness),
            ..StoreSettings::default()
        };
        let store = RaceStore::new(
            Arc::new(FakeSource::default()),
            Arc::new(ManualClock::at_secs(NOW)),
            settings,
        );
        assert_eq!(store.selected_country(), CountryFilter::Only("AUS".to_string()));
        assert_eq!(store.selected_category(), CategoryFilter::Only(Category::Harness));
    }

    #[test]
    fn test_next_to_go_sorted() {
        let (store, _) = store_with(Arc::new(FakeSource::default()));
        let at = |secs| AdvertisedStart { seconds: NOW + secs };
        store.set_races(vec![
            RaceSummary { advertised_start: at(900), ..mock_race("3") },
            RaceSummary { advertised_start: at(300), ..mock_race("1") },
            RaceSummary { advertised_start: at(600), ..mock_race("2") },
        ]);

        let next = store.next_to_go_races();
        assert_eq!(next.len(), 3);
        assert_eq!(next[0].race_id, "1");
        assert_eq!(next[2].race_id, "3");
    }

    #[test]
    fn test_views_follow_the_clock() {
        let (store, clock) = store_with(Arc::new(FakeSource::default()));
        store.set_races(vec![mock_race("1")]);
        assert_eq!(store.active_races().len(), 1);

        // start + 61s
        clock.set_secs(NOW + 300 + 61);
        assert!(store.active_races().is_empty());
        assert!(store.grouped_by_category().is_empty());
        assert_eq!(store.races().len(), 1);
    }

    #[test]
    fn test_snapshot_consistent() {
        let (store, _) = store_with(Arc::new(FakeSource::default()));
        store.set_races(vec![
            mock_race("1"),
            RaceSummary { venue_country: "NZ".to_string(), ..mock_race("2") },
            RaceSummary { advertised_start: AdvertisedStart { seconds: NOW - 500 }, ..mock_race("old") },
        ]);
        store.set_country(CountryFilter::Only("NZ".to_string()));

        let snap = store.snapshot();
        assert_eq!(snap.state.races.len(), 3);
        assert_eq!(snap.active.len(), 2);
        assert_eq!(snap.filtered.len(), 1);
        assert_eq!(snap.countries, vec!["AUS", "NZ"]);
        assert_eq!(snap.next_to_go.len(), 2);
        assert_eq!(snap.grouped.len(), 1);
        assert_eq!(snap.taken_at.timestamp(), NOW);
    }

    #[tokio::test]
    async fn test_fetch_drops_finished_races() {
        let source = Arc::new(FakeSource::default());
        source.push(Ok(response(vec![
            RaceSummary { advertised_start: AdvertisedStart { seconds: NOW - 120 }, ..mock_race("done") },
            RaceSummary { advertised_start: AdvertisedStart { seconds: NOW + 300 }, ..mock_race("next") },
        ])));
        let (store, clock) = store_with(source.clone());

        store.fetch().await;

        assert_eq!(*source.last_count.lock().unwrap(), Some(DEFAULT_FETCH_COUNT));
        assert_eq!(store.races().len(), 2);
        let active = store.active_races();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].race_id, "next");
        assert_eq!(race_status(active[0].start_secs(), &clock.now()), RaceStatus::Upcoming);
        assert!(!store.loading());
        assert_eq!(store.error(), None);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_races() {
        let source = Arc::new(FakeSource::default());
        source.push(Ok(response(vec![mock_race("1")])));
        source.push(Err(ApiError::Http(503)));
        source.push(Ok(response(vec![mock_race("2"), mock_race("3")])));
        let (store, _) = store_with(source.clone());

        store.fetch_races(10).await;
        assert_eq!(store.races().len(), 1);

        store.fetch_races(10).await;
        assert_eq!(store.error().as_deref(), Some("Failed to fetch races (503)"));
        assert_eq!(store.races().len(), 1);
        assert!(!store.loading());

        store.fetch_races(10).await;
        assert_eq!(store.error(), None);
        let mut ids: Vec<String> = store.races().into_iter().map(|r| r.race_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["2", "3"]);
    }

    async fn wait_for_calls(source: &FakeSource, n: usize) {
        while source.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_fetch_marks_loading_and_clears_error_while_pending() {
        let source = Arc::new(FakeSource::default());
        source.push(Err(ApiError::Timeout));
        let release = source.push_gated(Ok(response(vec![mock_race("1")])));
        let (store, _) = store_with(source.clone());

        store.fetch().await;
        assert_eq!(store.error().as_deref(), Some("Request timeout - please try again"));
        assert!(!store.loading());

        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.fetch().await }
        });
        wait_for_calls(&source, 2).await;
        assert!(store.loading());
        assert_eq!(store.error(), None);
        assert!(store.snapshot().state.loading);

        release.send(()).unwrap();
        pending.await.unwrap();
        assert!(!store.loading());
        assert_eq!(store.error(), None);
        assert_eq!(store.races().len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_fetches_last_resolved_wins() {
        let source = Arc::new(FakeSource::default());
        let release_slow = source.push_gated(Ok(response(vec![mock_race("slow")])));
        let release_fast = source.push_gated(Ok(response(vec![mock_race("fast")])));
        let (store, _) = store_with(source.clone());

        let slow = tokio::spawn({
            let store = store.clone();
            async move { store.fetch().await }
        });
        wait_for_calls(&source, 1).await;
        let fast = tokio::spawn({
            let store = store.clone();
            async move { store.fetch().await }
        });
        wait_for_calls(&source, 2).await;

        release_fast.send(()).unwrap();
        fast.await.unwrap();
        let ids: Vec<String> = store.races().into_iter().map(|r| r.race_id).collect();
        assert_eq!(ids, vec!["fast"]);
        // Any completion clears the flag, even with the slow fetch outstanding.
        assert!(!store.loading());

        release_slow.send(()).unwrap();
        slow.await.unwrap();
        let ids: Vec<String> = store.races().into_iter().map(|r| r.race_id).collect();
        assert_eq!(ids, vec!["slow"]);
        assert!(!store.loading());
        assert_eq!(store.error(), None);
    }

    #[tokio::test]
    async fn test_fetch_keeps_race_without_category() {
        let source = Arc::new(FakeSource::default());
        source.push(Ok(response(vec![
            RaceSummary { category_id: String::new(), ..mock_race("odd") },
            mock_race("horse"),
        ])));
        let (store, _) = store_with(source);

        store.fetch().await;
        assert_eq!(store.races().len(), 2);
        let grouped = store.grouped_by_category();
        let names: Vec<&str> = grouped.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Unknown", "Horse Racing"]);
    }

    #[tokio::test]
    async fn test_fetch_replaces_wholesale() {
        let source = Arc::new(FakeSource::default());
        source.push(Ok(response(vec![mock_race("a"), mock_race("b")])));
        source.push(Ok(response(vec![mock_race("c")])));
        let (store, _) = store_with(source);

        store.fetch().await;
        store.fetch().await;
        let ids: Vec<String> = store.races().into_iter().map(|r| r.race_id).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[tokio::test]
    async fn test_empty_error_message_falls_back() {
        let source = Arc::new(FakeSource::default());
        source.push(Err(ApiError::Transport(String::new())));
        let (store, _) = store_with(source);

        store.fetch().await;
        assert_eq!(store.error().as_deref(), Some("Failed to fetch races"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_cadence() {
        let source = Arc::new(FakeSource::default());
        let (store, _) = store_with(source.clone());

        store.start_auto_refresh();
        assert!(store.is_auto_refreshing());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 2);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.calls(), 4);

        assert!(store.stop_auto_refresh());
        assert!(!store.is_auto_refreshing());
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_timer() {
        let source = Arc::new(FakeSource::default());
        let (store, _) = store_with(source.clone());

        store.start_auto_refresh();
        store.start_auto_refresh();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 2);
        store.stop_auto_refresh();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_store_ends_refresh() {
        let source = Arc::new(FakeSource::default());
        let (store, _) = store_with(source.clone());

        store.start_auto_refresh();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls(), 1);

        drop(store);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_stop_without_timer_is_noop() {
        let (store, _) = store_with(Arc::new(FakeSource::default()));
        assert!(!store.stop_auto_refresh());
        assert!(!store.stop_auto_refresh());
    }
}
