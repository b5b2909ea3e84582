//! Scriptable fakes for the remote ports, shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::domain::{
    Aoi, AoiId, AuthError, BoundingBox, CatalogError, Credential, Polygon, RenderError,
    RenderRecipe, RenderedImage, ResolvedScene, SceneCandidate,
};
use crate::ports::{CatalogClient, Clock, FixedClock, RenderClient, TokenSource};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 23, 12, 0, 0).unwrap()
}

/// AOI with a unique 0.1° box derived from `slot`.
pub fn aoi(id: &str, slot: u32) -> Aoi {
    let lon = f64::from(slot);
    let bbox = BoundingBox::try_from([lon, 10.0, lon + 0.1, 10.1]).unwrap();
    Aoi::new(AoiId::parse(id).unwrap(), id.to_uppercase(), bbox.to_polygon())
}

pub fn candidate(id: &str, hours_ago: i64, cloud: Option<f64>) -> SceneCandidate {
    SceneCandidate::new(id, t0() - Duration::hours(hours_ago), cloud)
}

fn polygon_key(polygon: &Polygon) -> String {
    format!("{:?}", polygon.bbox().to_array())
}

/// Tracks how many calls are running at once.
#[derive(Default)]
pub struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Per-key response script; the last entry repeats forever.
struct Script<T> {
    responses: Mutex<HashMap<String, VecDeque<T>>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn push(&self, key: String, response: T) {
        self.responses
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(response);
    }

    fn next(&self, key: &str) -> Option<T> {
        *self.calls.lock().unwrap().entry(key.to_string()).or_default() += 1;
        let mut responses = self.responses.lock().unwrap();
        let queue = responses.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn calls(&self, key: &str) -> u32 {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn total(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

pub struct FakeCatalog {
    script: Script<Result<Vec<SceneCandidate>, CatalogError>>,
    delay: StdDuration,
    pub concurrency: Concurrency,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            script: Script::new(),
            delay: StdDuration::ZERO,
            concurrency: Concurrency::default(),
        }
    }

    pub fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = delay;
        self
    }

    pub fn returns(&self, aoi: &Aoi, candidates: Vec<SceneCandidate>) -> &Self {
        self.script.push(polygon_key(&aoi.polygon), Ok(candidates));
        self
    }

    pub fn fails(&self, aoi: &Aoi, err: CatalogError) -> &Self {
        self.script.push(polygon_key(&aoi.polygon), Err(err));
        self
    }

    pub fn calls_for(&self, aoi: &Aoi) -> u32 {
        self.script.calls(&polygon_key(&aoi.polygon))
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn search(
        &self,
        geometry: &Polygon,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<SceneCandidate>, CatalogError> {
        self.concurrency.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.concurrency.exit();
        self.script
            .next(&polygon_key(geometry))
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub struct FakeRender {
    script: Script<Result<RenderedImage, RenderError>>,
    delay: StdDuration,
    pub concurrency: Concurrency,
}

impl FakeRender {
    pub fn new() -> Self {
        Self {
            script: Script::new(),
            delay: StdDuration::ZERO,
            concurrency: Concurrency::default(),
        }
    }

    pub fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a response for renders of `scene_id`. Unscripted scenes render
    /// `png:<scene_id>`.
    pub fn respond(&self, scene_id: &str, response: Result<RenderedImage, RenderError>) -> &Self {
        self.script.push(scene_id.to_string(), response);
        self
    }

    pub fn calls_for(&self, scene_id: &str) -> u32 {
        self.script.calls(scene_id)
    }

    pub fn total_calls(&self) -> u32 {
        self.script.total()
    }
}

pub fn png(body: &str) -> RenderedImage {
    RenderedImage {
        bytes: Bytes::from(body.to_string()),
        content_type: "image/png".to_string(),
    }
}

#[async_trait]
impl RenderClient for FakeRender {
    async fn render(
        &self,
        _geometry: &Polygon,
        scene: &ResolvedScene,
        _recipe: &RenderRecipe,
    ) -> Result<RenderedImage, RenderError> {
        self.concurrency.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.concurrency.exit();
        self.script
            .next(scene.id.as_str())
            .unwrap_or_else(|| Ok(png(&format!("png:{}", scene.id))))
    }
}

pub struct FakeTokenSource {
    clock: Arc<FixedClock>,
    ttl: Duration,
    delay: StdDuration,
    calls: AtomicU32,
    fail_remaining: AtomicU32,
}

impl FakeTokenSource {
    pub fn new(clock: Arc<FixedClock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            delay: StdDuration::ZERO,
            calls: AtomicU32::new(0),
            fail_remaining: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for FakeTokenSource {
    async fn fetch(&self) -> Result<Credential, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AuthError::Rejected {
                status: 401,
                body: "invalid_client".to_string(),
            });
        }
        Ok(Credential::new(format!("token-{n}"), self.clock.now() + self.ttl))
    }
}
