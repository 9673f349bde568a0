use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use std::sync::Mutex;
use thiserror::Error;

/// Source of the dimensionless thermal response g(t, H) for a borefield
/// geometry. Generating g-functions from geometry (spatial superposition) is
/// the provider's business; the engine only relies on the contract below.
///
/// Contract: values are continuous in `h` and monotone-nondecreasing in `t`.
/// Repeated calls at the same `h` are common during sizing iterations, so
/// implementations are expected to cache (see [`CachingProvider`]).
pub trait GFunctionProvider {
    /// Evaluate g at each of `time_points` (seconds, ascending) for boreholes
    /// of length `h` metres.
    fn evaluate(&self, time_points: &[f64], h: f64) -> Result<Vec<f64>, GFunctionError>;
}

#[derive(Clone, Debug, Error)]
pub enum GFunctionError {
    #[error("g-function evaluation failed: {0}")]
    Evaluation(String),
    #[error("borefield geometry is ill-posed: {0}")]
    IllPosedGeometry(String),
}

impl<P: GFunctionProvider + ?Sized> GFunctionProvider for &P {
    fn evaluate(&self, time_points: &[f64], h: f64) -> Result<Vec<f64>, GFunctionError> {
        (**self).evaluate(time_points, h)
    }
}

type CacheKey = (OrderedFloat<f64>, Vec<OrderedFloat<f64>>);

/// Memoising adaptor around a [`GFunctionProvider`]. Keeps the most recent
/// entries keyed by (H, time grid) and evicts the oldest beyond capacity.
/// Callers must [`CachingProvider::invalidate`] after mutating the underlying
/// geometry; cached entries give no lifetime guarantee across such changes.
pub struct CachingProvider<P> {
    inner: P,
    capacity: usize,
    cache: Mutex<IndexMap<CacheKey, Vec<f64>>>,
}

impl<P: GFunctionProvider> CachingProvider<P> {
    pub fn new(inner: P, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            cache: Mutex::new(IndexMap::new()),
        }
    }

    pub fn invalidate(&self) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: GFunctionProvider> GFunctionProvider for CachingProvider<P> {
    fn evaluate(&self, time_points: &[f64], h: f64) -> Result<Vec<f64>, GFunctionError> {
        let key: CacheKey = (
            OrderedFloat(h),
            time_points.iter().copied().map(OrderedFloat).collect(),
        );
        {
            let cache = self
                .cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(values) = cache.get(&key) {
                return Ok(values.clone());
            }
        }
        let values = self.inner.evaluate(time_points, h)?;
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if cache.len() >= self.capacity {
            cache.shift_remove_index(0);
        }
        cache.insert(key, values.clone());
        Ok(values)
    }
}
