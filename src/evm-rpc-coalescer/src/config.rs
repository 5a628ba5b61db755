use std::time::Duration;

/// Switches and tuning for the call pipeline.
///
/// `batching` and `caching` are independent flags, with one asymmetry
/// inherited from the pipeline shape: the cache is wired into the batching
/// path, so with `batching` off every call goes straight to the transport and
/// the cache is never consulted.
#[derive(Debug, Clone)]
pub struct CoalesceConfig {
    /// Coalesce concurrently issued calls into one wire batch per window.
    pub batching: bool,
    /// Memoize results per call key for the lifetime of the scope.
    pub caching: bool,
    /// How long an open batch collects calls before it is sealed and sent.
    pub window: Duration,
    /// Seal and send the open batch as soon as it holds this many calls,
    /// without waiting for the window to elapse.
    pub max_batch_size: usize,
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self {
            batching: true,
            caching: true,
            window: Duration::from_millis(2),
            max_batch_size: 50,
        }
    }
}
