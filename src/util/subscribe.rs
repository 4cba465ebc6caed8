/// Teardown handle returned by a subscription (snapshot, listener
/// registration). Calling it once detaches the subscription; the closure is
/// `FnOnce` so callers cannot accidentally invoke teardown twice expecting
/// idempotence from the underlying tier.
pub type Unsubscribe = Box<dyn FnOnce() + Send + 'static>;
