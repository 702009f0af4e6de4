use logship_core::DependencyStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Inputs from the collaborators that gate shipping.
///
/// The dependency verdict is delivered once; the send permission is a plain flag.
/// The uploader polls both, it is never woken by them.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    inner: Arc<SignalsInner>,
}

#[derive(Debug, Default)]
struct SignalsInner {
    dependency: OnceLock<DependencyStatus>,
    can_send: AtomicBool,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the dependency verdict. Returns `false` if a verdict was already delivered.
    pub fn report_dependency(&self, status: DependencyStatus) -> bool {
        let accepted = self.inner.dependency.set(status.clone()).is_ok();
        if accepted {
            info!(target = "shipper", status = ?status, "dependency status reported");
        } else {
            debug!(target = "shipper", status = ?status, "dependency status already reported, ignoring");
        }
        accepted
    }

    pub fn dependency(&self) -> Option<DependencyStatus> {
        self.inner.dependency.get().cloned()
    }

    pub fn set_can_send(&self, can_send: bool) {
        let previous = self.inner.can_send.swap(can_send, Ordering::AcqRel);
        if previous != can_send {
            info!(target = "shipper", can_send, "send permission changed");
        }
    }

    pub fn can_send(&self) -> bool {
        self.inner.can_send.load(Ordering::Acquire)
    }
}
