//! Mock upstream for deterministic testing.
//!
//! Returns queued outcomes without making any HTTP calls. When a queue is
//! empty, `refine` echoes the submitted actions and `verify` approves every
//! submitted action.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::provider::*;
use warden_core::{Result, WardenError};

/// A failure the mock can be told to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFault {
    /// Connection-level error.
    Transport,
    /// HTTP 5xx.
    ServerError(u16),
    /// HTTP 429.
    RateLimited,
    /// Non-retryable HTTP 4xx.
    Rejected(u16),
    /// Body that could not be decoded.
    Malformed,
    /// Never answers; only a caller-side timeout ends the call.
    Hang,
}

impl MockFault {
    fn to_error(&self) -> WardenError {
        match self {
            Self::Transport => WardenError::Upstream("connection refused".into()),
            Self::ServerError(code) => WardenError::Upstream(format!("HTTP {code}: mock failure")),
            Self::RateLimited => WardenError::UpstreamRateLimited { retry_after_secs: 1 },
            Self::Rejected(code) => WardenError::UpstreamRejected {
                status: *code,
                body: "mock rejection".into(),
            },
            Self::Malformed => WardenError::MalformedUpstream("mock: undecodable body".into()),
            Self::Hang => WardenError::Upstream("mock: hang".into()),
        }
    }
}

/// How the mock answers one `verify` call.
#[derive(Debug, Clone)]
pub enum MockVerdict {
    /// Return this report as-is (it may be deliberately malformed).
    Report(VerificationReport),
    /// Reject and downgrade the listed ids, approve every other submitted id.
    Decide {
        rejected: Vec<String>,
        downgraded: Vec<String>,
        concerns: Vec<String>,
    },
    Fail(MockFault),
}

#[derive(Debug, Clone)]
enum MockRefine {
    Refinement(PlanRefinement),
    Fail(MockFault),
}

/// A mock upstream that returns pre-configured outcomes.
///
/// # Example
/// ```
/// use warden_upstream::mock::{MockFault, MockUpstream};
/// let upstream = MockUpstream::new("test")
///     .with_refine_fault(MockFault::ServerError(503))
///     .with_rejection(&["send-1"]);
/// ```
pub struct MockUpstream {
    name: String,
    refine_queue: Mutex<VecDeque<MockRefine>>,
    verify_queue: Mutex<VecDeque<MockVerdict>>,
    sticky_refine_fault: Mutex<Option<MockFault>>,
    sticky_verify_fault: Mutex<Option<MockFault>>,
    delay: Option<Duration>,
    refine_calls: AtomicU32,
    verify_calls: AtomicU32,
    /// Every refine request received (for assertions in tests).
    pub refine_requests: Arc<Mutex<Vec<PlanningRequest>>>,
    /// Every verify request received.
    pub verify_requests: Arc<Mutex<Vec<VerificationRequest>>>,
}

impl MockUpstream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            refine_queue: Mutex::new(VecDeque::new()),
            verify_queue: Mutex::new(VecDeque::new()),
            sticky_refine_fault: Mutex::new(None),
            sticky_verify_fault: Mutex::new(None),
            delay: None,
            refine_calls: AtomicU32::new(0),
            verify_calls: AtomicU32::new(0),
            refine_requests: Arc::new(Mutex::new(vec![])),
            verify_requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Sleep this long before answering any call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a refinement.
    pub fn with_refinement(self, refinement: PlanRefinement) -> Self {
        self.refine_queue.lock().push_back(MockRefine::Refinement(refinement));
        self
    }

    /// Queue a single refine failure.
    pub fn with_refine_fault(self, fault: MockFault) -> Self {
        self.refine_queue.lock().push_back(MockRefine::Fail(fault));
        self
    }

    /// Queue a verify outcome.
    pub fn with_verdict(self, verdict: MockVerdict) -> Self {
        self.verify_queue.lock().push_back(verdict);
        self
    }

    /// Queue a verify answer that rejects `ids` and approves the rest.
    pub fn with_rejection(self, ids: &[&str]) -> Self {
        self.with_verdict(MockVerdict::Decide {
            rejected: ids.iter().map(|s| s.to_string()).collect(),
            downgraded: vec![],
            concerns: vec!["mock: rejected on review".into()],
        })
    }

    /// Queue a verify answer that downgrades `ids` and approves the rest.
    pub fn with_downgrade(self, ids: &[&str]) -> Self {
        self.with_verdict(MockVerdict::Decide {
            rejected: vec![],
            downgraded: ids.iter().map(|s| s.to_string()).collect(),
            concerns: vec!["mock: needs human review".into()],
        })
    }

    /// Make every refine call fail until cleared with `None`.
    pub fn set_refine_fault(&self, fault: Option<MockFault>) {
        *self.sticky_refine_fault.lock() = fault;
    }

    /// Make every verify call fail until cleared with `None`.
    pub fn set_verify_fault(&self, fault: Option<MockFault>) {
        *self.sticky_verify_fault.lock() = fault;
    }

    pub fn refine_calls(&self) -> u32 {
        self.refine_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> u32 {
        self.verify_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn fail<T>(&self, fault: MockFault) -> Result<T> {
        if fault == MockFault::Hang {
            std::future::pending::<()>().await;
        }
        Err(fault.to_error())
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    fn name(&self) -> &str {
        &self.name
    }

    async fn refine(&self, request: &PlanningRequest) -> Result<PlanRefinement> {
        self.refine_calls.fetch_add(1, Ordering::SeqCst);
        self.refine_requests.lock().push(request.clone());
        self.pause().await;

        let sticky = self.sticky_refine_fault.lock().clone();
        if let Some(fault) = sticky {
            return self.fail(fault).await;
        }
        let next = self.refine_queue.lock().pop_front();
        match next {
            Some(MockRefine::Refinement(r)) => Ok(r),
            Some(MockRefine::Fail(fault)) => self.fail(fault).await,
            None => Ok(PlanRefinement {
                rationale: "mock: passthrough".into(),
                ..PlanRefinement::passthrough(request)
            }),
        }
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationReport> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verify_requests.lock().push(request.clone());
        self.pause().await;

        let sticky = self.sticky_verify_fault.lock().clone();
        if let Some(fault) = sticky {
            return self.fail(fault).await;
        }
        let next = self.verify_queue.lock().pop_front();
        let (rejected, downgraded, concerns) = match next {
            Some(MockVerdict::Report(report)) => return Ok(report),
            Some(MockVerdict::Fail(fault)) => return self.fail(fault).await,
            Some(MockVerdict::Decide {
                rejected,
                downgraded,
                concerns,
            }) => (rejected, downgraded, concerns),
            None => (vec![], vec![], vec![]),
        };

        let submitted = request.action_ids();
        let keep = |list: Vec<String>| -> Vec<String> {
            list.into_iter().filter(|id| submitted.contains(id)).collect()
        };
        let rejected = keep(rejected);
        let downgraded: Vec<String> = keep(downgraded)
            .into_iter()
            .filter(|id| !rejected.contains(id))
            .collect();
        let approved = submitted
            .iter()
            .filter(|id| !rejected.contains(id) && !downgraded.contains(id))
            .cloned()
            .collect();

        Ok(VerificationReport {
            model: request.model.clone(),
            approved,
            rejected,
            downgraded,
            concerns,
        })
    }

    async fn health_check(&self) -> Result<()> {
        match self.sticky_refine_fault.lock().clone() {
            Some(fault) => Err(fault.to_error()),
            None => Ok(()),
        }
    }
}
