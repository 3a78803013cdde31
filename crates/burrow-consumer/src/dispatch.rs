//! # Message Dispatch
//!
//! Turns each broker delivery into one run of the composed stack.
//!
//! ```text
//! broker ──Delivery──→ Dispatcher ──Context──→ ComposedStack
//!                          │                        │
//!                          │                   Err(e) │
//!                          └──── report_error ←───────┘ ──→ `error` event
//! ```
//!
//! A failed run is reported and then swallowed, so one bad message never
//! reaches the broker client or any other run.

use crate::domain::compose::ComposedStack;
use crate::domain::context::{AppHandle, Context};
use crate::domain::message::Delivery;
use crate::error::ProcessingError;
use crate::metrics::RunTimer;
use crate::ports::outbound::DeliveryCallback;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Counts runs that have been handed a delivery but not yet finished.
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one run as started. The run ends when the guard drops.
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Wait until no run is in flight, or `limit` elapses.
    ///
    /// Returns `true` if the tracker drained in time.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let drained = async {
            loop {
                let mut notified = std::pin::pin!(self.idle.notified());
                notified.as_mut().enable();
                if self.count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(limit, drained).await.is_ok()
    }
}

/// Held for the duration of one run.
#[derive(Debug)]
pub struct InFlightGuard {
    tracker: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

/// Runs the composed stack for each delivery.
pub struct Dispatcher {
    stack: ComposedStack,
    app: AppHandle,
    in_flight: Arc<InFlight>,
}

impl Dispatcher {
    pub fn new(stack: ComposedStack, app: AppHandle, in_flight: Arc<InFlight>) -> Self {
        Self {
            stack,
            app,
            in_flight,
        }
    }

    /// Process one delivery end to end.
    ///
    /// Returns the reported error if the run failed.
    pub async fn dispatch(&self, delivery: Delivery) -> Option<Arc<ProcessingError>> {
        let guard = self.in_flight.enter();
        let outcome = self.run(delivery).await;
        drop(guard);
        outcome
    }

    async fn run(&self, delivery: Delivery) -> Option<Arc<ProcessingError>> {
        let timer = RunTimer::start(Arc::clone(self.app.metrics()));
        let ctx = Context::new(self.app.clone(), delivery);

        trace!(
            run_id = %ctx.id(),
            delivery_tag = ctx.message().fields.delivery_tag,
            steps = self.stack.len(),
            "Running stack"
        );

        match self.stack.run(&ctx).await {
            Ok(()) => {
                timer.finish(true);
                debug!(
                    delivery_tag = ctx.message().fields.delivery_tag,
                    "Message processed"
                );
                None
            }
            Err(error) => {
                timer.finish(false);
                Some(ctx.report_error(error).await)
            }
        }
    }

    /// Adapt into the callback handed to the broker channel.
    ///
    /// The run is counted as in flight from the moment the broker hands
    /// over the delivery, even if the returned future is polled later.
    pub fn into_callback(self: Arc<Self>) -> DeliveryCallback {
        Arc::new(move |delivery: Delivery| {
            let guard = self.in_flight.enter();
            let dispatcher = Arc::clone(&self);
            async move {
                dispatcher.run(delivery).await;
                drop(guard);
            }
            .boxed()
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }
}
