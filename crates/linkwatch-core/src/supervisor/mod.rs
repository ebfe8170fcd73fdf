//! Supervisor: the scheduler around the stability engine
//!
//! The Supervisor owns the [`LinkSelection`] and drives two independent
//! fixed-period timers on one task:
//!
//! - the **stability timer** runs [`StabilityEngine::evaluate_tick`] while
//!   `run_stability` is set
//! - the **watchdog timer** pings the watchdog unconditionally
//!
//! ## Tick Atomicity
//!
//! Every branch of the loop is awaited to completion before the next one
//! is polled, so ticks never overlap and never re-enter. Selection changes
//! sent through a [`LinkController`] queue up in a channel and are applied
//! between ticks, never in the middle of one.

mod watchdog;

pub use watchdog::WatchdogPinger;

use crate::config::LinkwatchConfig;
use crate::engine::{StabilityEngine, TickOutcome};
use crate::error::{Error, Result};
use crate::selection::{InterfaceType, LinkCommand, LinkSelection};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{IntervalStream, ReceiverStream};
use tracing::{debug, info};

/// Capacity of the link command channel
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Handle for changing the link selection from outside the supervisor
#[derive(Debug, Clone)]
pub struct LinkController {
    tx: mpsc::Sender<LinkCommand>,
}

impl LinkController {
    /// Queue a command for the next tick boundary
    pub async fn send(&self, command: LinkCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::channel_closed("supervisor is no longer running"))
    }

    /// Make `if_name` the active uplink
    pub async fn select_link(&self, if_name: impl Into<String>, if_type: InterfaceType) -> Result<()> {
        self.send(LinkCommand::Select {
            if_name: if_name.into(),
            if_type,
        })
        .await
    }

    /// Drop the active uplink
    pub async fn release_link(&self) -> Result<()> {
        self.send(LinkCommand::Release).await
    }

    /// Record whether Internet reachability has been confirmed
    pub async fn set_connected(&self, connected: bool) -> Result<()> {
        self.send(LinkCommand::SetConnected(connected)).await
    }

    /// Enable or disable stability evaluation
    pub async fn set_stability_enabled(&self, enabled: bool) -> Result<()> {
        self.send(LinkCommand::SetStabilityEnabled(enabled)).await
    }
}

/// Scheduler for the stability engine and the watchdog pinger
///
/// ## Lifecycle
///
/// 1. Create with [`Supervisor::new()`]
/// 2. Start with [`Supervisor::run()`]
/// 3. Runs until shutdown signal received; an in-flight tick always completes
/// 4. The link store is flushed before `run` returns
pub struct Supervisor {
    engine: StabilityEngine,
    pinger: WatchdogPinger,
    selection: LinkSelection,
    commands: mpsc::Receiver<LinkCommand>,
    stability_period: Duration,
    watchdog_period: Duration,
}

impl Supervisor {
    /// Create a new supervisor
    ///
    /// # Returns
    ///
    /// A tuple of (supervisor, controller) where the controller changes the
    /// link selection at tick boundaries
    pub fn new(
        engine: StabilityEngine,
        pinger: WatchdogPinger,
        selection: LinkSelection,
        config: &LinkwatchConfig,
    ) -> Result<(Self, LinkController)> {
        config.stability.validate()?;
        config.watchdog.validate()?;

        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let supervisor = Self {
            engine,
            pinger,
            selection,
            commands: rx,
            stability_period: Duration::from_secs(config.stability.interval_secs),
            watchdog_period: Duration::from_secs(config.watchdog.interval_secs),
        };

        Ok((supervisor, LinkController { tx }))
    }

    /// Override the timer periods (sub-second periods for embedding and tests)
    pub fn with_periods(mut self, stability: Duration, watchdog: Duration) -> Self {
        self.stability_period = stability;
        self.watchdog_period = watchdog;
        self
    }

    /// The current link selection
    pub fn selection(&self) -> &LinkSelection {
        &self.selection
    }

    /// Run until Ctrl-C
    ///
    /// # Returns
    ///
    /// The link selection as it stood at shutdown
    pub async fn run(self) -> Result<LinkSelection> {
        self.run_internal(None).await
    }

    /// Run until the given shutdown signal fires (or its sender is dropped)
    ///
    /// This is how an embedding daemon that manages its own signals (and
    /// the contract tests) stop the supervisor.
    pub async fn run_with_shutdown(self, shutdown_rx: oneshot::Receiver<()>) -> Result<LinkSelection> {
        self.run_internal(Some(shutdown_rx)).await
    }

    async fn run_internal(self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<LinkSelection> {
        let Self {
            engine,
            pinger,
            mut selection,
            commands,
            stability_period,
            watchdog_period,
        } = self;

        info!("Initializing stability connection check");
        let mut stability_ticks = IntervalStream::new(periodic(stability_period));

        info!("Initializing WDT connection");
        let mut watchdog_ticks = IntervalStream::new(periodic(watchdog_period));

        let mut commands = ReceiverStream::new(commands);

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                // Selection changes land between ticks
                Some(command) = commands.next() => {
                    selection.apply(command);
                }

                Some(_) = stability_ticks.next() => {
                    if selection.run_stability {
                        let outcome = engine.evaluate_tick(&mut selection).await;
                        if let TickOutcome::Evaluated(summary) = &outcome {
                            debug!("Stability tick evaluated: {:?}", summary);
                        }
                    }
                }

                Some(_) = watchdog_ticks.next() => {
                    pinger.ping().await;
                }
            }
        }

        info!("Stopping stability check");
        info!("Stopping WDT");

        engine.flush().await?;
        info!("Link store flushed, supervisor stopped");

        Ok(selection)
    }
}

/// A timer that first fires one full period after start, then every period
fn periodic(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
