use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::event_bus::EventBus;
use crate::exchange::ExchangeProvider;
use crate::generator::SignalGenerator;
use crate::oracle::{vwap, PriceOracle};
use crate::position_store::{PositionKey, PositionStore};
use crate::risk_gate::{RiskDecision, RiskGate};
use crate::trackers::{BreakevenTracker, PartialTracker};
use crate::types::{
    BreakevenEvent, CancelReason, Candle, CloseReason, Direction, LifecycleEvent, PartialClose,
    PartialEvent, PartialEventKind, PartialKind, PnlBreakdown, ProposalInterval, RiskRejectEvent,
    Signal, Symbol, TickResult,
};
use crate::validator::{validate_signal, ValidationContext};

/// The kernel's per-(strategy, symbol) state: at most one pending and one
/// scheduled signal, the proposal throttle clock, and the stop flag.
/// `StrategyCore` exclusively owns this.
#[derive(Default)]
struct StrategySession {
    stopped: bool,
    last_signal_proposal_at: Option<DateTime<Utc>>,
    pending: Option<Signal>,
    scheduled: Option<Signal>,
    last_ping_minute: Option<i64>,
}

/// The per-symbol state machine. Drives `tick()` through
/// `Idle → Scheduled → Pending → Closed/Cancelled`, applying validation,
/// risk admission, partial/trailing/breakeven adjustments, and publishing
/// lifecycle events.
///
/// A single `(strategy, symbol)` pair's `tick` pipeline must never run
/// concurrently with itself — enforced here simply by requiring `&mut
/// self`: the owning driver holds exclusive access to one `StrategyCore`
/// per pair, so there is nothing to lock internally.
pub struct StrategyCore {
    symbol: Symbol,
    strategy_name: String,
    exchange_name: String,
    frame_name: String,
    proposal_interval: ProposalInterval,
    backtest: bool,

    config: Arc<KernelConfig>,
    oracle: Arc<PriceOracle>,
    risk_gate: Arc<RiskGate>,
    position_store: Arc<dyn PositionStore>,
    event_bus: Arc<EventBus>,
    generator: Arc<dyn SignalGenerator>,

    session: StrategySession,
    partial_tracker: PartialTracker,
    breakeven_tracker: BreakevenTracker,
}

#[allow(clippy::too_many_arguments)]
impl StrategyCore {
    pub fn new(
        symbol: Symbol,
        strategy_name: impl Into<String>,
        exchange_name: impl Into<String>,
        frame_name: impl Into<String>,
        proposal_interval: ProposalInterval,
        backtest: bool,
        config: Arc<KernelConfig>,
        oracle: Arc<PriceOracle>,
        risk_gate: Arc<RiskGate>,
        position_store: Arc<dyn PositionStore>,
        event_bus: Arc<EventBus>,
        generator: Arc<dyn SignalGenerator>,
    ) -> Self {
        Self {
            symbol,
            strategy_name: strategy_name.into(),
            exchange_name: exchange_name.into(),
            frame_name: frame_name.into(),
            proposal_interval,
            backtest,
            config,
            oracle,
            risk_gate,
            position_store,
            event_bus,
            generator,
            session: StrategySession::default(),
            partial_tracker: PartialTracker::new(),
            breakeven_tracker: BreakevenTracker::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    fn key(&self) -> PositionKey {
        PositionKey::new(self.strategy_name.clone(), self.symbol.clone())
    }

    /// Rehydrates `pending`/`scheduled` from the position store. Called by
    /// `LiveDriver` once before its first tick.
    pub async fn rehydrate(&mut self) -> anyhow::Result<()> {
        let key = self.key();
        self.session.pending = self.position_store.read_pending(&key).await?;
        self.session.scheduled = self.position_store.read_scheduled(&key).await?;
        if let Some(pending) = &self.session.pending {
            self.risk_gate.add_signal(&pending.symbol, &self.strategy_name).await;
        }
        Ok(())
    }

    /// Stop flag: no further proposals are solicited, but any open
    /// pending/scheduled signal is still driven to natural closure.
    pub fn stop(&mut self) {
        self.session.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.session.stopped
    }

    pub fn has_open_signal(&self) -> bool {
        self.session.pending.is_some() || self.session.scheduled.is_some()
    }

    /// Cancels the scheduled signal, if any, with reason `user`. Does not
    /// stop the strategy.
    pub async fn cancel(&mut self, cancel_id: Option<String>) -> anyhow::Result<Option<TickResult>> {
        let Some(scheduled) = self.session.scheduled.take() else {
            return Ok(None);
        };
        self.position_store.write_scheduled(&self.key(), None).await?;
        let result = TickResult::Cancelled {
            signal: scheduled,
            reason: CancelReason::User,
            cancel_id,
        };
        Ok(Some(self.emit(Utc::now(), Decimal::ZERO, result).await))
    }

    /// One pass of the tick algorithm.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> anyhow::Result<TickResult> {
        // 1. Stopped with nothing open: permanently idle.
        if self.session.stopped && !self.has_open_signal() {
            return Ok(self.emit(now, Decimal::ZERO, TickResult::Idle).await);
        }

        // 2. Scheduled signal handling.
        if let Some(scheduled) = self.session.scheduled.clone() {
            let elapsed_minutes = (now - scheduled.scheduled_at).num_minutes();
            if elapsed_minutes >= self.config.schedule_await_minutes {
                self.session.scheduled = None;
                self.position_store.write_scheduled(&self.key(), None).await?;
                let result = TickResult::Cancelled {
                    signal: scheduled,
                    reason: CancelReason::Timeout,
                    cancel_id: None,
                };
                return Ok(self.emit(now, Decimal::ZERO, result).await);
            }

            let avg = self.oracle.average_price(&self.symbol, now).await?;

            let sl_touched = match scheduled.direction {
                Direction::Long => avg <= scheduled.price_stop_loss,
                Direction::Short => avg >= scheduled.price_stop_loss,
            };
            if sl_touched {
                self.session.scheduled = None;
                self.position_store.write_scheduled(&self.key(), None).await?;
                let result = TickResult::Cancelled {
                    signal: scheduled,
                    reason: CancelReason::PriceReject,
                    cancel_id: None,
                };
                return Ok(self.emit(now, avg, result).await);
            }

            let activated = match scheduled.direction {
                Direction::Long => avg >= scheduled.price_open,
                Direction::Short => avg <= scheduled.price_open,
            };
            if activated {
                let mut signal = scheduled;
                signal.pending_at = now;
                self.session.scheduled = None;
                self.session.pending = Some(signal.clone());
                self.risk_gate.add_signal(&self.symbol, &self.strategy_name).await;
                self.position_store.write_scheduled(&self.key(), None).await?;
                self.position_store.write_pending(&self.key(), Some(&signal)).await?;
                let result = TickResult::Opened { signal };
                return Ok(self.emit(now, avg, result).await);
            }

            // Still waiting: nothing to report this tick.
            return Ok(self.emit(now, avg, TickResult::Idle).await);
        }

        // 3. Pending signal handling.
        if let Some(pending) = self.session.pending.clone() {
            let avg = self.oracle.average_price(&self.symbol, now).await?;

            let mut close_reason = None;
            let elapsed_ms = (now - pending.pending_at).num_milliseconds();
            if elapsed_ms >= pending.minute_estimated_time * 60_000 {
                close_reason = Some(CloseReason::TimeExpired);
            }
            if close_reason.is_none() {
                let tp_hit = match pending.direction {
                    Direction::Long => avg >= pending.effective_take_profit(),
                    Direction::Short => avg <= pending.effective_take_profit(),
                };
                if tp_hit {
                    close_reason = Some(CloseReason::TakeProfit);
                }
            }
            if close_reason.is_none() {
                let sl_hit = match pending.direction {
                    Direction::Long => avg <= pending.effective_stop_loss(),
                    Direction::Short => avg >= pending.effective_stop_loss(),
                };
                if sl_hit {
                    close_reason = Some(CloseReason::StopLoss);
                }
            }

            if let Some(reason) = close_reason {
                let result = self.close_pending(pending, reason, avg, now).await?;
                return Ok(self.emit(now, avg, result).await);
            }

            self.maybe_publish_ping(&pending.id, now).await;

            // Not closing: run breakeven then partial detection, both
            // evaluated every tick, breakeven first.
            if let Some(event) = self.check_breakeven(&pending.id, pending.direction, pending.price_open, avg) {
                self.event_bus.publish_breakeven(event).await;
                if let Some(p) = &mut self.session.pending {
                    p.trailing_stop_loss = Some(p.price_open);
                }
                self.position_store
                    .write_pending(&self.key(), self.session.pending.as_ref())
                    .await?;
            }

            for (kind, band) in self.partial_tracker.check(&pending.id, pending.direction, pending.price_open, avg) {
                let event = PartialEvent {
                    symbol: self.symbol.clone(),
                    strategy_name: self.strategy_name.clone(),
                    signal_id: pending.id.clone(),
                    kind: match kind {
                        PartialKind::Profit => PartialEventKind::Profit,
                        PartialKind::Loss => PartialEventKind::Loss,
                    },
                    band_percent: band,
                    price: avg,
                };
                self.event_bus.publish_partial(event).await;
            }

            let current = self.session.pending.clone().unwrap_or(pending);
            let (percent_tp, percent_sl) = progress_percentages(&current, avg);
            let result = TickResult::Active {
                signal: current,
                percent_tp,
                percent_sl,
            };
            return Ok(self.emit(now, avg, result).await);
        }

        // 4. No signal: solicit a proposal, throttled by cadence.
        if let Some(last) = self.session.last_signal_proposal_at {
            if now - last < self.proposal_interval.duration() {
                return Ok(self.emit(now, Decimal::ZERO, TickResult::Idle).await);
            }
        }

        let generation = tokio::time::timeout(
            std::time::Duration::from_secs(self.config.max_signal_generation_seconds),
            self.generator.generate(&self.symbol, now),
        )
        .await;

        let proposal = match generation {
            Ok(Ok(Some(proposal))) => proposal,
            Ok(Ok(None)) => {
                self.session.last_signal_proposal_at = Some(now);
                return Ok(self.emit(now, Decimal::ZERO, TickResult::Idle).await);
            }
            Ok(Err(e)) => {
                self.session.last_signal_proposal_at = Some(now);
                self.publish_error(format!("signal generator failed: {e}")).await;
                return Ok(self.emit(now, Decimal::ZERO, TickResult::Idle).await);
            }
            Err(_) => {
                self.session.last_signal_proposal_at = Some(now);
                self.publish_error(format!(
                    "signal generator exceeded {}s timeout",
                    self.config.max_signal_generation_seconds
                ))
                .await;
                return Ok(self.emit(now, Decimal::ZERO, TickResult::Idle).await);
            }
        };

        let immediate_price = self.oracle.average_price(&self.symbol, now).await.unwrap_or(Decimal::ZERO);
        let candidate = Signal::from_proposal(
            &proposal,
            self.symbol.clone(),
            self.strategy_name.clone(),
            self.exchange_name.clone(),
            self.frame_name.clone(),
            now,
            immediate_price,
        );

        let ctx = ValidationContext { config: &self.config, now };
        if let Err(message) = validate_signal(&candidate, &ctx) {
            self.session.last_signal_proposal_at = Some(now);
            self.publish_error(message).await;
            return Ok(self.emit(now, immediate_price, TickResult::Idle).await);
        }

        let decision = self.risk_gate.check_signal(&candidate).await;
        if let RiskDecision::Rejected { note, .. } = decision {
            self.session.last_signal_proposal_at = Some(now);
            let count = self.risk_gate.active_position_count().await;
            self.event_bus
                .publish_risk_reject(RiskRejectEvent {
                    symbol: self.symbol.clone(),
                    strategy_name: self.strategy_name.clone(),
                    active_position_count: count,
                    note,
                })
                .await;
            return Ok(self.emit(now, immediate_price, TickResult::Idle).await);
        }

        self.session.last_signal_proposal_at = Some(now);

        if candidate.price_open_requested.is_some() {
            self.session.scheduled = Some(candidate.clone());
            self.position_store.write_scheduled(&self.key(), Some(&candidate)).await?;
            let result = TickResult::Scheduled { signal: candidate };
            Ok(self.emit(now, immediate_price, result).await)
        } else {
            self.session.pending = Some(candidate.clone());
            self.risk_gate.add_signal(&self.symbol, &self.strategy_name).await;
            self.position_store.write_pending(&self.key(), Some(&candidate)).await?;
            let result = TickResult::Opened { signal: candidate };
            Ok(self.emit(now, immediate_price, result).await)
        }
    }

    async fn close_pending(
        &mut self,
        mut signal: Signal,
        reason: CloseReason,
        close_price: Decimal,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TickResult> {
        let pnl = self.compute_pnl(&signal, close_price);

        self.partial_tracker.clear(&signal.id);
        self.breakeven_tracker.clear(&signal.id);
        self.session.last_ping_minute = None;
        self.risk_gate.remove_signal(&self.symbol, &self.strategy_name).await;
        self.position_store.clear(&self.key()).await?;
        self.session.pending = None;

        info!(
            symbol = %self.symbol,
            strategy = %self.strategy_name,
            signal_id = %signal.id,
            reason = ?reason,
            pnl = %pnl.pnl_percentage,
            "signal closed"
        );

        Ok(TickResult::Closed {
            signal,
            close_reason: reason,
            close_timestamp: now,
            pnl,
        })
    }

    /// PnL accounting: position-weighted sum over executed partials plus
    /// the remaining portion closed at `close_price`.
    fn compute_pnl(&self, signal: &Signal, close_price: Decimal) -> PnlBreakdown {
        let mut remaining = Decimal::from(100);
        let mut weighted = Decimal::ZERO;
        for partial in &signal.partial_closes {
            let leg = leg_pnl_percent(
                signal.direction,
                signal.price_open,
                self.config.slippage_percent,
                self.config.fee_percent,
                partial.price,
            );
            weighted += leg * (partial.percent / Decimal::from(100));
            remaining -= partial.percent;
        }
        let final_leg = leg_pnl_percent(
            signal.direction,
            signal.price_open,
            self.config.slippage_percent,
            self.config.fee_percent,
            close_price,
        );
        weighted += final_leg * (remaining / Decimal::from(100));

        let (effective_entry, effective_exit) = effective_entry_exit(
            signal.direction,
            signal.price_open,
            self.config.slippage_percent,
            close_price,
        );

        PnlBreakdown {
            pnl_percentage: weighted,
            effective_entry,
            effective_exit,
        }
    }

    fn check_breakeven(
        &mut self,
        signal_id: &str,
        direction: Direction,
        entry: Decimal,
        current_price: Decimal,
    ) -> Option<BreakevenEvent> {
        let threshold = self.config.breakeven_threshold();
        if self
            .breakeven_tracker
            .try_arm(signal_id, direction, entry, current_price, threshold)
        {
            Some(BreakevenEvent {
                symbol: self.symbol.clone(),
                strategy_name: self.strategy_name.clone(),
                signal_id: signal_id.to_string(),
                price: current_price,
            })
        } else {
            None
        }
    }

    /// Force-runs the breakeven arm, returning whether it armed.
    pub async fn breakeven(&mut self, current_price: Decimal) -> anyhow::Result<bool> {
        let Some(pending) = self.session.pending.clone() else {
            return Ok(false);
        };
        if let Some(event) = self.check_breakeven(&pending.id, pending.direction, pending.price_open, current_price) {
            self.event_bus.publish_breakeven(event).await;
            if let Some(p) = &mut self.session.pending {
                p.trailing_stop_loss = Some(p.price_open);
            }
            self.position_store
                .write_pending(&self.key(), self.session.pending.as_ref())
                .await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Records a user-initiated partial profit close. Cumulative percent
    /// is capped at 100.
    pub async fn partial_profit(&mut self, percent: Decimal, current_price: Decimal, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.record_partial(PartialKind::Profit, percent, current_price, now).await
    }

    pub async fn partial_loss(&mut self, percent: Decimal, current_price: Decimal, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.record_partial(PartialKind::Loss, percent, current_price, now).await
    }

    async fn record_partial(
        &mut self,
        kind: PartialKind,
        percent: Decimal,
        current_price: Decimal,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let Some(pending) = &mut self.session.pending else {
            return Err(KernelError::LogicInvariant("no pending signal to partially close".into()).into());
        };
        let remaining = Decimal::from(100) - pending.cumulative_partial_percent();
        let actual = percent.min(remaining).max(Decimal::ZERO);
        if actual.is_zero() {
            return Ok(());
        }
        pending.partial_closes.push(PartialClose {
            kind,
            percent: actual,
            price: current_price,
            at: now,
        });
        self.position_store.write_pending(&self.key(), self.session.pending.as_ref()).await?;
        Ok(())
    }

    /// Adjusts the trailing stop-loss distance. Monotonic in the favorable
    /// direction; refuses to cross entry.
    pub async fn trailing_stop(&mut self, percent_shift: Decimal, current_price: Decimal) -> anyhow::Result<()> {
        let Some(pending) = &mut self.session.pending else {
            return Err(KernelError::LogicInvariant("no pending signal to trail".into()).into());
        };
        let direction = pending.direction;
        let candidate = match direction {
            Direction::Long => current_price * (Decimal::ONE - percent_shift),
            Direction::Short => current_price * (Decimal::ONE + percent_shift),
        };
        let crosses_entry = match direction {
            Direction::Long => candidate >= pending.price_open,
            Direction::Short => candidate <= pending.price_open,
        };
        if crosses_entry {
            return Err(KernelError::LogicInvariant("trailing stop would cross entry price".into()).into());
        }
        let baseline = pending.trailing_stop_loss.unwrap_or(pending.price_stop_loss);
        let favorable = match direction {
            Direction::Long => candidate > baseline,
            Direction::Short => candidate < baseline,
        };
        if !favorable {
            return Ok(());
        }
        pending.trailing_stop_loss = Some(candidate);
        self.position_store.write_pending(&self.key(), self.session.pending.as_ref()).await?;
        Ok(())
    }

    /// Adjusts the trailing take-profit level. Refuses a level the current
    /// price has already crossed, and never loosens back toward entry once
    /// moved.
    pub async fn trailing_take(&mut self, percent_shift: Decimal, current_price: Decimal) -> anyhow::Result<()> {
        let Some(pending) = &mut self.session.pending else {
            return Err(KernelError::LogicInvariant("no pending signal to trail".into()).into());
        };
        let direction = pending.direction;
        let candidate = match direction {
            Direction::Long => current_price * (Decimal::ONE + percent_shift),
            Direction::Short => current_price * (Decimal::ONE - percent_shift),
        };
        let already_crossed = match direction {
            Direction::Long => candidate <= current_price,
            Direction::Short => candidate >= current_price,
        };
        if already_crossed {
            return Err(KernelError::LogicInvariant(
                "trailing take-profit target already crossed by current price".into(),
            )
            .into());
        }
        let baseline = pending.trailing_take_profit.unwrap_or(pending.price_take_profit);
        let favorable = match direction {
            Direction::Long => candidate > baseline,
            Direction::Short => candidate < baseline,
        };
        if !favorable {
            return Ok(());
        }
        pending.trailing_take_profit = Some(candidate);
        self.position_store.write_pending(&self.key(), self.session.pending.as_ref()).await?;
        Ok(())
    }

    /// Backtest fast-forward: replays TP/SL/time-expiry against a rolling
    /// VWAP window over a contiguous future candle slice, skipping
    /// per-candle partial/breakeven tracking.
    pub async fn simulate_backtest(&mut self, candles: &[Candle]) -> anyhow::Result<TickResult> {
        let Some(pending) = self.session.pending.clone() else {
            return Err(KernelError::LogicInvariant("simulate_backtest requires a pending signal".into()).into());
        };
        let window_size = self.config.avg_price_candle_count;
        let mut window: Vec<Candle> = Vec::with_capacity(window_size);
        let mut last_vwap = Decimal::ZERO;
        let mut last_timestamp = pending.pending_at;

        for candle in candles {
            window.push(candle.clone());
            if window.len() > window_size {
                window.remove(0);
            }
            if window.len() < window_size {
                continue;
            }
            let current_vwap = vwap(&window);
            last_vwap = current_vwap;
            last_timestamp = candle.open_time;

            let elapsed_ms = (candle.open_time - pending.pending_at).num_milliseconds();
            let mut reason = None;
            if elapsed_ms >= pending.minute_estimated_time * 60_000 {
                reason = Some(CloseReason::TimeExpired);
            }
            if reason.is_none() {
                let tp_hit = match pending.direction {
                    Direction::Long => current_vwap >= pending.effective_take_profit(),
                    Direction::Short => current_vwap <= pending.effective_take_profit(),
                };
                if tp_hit {
                    reason = Some(CloseReason::TakeProfit);
                }
            }
            if reason.is_none() {
                let sl_hit = match pending.direction {
                    Direction::Long => current_vwap <= pending.effective_stop_loss(),
                    Direction::Short => current_vwap >= pending.effective_stop_loss(),
                };
                if sl_hit {
                    reason = Some(CloseReason::StopLoss);
                }
            }

            if let Some(reason) = reason {
                return self.close_pending(pending, reason, current_vwap, candle.open_time).await;
            }
        }

        if window.len() < window_size {
            warn!(
                symbol = %self.symbol,
                "simulate_backtest: candle slice shorter than the VWAP window; closing at last available price"
            );
            last_vwap = if window.is_empty() { pending.price_open } else { vwap(&window) };
        }

        self.close_pending(pending, CloseReason::TimeExpired, last_vwap, last_timestamp).await
    }

    async fn emit(&self, now: DateTime<Utc>, current_price: Decimal, result: TickResult) -> TickResult {
        let event = LifecycleEvent {
            symbol: self.symbol.clone(),
            strategy_name: self.strategy_name.clone(),
            exchange_name: self.exchange_name.clone(),
            frame_name: self.frame_name.clone(),
            current_price,
            backtest: self.backtest,
            result: result.clone(),
        };
        let _ = now;
        self.event_bus.publish_lifecycle(self.backtest, event).await;
        result
    }

    /// Emits at most one `ping` per wall-clock minute for an active signal,
    /// so a long-lived subscriber (e.g. a heartbeat monitor) can tell the
    /// strategy is alive without subscribing to every lifecycle tick.
    async fn maybe_publish_ping(&mut self, signal_id: &str, now: DateTime<Utc>) {
        let minute = now.timestamp() / 60;
        if self.session.last_ping_minute == Some(minute) {
            return;
        }
        self.session.last_ping_minute = Some(minute);
        self.event_bus
            .publish_ping(crate::types::PingEvent {
                symbol: self.symbol.clone(),
                strategy_name: self.strategy_name.clone(),
                signal_id: signal_id.to_string(),
                at: now,
            })
            .await;
    }

    async fn publish_error(&self, message: String) {
        self.event_bus
            .publish_error(crate::types::ErrorEvent {
                symbol: self.symbol.clone(),
                strategy_name: self.strategy_name.clone(),
                message,
            })
            .await;
    }
}

/// Needed by `StrategyCore::new` callers that want to build a full
/// `PriceOracle`/`RiskGate` stack without re-deriving wiring boilerplate.
pub struct StrategyCoreBuilder {
    pub symbol: Symbol,
    pub strategy_name: String,
    pub exchange_name: String,
    pub frame_name: String,
    pub proposal_interval: ProposalInterval,
    pub backtest: bool,
    pub config: Arc<KernelConfig>,
    pub exchange: Arc<dyn ExchangeProvider>,
    pub risk_gate: Arc<RiskGate>,
    pub position_store: Arc<dyn PositionStore>,
    pub event_bus: Arc<EventBus>,
    pub generator: Arc<dyn SignalGenerator>,
}

impl StrategyCoreBuilder {
    pub fn build(self) -> StrategyCore {
        let oracle = Arc::new(PriceOracle::new(self.exchange, Arc::clone(&self.config)));
        StrategyCore::new(
            self.symbol,
            self.strategy_name,
            self.exchange_name,
            self.frame_name,
            self.proposal_interval,
            self.backtest,
            self.config,
            oracle,
            self.risk_gate,
            self.position_store,
            self.event_bus,
            self.generator,
        )
    }
}

fn effective_entry_exit(direction: Direction, price_open: Decimal, slippage: Decimal, exit_price: Decimal) -> (Decimal, Decimal) {
    match direction {
        Direction::Long => (price_open * (Decimal::ONE + slippage), exit_price * (Decimal::ONE - slippage)),
        Direction::Short => (price_open * (Decimal::ONE - slippage), exit_price * (Decimal::ONE + slippage)),
    }
}

/// PnL of one closing leg, in percentage points.
fn leg_pnl_percent(direction: Direction, price_open: Decimal, slippage: Decimal, fee: Decimal, exit_price: Decimal) -> Decimal {
    let (effective_entry, effective_exit) = effective_entry_exit(direction, price_open, slippage, exit_price);
    let gross = match direction {
        Direction::Long => (effective_exit - effective_entry) / effective_entry * Decimal::from(100),
        Direction::Short => (effective_entry - effective_exit) / effective_entry * Decimal::from(100),
    };
    gross - fee * Decimal::from(100) * Decimal::from(2)
}

/// Progress percentages for reporting only; do not affect transitions.
fn progress_percentages(signal: &Signal, current_price: Decimal) -> (Decimal, Decimal) {
    let entry = signal.price_open;
    if entry.is_zero() {
        return (Decimal::ZERO, Decimal::ZERO);
    }
    let tp = signal.effective_take_profit();
    let sl = signal.effective_stop_loss();

    let percent_tp = match signal.direction {
        Direction::Long if current_price >= entry && tp != entry => {
            ((current_price - entry) / (tp - entry) * Decimal::from(100)).clamp(Decimal::ZERO, Decimal::from(100))
        }
        Direction::Short if current_price <= entry && tp != entry => {
            ((entry - current_price) / (entry - tp) * Decimal::from(100)).clamp(Decimal::ZERO, Decimal::from(100))
        }
        _ => Decimal::ZERO,
    };

    let percent_sl = match signal.direction {
        Direction::Long if current_price <= entry && sl != entry => {
            ((entry - current_price) / (entry - sl) * Decimal::from(100)).clamp(Decimal::ZERO, Decimal::from(100))
        }
        Direction::Short if current_price >= entry && sl != entry => {
            ((current_price - entry) / (sl - entry) * Decimal::from(100)).clamp(Decimal::ZERO, Decimal::from(100))
        }
        _ => Decimal::ZERO,
    };

    (percent_tp, percent_sl)
}
