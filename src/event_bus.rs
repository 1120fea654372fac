use tokio::sync::{mpsc, RwLock};

use crate::types::{
    BreakevenEvent, ErrorEvent, LifecycleEvent, PartialEvent, PartialEventKind, PingEvent,
    ProgressEvent, RiskRejectEvent, WalkerCompleteEvent,
};

/// Emitted when a driver finishes its run entirely (distinct from
/// per-signal lifecycle events), carried on the `done-*` channels.
#[derive(Debug, Clone)]
pub struct DoneEvent {
    pub reason: String,
}

const DEFAULT_CAPACITY: usize = 256;

/// One typed pub/sub channel. Backed by a bounded `mpsc` per subscriber
/// rather than a `broadcast` channel: `broadcast` drops messages for lagging
/// receivers, but publishers must block (back-pressure) when subscribers
/// lag rather than silently drop. A bounded `mpsc::Sender` per subscriber
/// gives exactly that: `send().await` suspends the publisher until the slow
/// subscriber drains, and each subscriber observes its own channel in
/// strict FIFO publish order.
pub struct Channel<T: Clone + Send + 'static> {
    subscribers: RwLock<Vec<mpsc::Sender<T>>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> Channel<T> {
    fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity,
        }
    }

    pub async fn subscribe(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.write().await.push(tx);
        rx
    }

    /// Delivers to every live subscriber in registration order, awaiting
    /// each send in turn. A subscriber that has dropped its receiver is
    /// pruned on the next publish rather than causing an error.
    pub async fn publish(&self, event: T) {
        let mut subs = self.subscribers.write().await;
        let mut dead = Vec::new();
        for (i, tx) in subs.iter().enumerate() {
            if tx.send(event.clone()).await.is_err() {
                dead.push(i);
            }
        }
        for i in dead.into_iter().rev() {
            subs.remove(i);
        }
    }
}

impl<T: Clone + Send + 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// The full channel catalog. `signal_any` is the union of
/// `signal_backtest`/`signal_live`: every lifecycle publish fans out to both
/// the mode-specific channel and this one.
#[derive(Default)]
pub struct EventBus {
    pub signal_backtest: Channel<LifecycleEvent>,
    pub signal_live: Channel<LifecycleEvent>,
    pub signal_any: Channel<LifecycleEvent>,
    pub done_backtest: Channel<DoneEvent>,
    pub done_live: Channel<DoneEvent>,
    pub done_walker: Channel<DoneEvent>,
    pub progress_optimizer: Channel<ProgressEvent>,
    pub progress_walker: Channel<ProgressEvent>,
    pub walker_complete: Channel<WalkerCompleteEvent>,
    pub breakeven: Channel<BreakevenEvent>,
    pub partial_profit: Channel<PartialEvent>,
    pub partial_loss: Channel<PartialEvent>,
    pub risk_reject: Channel<RiskRejectEvent>,
    pub error: Channel<ErrorEvent>,
    pub ping: Channel<PingEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a lifecycle event to its mode-specific channel and to the
    /// union `signal_any` channel, preserving per-subscriber publish order
    /// since both sends happen sequentially from this one call site.
    pub async fn publish_lifecycle(&self, backtest: bool, event: LifecycleEvent) {
        if backtest {
            self.signal_backtest.publish(event.clone()).await;
        } else {
            self.signal_live.publish(event.clone()).await;
        }
        self.signal_any.publish(event).await;
    }

    pub async fn publish_partial(&self, event: PartialEvent) {
        match event.kind {
            PartialEventKind::Profit => self.partial_profit.publish(event).await,
            PartialEventKind::Loss => self.partial_loss.publish(event).await,
        }
    }

    pub async fn publish_breakeven(&self, event: BreakevenEvent) {
        self.breakeven.publish(event).await;
    }

    pub async fn publish_risk_reject(&self, event: RiskRejectEvent) {
        self.risk_reject.publish(event).await;
    }

    pub async fn publish_error(&self, event: ErrorEvent) {
        self.error.publish(event).await;
    }

    pub async fn publish_ping(&self, event: PingEvent) {
        self.ping.publish(event).await;
    }

    pub async fn publish_done(&self, backtest: bool, reason: impl Into<String>) {
        let event = DoneEvent { reason: reason.into() };
        if backtest {
            self.done_backtest.publish(event).await;
        } else {
            self.done_live.publish(event).await;
        }
    }

    pub async fn publish_done_walker(&self, reason: impl Into<String>) {
        self.done_walker.publish(DoneEvent { reason: reason.into() }).await;
    }

    pub async fn publish_progress_walker(&self, event: ProgressEvent) {
        self.progress_walker.publish(event).await;
    }

    pub async fn publish_progress_optimizer(&self, event: ProgressEvent) {
        self.progress_optimizer.publish(event).await;
    }

    pub async fn publish_walker_complete(&self, event: WalkerCompleteEvent) {
        self.walker_complete.publish(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Signal, Symbol, TickResult};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn signal() -> Signal {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Signal {
            id: "sig".into(),
            direction: Direction::Long,
            price_open: dec!(100),
            price_take_profit: dec!(101),
            price_stop_loss: dec!(99),
            price_open_requested: None,
            minute_estimated_time: 60,
            scheduled_at: now,
            pending_at: now,
            symbol: Symbol::new("BTCUSDT"),
            strategy_name: "trend".into(),
            exchange_name: "demo".into(),
            frame_name: "".into(),
            note: None,
            trailing_stop_loss: None,
            trailing_take_profit: None,
            partial_closes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn lifecycle_event_fans_out_to_mode_and_union_channel() {
        let bus = EventBus::new();
        let mut backtest_rx = bus.signal_backtest.subscribe().await;
        let mut any_rx = bus.signal_any.subscribe().await;
        let mut live_rx = bus.signal_live.subscribe().await;

        let event = LifecycleEvent {
            symbol: Symbol::new("BTCUSDT"),
            strategy_name: "trend".into(),
            exchange_name: "demo".into(),
            frame_name: "frame-1".into(),
            current_price: dec!(100),
            backtest: true,
            result: TickResult::Opened { signal: signal() },
        };
        bus.publish_lifecycle(true, event).await;

        assert!(backtest_rx.recv().await.is_some());
        assert!(any_rx.recv().await.is_some());
        assert!(live_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscriber_observes_strict_publish_order() {
        let bus = EventBus::new();
        let mut rx = bus.error.subscribe().await;
        bus.publish_error(ErrorEvent { symbol: Symbol::new("BTCUSDT"), strategy_name: "trend".into(), message: "first".into() }).await;
        bus.publish_error(ErrorEvent { symbol: Symbol::new("BTCUSDT"), strategy_name: "trend".into(), message: "second".into() }).await;

        assert_eq!(rx.recv().await.unwrap().message, "first");
        assert_eq!(rx.recv().await.unwrap().message, "second");
    }
}
