//! Post-cycle event delivery.
//!
//! Observers are notified after a cycle has finished, in order: every
//! signal, then every trade, then the cycle result itself.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::signal::{Signal, SignalAction};
use crate::strategy_loop::{StrategyCycleResult, Trade};

pub trait CycleObserver: Send + Sync {
    fn on_signal(&self, _signal: &Signal) {}
    fn on_trade(&self, _trade: &Trade) {}
    fn on_cycle(&self, _result: &StrategyCycleResult) {}
}

/// Deliver a finished cycle to every observer.
pub(crate) fn notify(observers: &[Box<dyn CycleObserver>], result: &StrategyCycleResult) {
    for observer in observers {
        for signal in &result.signals {
            observer.on_signal(signal);
        }
        for trade in &result.trades {
            observer.on_trade(trade);
        }
        observer.on_cycle(result);
    }
}

/// Logs actionable signals and trades.
#[derive(Debug, Default)]
pub struct LogObserver;

impl CycleObserver for LogObserver {
    fn on_signal(&self, signal: &Signal) {
        if signal.action == SignalAction::Hold {
            debug!(symbol = %signal.symbol, reason = %signal.reason, "Hold");
            return;
        }
        info!(
            symbol = %signal.symbol,
            action = %signal.action,
            rsi = ?signal.rsi,
            confidence = signal.confidence,
            usd = ?signal.usd,
            reason = %signal.reason,
            "Signal"
        );
    }

    fn on_trade(&self, trade: &Trade) {
        info!(
            symbol = %trade.symbol,
            action = %trade.action,
            cloid = %trade.order.cloid,
            size = %trade.order.size,
            fill_price = ?trade.order.fill_price,
            "Trade executed"
        );
    }

    fn on_cycle(&self, result: &StrategyCycleResult) {
        if result.skipped {
            debug!(strategy = %result.strategy, reason = ?result.skip_reason, "Cycle skipped");
            return;
        }
        info!(
            strategy = %result.strategy,
            status = result.status.as_str(),
            signals = result.signals.len(),
            trades = result.trades.len(),
            errors = result.errors.len(),
            "Cycle complete"
        );
    }
}

/// Event forwarded by `ChannelObserver`.
#[derive(Debug, Clone)]
pub enum StrategyEvent {
    Signal(Signal),
    Trade(Trade),
    Cycle(Box<StrategyCycleResult>),
}

/// Forwards events to a bounded channel without blocking the loop.
/// Events are dropped when the receiver lags.
pub struct ChannelObserver {
    tx: mpsc::Sender<StrategyEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<StrategyEvent>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StrategyEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    fn send(&self, event: StrategyEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Strategy event channel full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Strategy event channel closed");
            }
        }
    }
}

impl CycleObserver for ChannelObserver {
    fn on_signal(&self, signal: &Signal) {
        self.send(StrategyEvent::Signal(signal.clone()));
    }

    fn on_trade(&self, trade: &Trade) {
        self.send(StrategyEvent::Trade(trade.clone()));
    }

    fn on_cycle(&self, result: &StrategyCycleResult) {
        self.send(StrategyEvent::Cycle(Box::new(result.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy_loop::StrategyStatus;
    use chrono::Utc;
    use parking_lot::Mutex;
    use perp_core::{Order, OrderSide, Price, Size};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn cycle() -> StrategyCycleResult {
        let mut long = Signal::hold("ETH", Some(25.0), "");
        long.action = SignalAction::Long;
        long.usd = Some(dec!(1000));
        StrategyCycleResult {
            timestamp: Utc::now(),
            strategy: "test".into(),
            status: StrategyStatus::Completed,
            skipped: false,
            skip_reason: None,
            dry_run: false,
            equity: Some(dec!(10000)),
            signals: vec![long, Signal::hold("BTC", Some(50.0), "neutral")],
            trades: vec![Trade {
                symbol: "ETH".into(),
                action: SignalAction::Long,
                order: Order::filled(
                    "ETH",
                    OrderSide::Buy,
                    Size::new(dec!(0.5)),
                    Price::new(dec!(2000)),
                    false,
                ),
                usd: Some(dec!(1000)),
            }],
            errors: Vec::new(),
            message: None,
        }
    }

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl CycleObserver for Recorder {
        fn on_signal(&self, signal: &Signal) {
            self.0.lock().push(format!("signal:{}", signal.symbol));
        }
        fn on_trade(&self, trade: &Trade) {
            self.0.lock().push(format!("trade:{}", trade.symbol));
        }
        fn on_cycle(&self, _result: &StrategyCycleResult) {
            self.0.lock().push("cycle".into());
        }
    }

    #[test]
    fn test_notify_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let observers: Vec<Box<dyn CycleObserver>> =
            vec![Box::new(Recorder(events.clone())), Box::new(LogObserver)];

        notify(&observers, &cycle());

        assert_eq!(
            *events.lock(),
            vec!["signal:ETH", "signal:BTC", "trade:ETH", "cycle"]
        );
    }

    #[tokio::test]
    async fn test_channel_observer_forwards_events() {
        let (observer, mut rx) = ChannelObserver::channel(8);
        notify(&[Box::new(observer) as Box<dyn CycleObserver>], &cycle());

        assert!(matches!(rx.recv().await, Some(StrategyEvent::Signal(s)) if s.symbol == "ETH"));
        assert!(matches!(rx.recv().await, Some(StrategyEvent::Signal(_))));
        assert!(matches!(rx.recv().await, Some(StrategyEvent::Trade(_))));
        assert!(matches!(rx.recv().await, Some(StrategyEvent::Cycle(c)) if c.strategy == "test"));
    }

    #[tokio::test]
    async fn test_channel_observer_drops_when_full() {
        let (observer, mut rx) = ChannelObserver::channel(1);
        notify(&[Box::new(observer) as Box<dyn CycleObserver>], &cycle());

        assert!(matches!(rx.recv().await, Some(StrategyEvent::Signal(_))));
        // Sender was dropped with the observer; the overflow never arrived.
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_channel_observer_closed_receiver() {
        let (observer, rx) = ChannelObserver::channel(4);
        drop(rx);
        observer.on_cycle(&cycle());
    }
}
