//! Portfolio accounting for backtesting.
//!
//! Tracks the net position, realized P&L, commissions and a mark-to-mid
//! equity curve. Prices are kept in ticks; currency amounts are
//! `ticks * tick_value * quantity`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use l3_core::{Config, Fill, OrderBookSnapshot, Quantity, TimestampNs};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    fn of(quantity: Quantity) -> Option<Self> {
        match quantity.signum() {
            1 => Some(PositionSide::Long),
            -1 => Some(PositionSide::Short),
            _ => None,
        }
    }

    fn sign(self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

/// Closed (or partially closed) trade record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    /// Timestamp of the opening fill.
    pub entry_ts: TimestampNs,
    /// Timestamp of the closing fill.
    pub exit_ts: TimestampNs,
    pub side: PositionSide,
    /// Average entry price in ticks.
    pub entry_price_ticks: f64,
    /// Exit price in ticks.
    pub exit_price_ticks: f64,
    /// Entry price in instrument units.
    pub entry_price: f64,
    /// Exit price in instrument units.
    pub exit_price: f64,
    /// Contracts closed.
    pub quantity: Quantity,
    /// P&L before commission.
    pub gross_pnl: f64,
    /// Entry and exit commission attributable to this quantity.
    pub commission: f64,
    /// P&L after commission.
    pub net_pnl: f64,
    /// Whether the closing fill also opened an opposite position.
    pub flipped: bool,
}

/// One point of the mark-to-market equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquitySample {
    pub ts: TimestampNs,
    pub equity: f64,
}

/// Terminal portfolio state for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub initial_capital: f64,
    /// Signed net position.
    pub position: Quantity,
    pub avg_entry_ticks: f64,
    pub cash: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub commissions: f64,
    pub equity: f64,
    pub fills: u64,
    pub rejected_fills: u64,
}

/// Portfolio tracker.
#[derive(Debug, Clone)]
pub struct Portfolio {
    tick_size: f64,
    tick_value: f64,
    initial_capital: f64,
    /// Signed net position.
    position: Quantity,
    avg_entry_ticks: f64,
    entry_ts: TimestampNs,
    /// Commission paid to open the current position, not yet attributed to a trade.
    open_commission: f64,
    /// Realized P&L before commission.
    realized_pnl: f64,
    commissions: f64,
    last_mid_ticks: Option<f64>,
    trades: Vec<ClosedTrade>,
    equity_curve: Vec<EquitySample>,
    fills: u64,
    rejected_fills: u64,
}

impl Portfolio {
    pub fn new(initial_capital: f64, tick_size: f64, tick_value: f64) -> Self {
        Self {
            tick_size,
            tick_value,
            initial_capital,
            position: 0,
            avg_entry_ticks: 0.0,
            entry_ts: 0,
            open_commission: 0.0,
            realized_pnl: 0.0,
            commissions: 0.0,
            last_mid_ticks: None,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            fills: 0,
            rejected_fills: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.capital, config.tick_size, config.tick_value)
    }

    /// Apply a fill. Zero-quantity fills are counted and otherwise ignored.
    pub fn on_fill(&mut self, fill: &Fill) {
        if fill.quantity == 0 {
            if fill.is_rejected() {
                self.rejected_fills += 1;
            }
            return;
        }
        self.fills += 1;
        self.commissions += fill.commission;

        let signed = fill.signed_quantity();
        let price = fill.avg_price_ticks;

        match PositionSide::of(self.position) {
            Some(side) if side.sign() * signed as f64 > 0.0 => self.add_to_position(fill, price),
            None => {
                self.entry_ts = fill.ts;
                self.add_to_position(fill, price);
            }
            Some(side) => self.reduce_position(fill, side, price),
        }
        self.sample(fill.ts);

        debug!(
            position = self.position,
            avg_entry_ticks = self.avg_entry_ticks,
            realized_pnl = self.realized_pnl,
            "portfolio updated"
        );
    }

    fn add_to_position(&mut self, fill: &Fill, price: f64) {
        let held = self.position.abs() as f64;
        let added = fill.quantity as f64;
        self.avg_entry_ticks = (self.avg_entry_ticks * held + price * added) / (held + added);
        self.position += fill.signed_quantity();
        self.open_commission += fill.commission;
    }

    fn reduce_position(&mut self, fill: &Fill, side: PositionSide, price: f64) {
        let held = self.position.abs();
        let closing = held.min(fill.quantity);
        let opening = fill.quantity - closing;

        let gross = (price - self.avg_entry_ticks) * side.sign() * closing as f64 * self.tick_value;
        let entry_commission = self.open_commission * closing as f64 / held as f64;
        let exit_commission = fill.commission * closing as f64 / fill.quantity as f64;
        let commission = entry_commission + exit_commission;

        self.trades.push(ClosedTrade {
            entry_ts: self.entry_ts,
            exit_ts: fill.ts,
            side,
            entry_price_ticks: self.avg_entry_ticks,
            exit_price_ticks: price,
            entry_price: self.avg_entry_ticks * self.tick_size,
            exit_price: price * self.tick_size,
            quantity: closing,
            gross_pnl: gross,
            commission,
            net_pnl: gross - commission,
            flipped: opening > 0,
        });

        self.realized_pnl += gross;
        self.open_commission -= entry_commission;
        self.position -= side.sign() as Quantity * closing;

        if opening > 0 {
            // Remainder opens the opposite side at the fill price.
            self.position = fill.signed_quantity().signum() * opening;
            self.avg_entry_ticks = price;
            self.entry_ts = fill.ts;
            self.open_commission = fill.commission - exit_commission;
        } else if self.position == 0 {
            self.avg_entry_ticks = 0.0;
            self.open_commission = 0.0;
        }
    }

    /// Mark to the snapshot's mid price and extend the equity curve.
    ///
    /// One-sided books keep the previous mark.
    pub fn mark(&mut self, snapshot: &OrderBookSnapshot, ts: TimestampNs) {
        if let Some(mid) = snapshot.mid_ticks() {
            self.last_mid_ticks = Some(mid);
        }
        self.sample(ts);
    }

    /// Close the equity curve at the end of a run.
    pub fn finish(&mut self, ts: TimestampNs) {
        self.sample(ts);
    }

    /// Append the current equity unless it matches the last sample.
    fn sample(&mut self, ts: TimestampNs) {
        let equity = self.equity();
        let changed = self
            .equity_curve
            .last()
            .map_or(true, |last| last.equity != equity);
        if changed {
            self.equity_curve.push(EquitySample { ts, equity });
        }
    }

    /// Signed net position.
    #[inline]
    pub fn position(&self) -> Quantity {
        self.position
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.position == 0
    }

    pub fn avg_entry_ticks(&self) -> f64 {
        self.avg_entry_ticks
    }

    /// Realized P&L before commission.
    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn commissions(&self) -> f64 {
        self.commissions
    }

    /// Capital plus realized P&L minus commissions.
    pub fn cash(&self) -> f64 {
        self.initial_capital + self.realized_pnl - self.commissions
    }

    /// Open P&L at the last mid.
    pub fn unrealized_pnl(&self) -> f64 {
        match self.last_mid_ticks {
            Some(mid) if self.position != 0 => {
                (mid - self.avg_entry_ticks) * self.position as f64 * self.tick_value
            }
            _ => 0.0,
        }
    }

    pub fn equity(&self) -> f64 {
        self.cash() + self.unrealized_pnl()
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquitySample] {
        &self.equity_curve
    }

    pub fn summary(&self) -> PortfolioSummary {
        PortfolioSummary {
            initial_capital: self.initial_capital,
            position: self.position,
            avg_entry_ticks: self.avg_entry_ticks,
            cash: self.cash(),
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl(),
            commissions: self.commissions,
            equity: self.equity(),
            fills: self.fills,
            rejected_fills: self.rejected_fills,
        }
    }
}
