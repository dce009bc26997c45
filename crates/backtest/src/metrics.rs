//! Backtest performance metrics.
//!
//! Calculates summary statistics from closed trades and the equity curve.

use serde::{Deserialize, Serialize};

use crate::portfolio::{ClosedTrade, EquitySample};
use l3_core::TimestampNs;

/// Backtest performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Total number of trades.
    pub total_trades: u32,
    /// Number of winning trades.
    pub winning_trades: u32,
    /// Number of losing trades.
    pub losing_trades: u32,
    /// Win rate (0-1).
    pub win_rate: f64,
    /// Gross P&L (before commission).
    pub gross_pnl: f64,
    /// Net P&L (after commission).
    pub net_pnl: f64,
    /// Total commission attributed to closed trades.
    pub total_commission: f64,
    /// Average winning trade net P&L.
    pub avg_win: f64,
    /// Average losing trade net P&L.
    pub avg_loss: f64,
    /// Profit factor (gross wins / gross losses).
    pub profit_factor: f64,
    /// Maximum drawdown (absolute).
    pub max_drawdown: f64,
    /// Maximum drawdown percentage.
    pub max_drawdown_pct: f64,
    /// Total return percentage.
    pub total_return_pct: f64,
    /// Average time in trade, seconds.
    pub avg_trade_duration_s: f64,
    /// Largest winning trade.
    pub largest_win: f64,
    /// Largest losing trade.
    pub largest_loss: f64,
    /// Consecutive wins (max).
    pub max_consecutive_wins: u32,
    /// Consecutive losses (max).
    pub max_consecutive_losses: u32,
}

/// Equity curve point with drawdown from the running peak.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawdownPoint {
    pub ts: TimestampNs,
    pub equity: f64,
    pub drawdown: f64,
    pub drawdown_pct: f64,
}

/// Metrics calculator.
pub struct MetricsCalculator {
    initial_capital: f64,
}

impl MetricsCalculator {
    /// Create a new metrics calculator.
    pub fn new(initial_capital: f64) -> Self {
        Self { initial_capital }
    }

    /// Calculate metrics from closed trades and the mark-to-market curve.
    pub fn calculate(
        &self,
        trades: &[ClosedTrade],
        equity_curve: &[EquitySample],
    ) -> BacktestMetrics {
        let mut metrics = BacktestMetrics::default();

        for point in self.drawdown_curve(equity_curve) {
            if point.drawdown > metrics.max_drawdown {
                metrics.max_drawdown = point.drawdown;
                metrics.max_drawdown_pct = point.drawdown_pct;
            }
        }

        if trades.is_empty() {
            return metrics;
        }

        metrics.total_trades = trades.len() as u32;

        let mut gross_wins = 0.0;
        let mut gross_losses = 0.0;
        let mut total_win_pnl = 0.0;
        let mut total_loss_pnl = 0.0;
        let mut total_duration: TimestampNs = 0;

        let mut current_wins = 0u32;
        let mut current_losses = 0u32;

        for trade in trades {
            metrics.net_pnl += trade.net_pnl;
            metrics.gross_pnl += trade.gross_pnl;
            metrics.total_commission += trade.commission;
            total_duration += trade.exit_ts - trade.entry_ts;

            if trade.net_pnl > 0.0 {
                metrics.winning_trades += 1;
                total_win_pnl += trade.net_pnl;
                gross_wins += trade.gross_pnl;
                metrics.largest_win = metrics.largest_win.max(trade.net_pnl);

                current_wins += 1;
                current_losses = 0;
                metrics.max_consecutive_wins = metrics.max_consecutive_wins.max(current_wins);
            } else {
                metrics.losing_trades += 1;
                total_loss_pnl += trade.net_pnl;
                gross_losses += trade.gross_pnl.abs();
                metrics.largest_loss = metrics.largest_loss.min(trade.net_pnl);

                current_losses += 1;
                current_wins = 0;
                metrics.max_consecutive_losses = metrics.max_consecutive_losses.max(current_losses);
            }
        }

        metrics.win_rate = metrics.winning_trades as f64 / metrics.total_trades as f64;

        metrics.avg_win = if metrics.winning_trades > 0 {
            total_win_pnl / metrics.winning_trades as f64
        } else {
            0.0
        };

        metrics.avg_loss = if metrics.losing_trades > 0 {
            total_loss_pnl / metrics.losing_trades as f64
        } else {
            0.0
        };

        metrics.profit_factor = if gross_losses > 0.0 {
            gross_wins / gross_losses
        } else if gross_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        metrics.avg_trade_duration_s = (total_duration as f64 / metrics.total_trades as f64) / 1e9;

        if self.initial_capital > 0.0 {
            metrics.total_return_pct = (metrics.net_pnl / self.initial_capital) * 100.0;
        }

        metrics
    }

    /// Running drawdown over an equity curve, starting from initial capital.
    pub fn drawdown_curve(&self, equity_curve: &[EquitySample]) -> Vec<DrawdownPoint> {
        let mut curve = Vec::with_capacity(equity_curve.len());
        let mut peak = self.initial_capital;

        for sample in equity_curve {
            peak = peak.max(sample.equity);
            let drawdown = peak - sample.equity;
            let drawdown_pct = if peak > 0.0 { (drawdown / peak) * 100.0 } else { 0.0 };

            curve.push(DrawdownPoint {
                ts: sample.ts,
                equity: sample.equity,
                drawdown,
                drawdown_pct,
            });
        }

        curve
    }
}
