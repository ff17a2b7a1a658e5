//! # engine::rules
//!
//! The ordered decision table.  Rule order encodes priority and evaluation
//! stops at the first match, so the whole policy is auditable top to bottom:
//!
//! ```text
//! 1. CHOPPY        → IDLE   (no trades in a range-bound market)
//! 2. PULLBACK BUY  → BUY    confidence 90 with pattern / 75 without
//! 3. PULLBACK SELL → SELL   symmetric
//! 4. REVERSAL BUY  → BUY    confidence 65, pattern required
//! 5. REVERSAL SELL → SELL   symmetric
//!    otherwise     → IDLE   with a reason naming the failed leg
//! ```
//!
//! Every actionable branch derives the target from twice the stop distance,
//! fixing risk:reward at 1:2 by construction.
//!
//! A second, coarser table ([`quick_classify`]) mirrors the printed
//! quick-reference card.  It is display-only and never influences the action.

use crate::models::{
    FeatureSet, QuickDecision, Signal, SignalAction, SignalKind, TradeLevels, Trend,
};

// ─── Rule Table ───────────────────────────────────────────────────────────────

/// What a fired rule contributes to the final [`Signal`].
struct RuleOutcome {
    action: SignalAction,
    kind: Option<SignalKind>,
    confidence: u8,
    levels: Option<TradeLevels>,
    reason: String,
}

/// One row of the priority-ordered table.
struct DecisionRule {
    name: &'static str,
    matches: fn(&FeatureSet) -> bool,
    build: fn(&FeatureSet) -> RuleOutcome,
}

static RULES: &[DecisionRule] = &[
    DecisionRule {
        name: "CHOPPY_IDLE",
        matches: |f| f.macro_tf.is_choppy,
        build: |_| RuleOutcome {
            action: SignalAction::Idle,
            kind: None,
            confidence: 0,
            levels: None,
            reason: "Market is choppy (Choppiness > 61.8)".to_string(),
        },
    },
    DecisionRule {
        name: "PULLBACK_BUY",
        matches: |f| {
            f.macro_tf.trend == Trend::Uptrend
                && f.mid_tf.rsi > 50.0
                && f.micro_tf.rsi < 35.0
                && f.micro_tf.is_rsi_bounce_up
        },
        build: |f| {
            let has_pattern = f.micro_tf.has_bullish_pattern();
            let entry = f.micro_tf.price;
            let stop_loss = f.mid_tf.support_level * 0.995; // -0.5% below support
            RuleOutcome {
                action: SignalAction::Buy,
                kind: Some(SignalKind::Pullback),
                confidence: if has_pattern { 90 } else { 75 },
                levels: Some(TradeLevels::long(entry, stop_loss)),
                reason: format!(
                    "Pullback Buy: 30M Uptrend + 1M RSI dip ({:.1}){}",
                    f.micro_tf.rsi,
                    if has_pattern { " + Pattern" } else { "" }
                ),
            }
        },
    },
    DecisionRule {
        name: "PULLBACK_SELL",
        matches: |f| {
            f.macro_tf.trend == Trend::Downtrend
                && f.mid_tf.rsi < 50.0
                && f.micro_tf.rsi > 65.0
                && f.micro_tf.is_rsi_bounce_down
        },
        build: |f| {
            let has_pattern = f.micro_tf.has_bearish_pattern();
            let entry = f.micro_tf.price;
            let stop_loss = f.mid_tf.resistance_level * 1.005; // +0.5% above resistance
            RuleOutcome {
                action: SignalAction::Sell,
                kind: Some(SignalKind::Pullback),
                confidence: if has_pattern { 90 } else { 75 },
                levels: Some(TradeLevels::short(entry, stop_loss)),
                reason: format!(
                    "Pullback Sell: 30M Downtrend + 1M RSI spike ({:.1}){}",
                    f.micro_tf.rsi,
                    if has_pattern { " + Pattern" } else { "" }
                ),
            }
        },
    },
    DecisionRule {
        name: "REVERSAL_BUY",
        matches: |f| {
            f.macro_tf.trend == Trend::Downtrend
                && f.mid_tf.rsi < 30.0
                && f.micro_tf.rsi < 30.0
                && f.micro_tf.is_rsi_bounce_up
                && f.micro_tf.has_bullish_pattern()
        },
        build: |f| {
            let entry = f.micro_tf.price;
            let stop_loss = f.micro_tf.price.min(f.mid_tf.swing_low) * 0.99;
            RuleOutcome {
                action: SignalAction::Buy,
                kind: Some(SignalKind::Reversal),
                confidence: 65,
                levels: Some(TradeLevels::long(entry, stop_loss)),
                reason: "Reversal Buy: Oversold confirmation + Pattern".to_string(),
            }
        },
    },
    DecisionRule {
        name: "REVERSAL_SELL",
        matches: |f| {
            f.macro_tf.trend == Trend::Uptrend
                && f.mid_tf.rsi > 70.0
                && f.micro_tf.rsi > 70.0
                && f.micro_tf.is_rsi_bounce_down
                && f.micro_tf.has_bearish_pattern()
        },
        build: |f| {
            let entry = f.micro_tf.price;
            let stop_loss = f.micro_tf.price.max(f.mid_tf.swing_high) * 1.01;
            RuleOutcome {
                action: SignalAction::Sell,
                kind: Some(SignalKind::Reversal),
                confidence: 65,
                levels: Some(TradeLevels::short(entry, stop_loss)),
                reason: "Reversal Sell: Overbought confirmation + Pattern".to_string(),
            }
        },
    },
];

/// Evaluates the ordered table over one feature set.  First match wins; the
/// fallback synthesizes an idle reason from whichever leg failed.
pub fn evaluate(features: &FeatureSet) -> Signal {
    let quick = quick_classify(features);

    for rule in RULES {
        if (rule.matches)(features) {
            let outcome = (rule.build)(features);
            return Signal {
                action: outcome.action,
                kind: outcome.kind,
                confidence: outcome.confidence,
                levels: outcome.levels,
                reason: outcome.reason,
                matched_rule: rule.name,
                quick,
                features: features.clone(),
                generated_at: chrono::Utc::now(),
            };
        }
    }

    Signal {
        action: SignalAction::Idle,
        kind: None,
        confidence: 0,
        levels: None,
        reason: idle_reason(features),
        matched_rule: "NO_SETUP",
        quick,
        features: features.clone(),
        generated_at: chrono::Utc::now(),
    }
}

/// Names the sub-condition that kept the engine idle.
fn idle_reason(features: &FeatureSet) -> String {
    let mut issues: Vec<&str> = Vec::new();
    if features.macro_tf.is_choppy {
        issues.push("Market Choppy");
    }
    if features.macro_tf.trend == Trend::Uptrend && features.mid_tf.rsi < 50.0 {
        issues.push("15M RSI Weak");
    }
    if features.macro_tf.trend == Trend::Downtrend && features.mid_tf.rsi > 50.0 {
        issues.push("15M RSI Strong");
    }
    if issues.is_empty() {
        "Waiting for setup".to_string()
    } else {
        issues.join(" | ")
    }
}

// ─── Quick Decision Table (display only) ──────────────────────────────────────

struct QuickRule {
    matches: fn(&FeatureSet) -> bool,
    action: SignalAction,
    risk: &'static str,
    condition: &'static str,
}

static QUICK_RULES: &[QuickRule] = &[
    QuickRule {
        matches: |f| f.macro_tf.trend == Trend::Uptrend && f.mid_tf.rsi > 50.0 && f.micro_tf.rsi < 30.0,
        action: SignalAction::Buy,
        risk: "⭐⭐⭐",
        condition: "UPTREND | RSI15 > 50 | RSI1 < 30",
    },
    QuickRule {
        matches: |f| f.macro_tf.trend == Trend::Downtrend && f.mid_tf.rsi < 50.0 && f.micro_tf.rsi > 70.0,
        action: SignalAction::Sell,
        risk: "⭐⭐⭐",
        condition: "DOWNTREND | RSI15 < 50 | RSI1 > 70",
    },
    QuickRule {
        matches: |f| {
            f.macro_tf.is_choppy
                && (40.0..=60.0).contains(&f.mid_tf.rsi)
                && (40.0..=60.0).contains(&f.micro_tf.rsi)
        },
        action: SignalAction::Idle,
        risk: "-",
        condition: "CHOPPY | RSI15 40-60 | RSI1 40-60",
    },
    QuickRule {
        matches: |f| f.mid_tf.rsi < 30.0 && f.micro_tf.rsi < 20.0,
        action: SignalAction::Idle,
        risk: "💀💀💀",
        condition: "EXTREME OVERSOLD (Wait for bounce)",
    },
    QuickRule {
        matches: |f| f.mid_tf.rsi > 70.0 && f.micro_tf.rsi > 80.0,
        action: SignalAction::Idle,
        risk: "🔥🔥🔥",
        condition: "EXTREME OVERBOUGHT (Wait for drop)",
    },
    QuickRule {
        matches: |f| f.macro_tf.trend == Trend::Uptrend && f.mid_tf.rsi > 60.0 && f.micro_tf.rsi > 60.0,
        action: SignalAction::Buy,
        risk: "⭐⭐",
        condition: "STRONG UPTREND (Breakout potential)",
    },
    QuickRule {
        matches: |f| f.macro_tf.trend == Trend::Downtrend && f.mid_tf.rsi < 40.0 && f.micro_tf.rsi < 40.0,
        action: SignalAction::Sell,
        risk: "⭐⭐",
        condition: "STRONG DOWNTREND (Breakdown potential)",
    },
];

/// Coarse first-match classification for the at-a-glance panel.
pub fn quick_classify(features: &FeatureSet) -> QuickDecision {
    for rule in QUICK_RULES {
        if (rule.matches)(features) {
            return QuickDecision {
                action: rule.action,
                risk: rule.risk,
                condition: rule.condition,
            };
        }
    }
    QuickDecision {
        action: SignalAction::Idle,
        risk: "❌",
        condition: "CONFLICT / NO CLEAR SETUP",
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MacroSummary, MicroSummary, MidSummary, Momentum};

    /// Neutral baseline the individual tests bend into shape.
    fn make_features() -> FeatureSet {
        FeatureSet {
            macro_tf: MacroSummary {
                trend: Trend::Uptrend,
                momentum: Momentum::Bullish,
                is_choppy: false,
                strength: 1.2,
                rsi: 55.0,
                choppiness: 45.0,
                price: 100.0,
                ema50: 100.5,
                ema200: 99.5,
            },
            mid_tf: MidSummary {
                is_pullback: true,
                is_near_support: false,
                is_near_resistance: false,
                support_level: 99.0,
                resistance_level: 102.0,
                rsi: 55.0,
                distance_from_ema21: 0.4,
                swing_high: 102.0,
                swing_low: 97.0,
                price: 100.0,
            },
            micro_tf: MicroSummary {
                rsi: 50.0,
                prev_rsi: 50.0,
                is_bullish_engulfing: false,
                is_bearish_engulfing: false,
                is_hammer: false,
                is_shooting_star: false,
                is_rsi_bounce_up: false,
                is_rsi_bounce_down: false,
                is_rsi_bounce_up_30: false,
                is_rsi_bounce_down_70: false,
                is_macd_bullish: false,
                is_macd_bearish: false,
                hma_short: 100.0,
                hma_long: 100.0,
                price: 100.0,
            },
        }
    }

    #[test]
    fn test_choppy_always_idles_regardless_of_other_tiers() {
        let mut features = make_features();
        features.macro_tf.is_choppy = true;
        // A perfect pullback-buy setup underneath — must still idle.
        features.mid_tf.rsi = 60.0;
        features.micro_tf.rsi = 20.0;
        features.micro_tf.is_rsi_bounce_up = true;

        let signal = evaluate(&features);
        assert_eq!(signal.action, SignalAction::Idle);
        assert_eq!(signal.matched_rule, "CHOPPY_IDLE");
        assert!(signal.reason.to_lowercase().contains("choppy"));
    }

    #[test]
    fn test_pullback_buy_without_pattern_confidence_75() {
        let mut features = make_features();
        features.mid_tf.rsi = 60.0;
        features.micro_tf.rsi = 20.0;
        features.micro_tf.prev_rsi = 18.0;
        features.micro_tf.is_rsi_bounce_up = true;

        let signal = evaluate(&features);
        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.kind, Some(SignalKind::Pullback));
        assert_eq!(signal.confidence, 75);

        let levels = signal.levels.unwrap();
        assert!((levels.stop_loss - 99.0 * 0.995).abs() < 1e-9);
        assert!((levels.take_profit - (100.0 + 2.0 * (100.0 - levels.stop_loss))).abs() < 1e-9);
        assert_eq!(levels.risk_reward, 2.0);
    }

    #[test]
    fn test_pullback_buy_with_pattern_confidence_90() {
        let mut features = make_features();
        features.mid_tf.rsi = 60.0;
        features.micro_tf.rsi = 20.0;
        features.micro_tf.is_rsi_bounce_up = true;
        features.micro_tf.is_hammer = true;

        let signal = evaluate(&features);
        assert_eq!(signal.confidence, 90);
        assert!(signal.reason.contains("Pattern"));
    }

    #[test]
    fn test_pullback_sell_mirrors_buy() {
        let mut features = make_features();
        features.macro_tf.trend = Trend::Downtrend;
        features.mid_tf.rsi = 40.0;
        features.micro_tf.rsi = 70.0;
        features.micro_tf.is_rsi_bounce_down = true;

        let signal = evaluate(&features);
        assert_eq!(signal.action, SignalAction::Sell);
        assert_eq!(signal.kind, Some(SignalKind::Pullback));
        assert_eq!(signal.confidence, 75);

        let levels = signal.levels.unwrap();
        assert!((levels.stop_loss - 102.0 * 1.005).abs() < 1e-9);
        assert!(levels.take_profit < levels.entry);
    }

    #[test]
    fn test_reversal_buy_requires_pattern() {
        let mut features = make_features();
        features.macro_tf.trend = Trend::Downtrend;
        features.mid_tf.rsi = 25.0;
        features.micro_tf.rsi = 25.0;
        features.micro_tf.is_rsi_bounce_up = true;

        // No pattern → no reversal entry.
        assert_eq!(evaluate(&features).action, SignalAction::Idle);

        features.micro_tf.is_bullish_engulfing = true;
        let signal = evaluate(&features);
        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.kind, Some(SignalKind::Reversal));
        assert_eq!(signal.confidence, 65);

        // Stop sits 1% below the lower of price and swing low.
        let levels = signal.levels.unwrap();
        assert!((levels.stop_loss - 97.0 * 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_reversal_sell_uses_swing_high_stop() {
        let mut features = make_features();
        features.mid_tf.rsi = 75.0;
        features.micro_tf.rsi = 75.0;
        features.micro_tf.is_rsi_bounce_down = true;
        features.micro_tf.is_shooting_star = true;

        let signal = evaluate(&features);
        assert_eq!(signal.action, SignalAction::Sell);
        assert_eq!(signal.kind, Some(SignalKind::Reversal));
        let levels = signal.levels.unwrap();
        assert!((levels.stop_loss - 102.0 * 1.01).abs() < 1e-9);
    }

    #[test]
    fn test_idle_reason_names_the_failed_leg() {
        let mut features = make_features();
        features.mid_tf.rsi = 40.0; // uptrend but mid momentum weak

        let signal = evaluate(&features);
        assert_eq!(signal.action, SignalAction::Idle);
        assert_eq!(signal.matched_rule, "NO_SETUP");
        assert!(signal.reason.contains("15M RSI Weak"));
    }

    #[test]
    fn test_idle_reason_default() {
        let signal = evaluate(&make_features());
        assert_eq!(signal.reason, "Waiting for setup");
    }

    #[test]
    fn test_quick_table_first_row() {
        let mut features = make_features();
        features.mid_tf.rsi = 60.0;
        features.micro_tf.rsi = 25.0;

        let quick = quick_classify(&features);
        assert_eq!(quick.action, SignalAction::Buy);
        assert_eq!(quick.condition, "UPTREND | RSI15 > 50 | RSI1 < 30");
    }

    #[test]
    fn test_quick_table_extreme_oversold_row() {
        let mut features = make_features();
        features.macro_tf.trend = Trend::Downtrend;
        features.mid_tf.rsi = 25.0;
        features.micro_tf.rsi = 15.0;

        let quick = quick_classify(&features);
        assert_eq!(quick.action, SignalAction::Idle);
        assert!(quick.condition.contains("EXTREME OVERSOLD"));
    }

    #[test]
    fn test_quick_table_conflict_fallback() {
        let quick = quick_classify(&make_features());
        assert_eq!(quick.action, SignalAction::Idle);
        assert_eq!(quick.condition, "CONFLICT / NO CLEAR SETUP");
    }

    #[test]
    fn test_quick_table_never_influences_action() {
        // Strong-uptrend quick row says BUY, but the precise table has no
        // matching rule → the actionable signal stays IDLE.
        let mut features = make_features();
        features.mid_tf.rsi = 65.0;
        features.micro_tf.rsi = 65.0;

        let signal = evaluate(&features);
        assert_eq!(signal.quick.action, SignalAction::Buy);
        assert_eq!(signal.action, SignalAction::Idle);
    }
}
