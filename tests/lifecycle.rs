//! End-to-end match lifecycle guards and the TimeScaler mapping it rides
//! on, driven through the public API.

use std::time::Duration;

use chrono::NaiveDate;
use paper_arcade_backend::historical::{NormalizedDay, TradingDay};
use paper_arcade_backend::r#match::{MatchConfig, MatchEngine, MatchState};
use paper_arcade_backend::timescaler::TimeScaler;

fn flat_day(open: i64) -> NormalizedDay {
    let bars = vec![
        paper_arcade_backend::historical::OhlcvBar {
            open,
            high: open + 10,
            low: open - 10,
            close: open,
            volume: 100,
        };
        paper_arcade_backend::historical::BARS_PER_DAY
    ];
    let day = TradingDay::new("SIM", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), bars);
    NormalizedDay::normalize(day, open)
}

#[test]
fn time_scaler_five_minutes_into_a_ten_minute_match() {
    let mut scaler = TimeScaler::new(10);
    scaler.start_with_elapsed(Duration::from_secs(5 * 60));

    assert!((scaler.progress() - 0.5).abs() < 1e-6);
    assert!((scaler.elapsed_market_minutes() - 195.0).abs() < 1e-6);
    assert_eq!(scaler.current_bar_index(), 195);
    assert_eq!(scaler.market_time_string(), "12:45 PM");
}

#[test]
fn lifecycle_guards_hold_from_lobby_through_trading() {
    let config = MatchConfig {
        symbol: "SIM".into(),
        duration_min: 10,
        target_nav: 10_000,
        starting_account_value: 100_000_000,
        pre_match_countdown_secs: 15,
    };
    let engine = MatchEngine::new("m1", config);
    assert_eq!(engine.state(), MatchState::Lobby);

    // PRE_MATCH requires a day to have been set.
    assert!(engine.transition_to_pre_match().is_err());

    engine.set_day(flat_day(10_000)).unwrap();
    engine.join_with_fraction("p1", "acct1", 0.5).unwrap();
    engine.join_with_fraction("p2", "acct2", 0.5).unwrap();

    engine.transition_to_pre_match().unwrap();
    assert_eq!(engine.state(), MatchState::PreMatch);

    // Joining is still accepted in PRE_MATCH, but leaving is not.
    engine.join_with_fraction("p3", "acct3", 0.5).unwrap();
    assert!(engine.leave("p1").is_err());

    engine.start_trading().unwrap();
    assert_eq!(engine.state(), MatchState::Trading);
    assert_eq!(engine.current_nav(), 10_000);

    // Join is no longer accepted once trading begins.
    assert!(engine.join("late", "acct4").is_err());
    assert_eq!(engine.participants().len(), 3);
}
