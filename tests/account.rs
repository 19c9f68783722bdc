//! Account WAP and margin scenarios, driven through the public `Account`
//! API.

use paper_arcade_backend::account::{Account, STARTING_BALANCE_CENTS};
use paper_arcade_backend::model::Side;

#[test]
fn round_trip_long_profit_nets_two_thousand_dollars() {
    let mut account = Account::new("a1", "u1", STARTING_BALANCE_CENTS);

    let realized_on_open = account.apply_fill("SIM", Side::Buy, 100, 10_000);
    assert_eq!(realized_on_open, 0);

    let realized_on_close = account.apply_fill("SIM", Side::Sell, 100, 12_000);
    assert_eq!(realized_on_close, 200_000);

    let position = account.position("SIM");
    assert_eq!(position.quantity, 0);
    assert_eq!(position.avg_entry_price, 0);
    assert_eq!(
        account.cash - STARTING_BALANCE_CENTS,
        200_000,
        "cash delta must equal price * qty on each leg, net of the round trip"
    );
}

#[test]
fn reversal_flips_the_position_and_rebases_wap_to_the_fill_price() {
    let mut account = Account::new("a1", "u1", STARTING_BALANCE_CENTS);

    account.apply_fill("SIM", Side::Buy, 100, 10_000);
    let realized = account.apply_fill("SIM", Side::Sell, 150, 12_000);

    assert_eq!(realized, 200_000);
    let position = account.position("SIM");
    assert_eq!(position.quantity, -50);
    assert_eq!(position.avg_entry_price, 12_000);
}

#[test]
fn margin_check_rejects_oversized_order_then_accepts_a_smaller_one() {
    let account = Account::new("a1", "u1", STARTING_BALANCE_CENTS);

    let oversized = account.check_margin("SIM", Side::Buy, 20_000, 10_000);
    assert!(oversized.is_err());

    let resized = account.check_margin("SIM", Side::Buy, 100, 10_000);
    assert!(resized.is_ok());
}
