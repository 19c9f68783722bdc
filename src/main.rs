//! paper-arcade: a multiplayer paper-trading arcade server.
//!
//! Wires the matching engine, match lifecycle, price feed, redemption
//! engine and bot ecosystem behind a thin `axum` HTTP + WebSocket layer.
//! Persistence, auth and rate limiting are explicitly out of scope — the
//! websocket loop here is a minimal upgrade + broadcast forward, the
//! account store is in-memory, and there is no session layer.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use dotenv::dotenv;
use serde::Deserialize;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paper_arcade_backend::account::{Account, AccountStore, InMemoryAccountStore, STARTING_BALANCE_CENTS};
use paper_arcade_backend::book::OrderBook;
use paper_arcade_backend::bots::{
    directional::{BreakoutBot, MeanReversionBot, MomentumBot},
    mandate,
    market_maker::{MarketMaker, MmPreset},
    noise::{NoiseTrader, PanicBot},
    Bot, BotManager,
};
use paper_arcade_backend::config::Config;
use paper_arcade_backend::historical::NormalizedDay;
use paper_arcade_backend::model::{Order as CoreOrder, OrderType, Qty, Side};
use paper_arcade_backend::pricefeed::PriceFeed;
use paper_arcade_backend::r#match::{MatchConfig, MatchEngine};
use paper_arcade_backend::redemption::RedemptionEngine;
use paper_arcade_backend::synthetic::{self, Archetype};
use paper_arcade_backend::ws::Envelope;

#[derive(Parser, Debug)]
#[command(name = "paper-arcade", about = "Multiplayer paper-trading arcade server")]
struct Cli {
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

struct AppState {
    book: Arc<OrderBook>,
    account_store: Arc<InMemoryAccountStore>,
    price_feed: Arc<PriceFeed>,
    redemption: Arc<RedemptionEngine>,
    game_match: Arc<MatchEngine>,
    bots: Arc<BotManager>,
    broadcast_tx: broadcast::Sender<Envelope>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    info!(port = config.port, "starting paper-arcade");

    let state = Arc::new(build_state(&config));
    spawn_background_tasks(&state, &config);

    let app = Router::new()
        .route("/health", get(health))
        .route("/orders", post(submit_order))
        .route("/orders/:order_id", axum::routing::delete(cancel_order))
        .route("/book", get(book_snapshot))
        .route("/redemptions/create", post(create_shares))
        .route("/redemptions/redeem", post(redeem_shares))
        .route("/ws", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn build_state(config: &Config) -> AppState {
    let book = Arc::new(OrderBook::new("SIM", config.recent_trades_capacity));
    let account_store = InMemoryAccountStore::new();
    let price_feed = PriceFeed::new(book.clone());
    let redemption = Arc::new(RedemptionEngine::new(config.match_durations_min[0]));
    let (broadcast_tx, _rx) = broadcast::channel(1024);

    let match_config = MatchConfig {
        symbol: "SIM".into(),
        duration_min: config.match_durations_min[0],
        target_nav: 10_000,
        starting_account_value: config.starting_account_value_cents,
        pre_match_countdown_secs: config.pre_match_countdown_secs,
    };
    let game_match = MatchEngine::new(uuid::Uuid::new_v4().to_string(), match_config);
    let today = chrono::Utc::now().date_naive();
    let raw_day = synthetic::generate_day("SIM", today, 10_000, Archetype::Choppy, 1);
    let day = NormalizedDay::normalize(raw_day, 10_000);
    let _ = game_match.set_day(day);

    let bots = BotManager::new(build_ecosystem(config, &book, &price_feed));
    book.on_trade(bots.trade_callback());

    AppState {
        book,
        account_store,
        price_feed,
        redemption,
        game_match,
        bots,
        broadcast_tx,
    }
}

fn build_ecosystem(
    config: &Config,
    book: &Arc<OrderBook>,
    feed: &Arc<PriceFeed>,
) -> Vec<Arc<dyn Bot>> {
    use paper_arcade_backend::config::EcosystemSize;
    use std::time::Duration;

    // One of each category, per the minimal-ecosystem rule.
    let mut bots: Vec<Arc<dyn Bot>> = vec![
        MarketMaker::new("mm-tight", book.clone(), feed.clone(), MmPreset::Tight),
        MomentumBot::new(
            "mom-fast-1",
            book.clone(),
            feed.clone(),
            Duration::from_millis(500),
            20,
            50,
            50,
            2_000,
        ),
        MeanReversionBot::new("meanrev-1", book.clone(), feed.clone(), Duration::from_secs(1), 50, 50),
        BreakoutBot::new("breakout-1", book.clone(), feed.clone(), Duration::from_secs(1), 30, 1.5, 50, 20),
        NoiseTrader::new("noise-small-1", book.clone(), Duration::from_secs(2), 5, 50, 0.5),
        PanicBot::new("panic-1", book.clone(), feed.clone(), 75, Duration::from_secs(10), 100),
        mandate::twap("twap-buy-1", book.clone(), 5_000, Duration::from_secs(300)),
    ];

    if matches!(config.ecosystem_size, EcosystemSize::Full) {
        // 4 MMs total.
        bots.push(MarketMaker::new("mm-wide", book.clone(), feed.clone(), MmPreset::Wide));
        bots.push(MarketMaker::new("mm-adaptive", book.clone(), feed.clone(), MmPreset::Adaptive));
        bots.push(MarketMaker::new("mm-nervous", book.clone(), feed.clone(), MmPreset::Nervous));

        // 4 momentum bots: 2 fast, 2 slow.
        bots.push(MomentumBot::new(
            "mom-fast-2",
            book.clone(),
            feed.clone(),
            Duration::from_millis(500),
            20,
            50,
            50,
            2_000,
        ));
        bots.push(MomentumBot::new(
            "mom-slow-1",
            book.clone(),
            feed.clone(),
            Duration::from_secs(5),
            100,
            100,
            50,
            2_000,
        ));
        bots.push(MomentumBot::new(
            "mom-slow-2",
            book.clone(),
            feed.clone(),
            Duration::from_secs(5),
            100,
            100,
            50,
            2_000,
        ));

        // 2 mean reversion, 2 breakout.
        bots.push(MeanReversionBot::new("meanrev-2", book.clone(), feed.clone(), Duration::from_secs(1), 50, 50));
        bots.push(BreakoutBot::new("breakout-2", book.clone(), feed.clone(), Duration::from_secs(1), 30, 1.5, 50, 20));

        // 4 small noise, 2 large noise.
        bots.push(NoiseTrader::new("noise-small-2", book.clone(), Duration::from_secs(2), 5, 50, 0.5));
        bots.push(NoiseTrader::new("noise-small-3", book.clone(), Duration::from_secs(2), 5, 50, 0.5));
        bots.push(NoiseTrader::new("noise-small-4", book.clone(), Duration::from_secs(2), 5, 50, 0.5));
        bots.push(NoiseTrader::new("noise-large-1", book.clone(), Duration::from_secs(5), 200, 1_000, 0.5));
        bots.push(NoiseTrader::new("noise-large-2", book.clone(), Duration::from_secs(5), 200, 1_000, 0.5));

        // 2 panic bots.
        bots.push(PanicBot::new("panic-2", book.clone(), feed.clone(), 75, Duration::from_secs(10), 100));

        // Mandated agents: 2 TWAP buyers, 1 opportunistic buyer, 1 TWAP seller, 1 desperate seller.
        bots.push(mandate::twap("twap-buy-2", book.clone(), 5_000, Duration::from_secs(300)));
        bots.push(mandate::opportunistic("opportunistic-buy", book.clone(), 2_000, Duration::from_secs(300)));
        bots.push(mandate::twap("twap-sell", book.clone(), -5_000, Duration::from_secs(300)));
        bots.push(mandate::desperate("desperate-sell", book.clone(), -3_000, Duration::from_secs(120)));
    }

    bots
}

fn spawn_background_tasks(state: &Arc<AppState>, _config: &Config) {
    tokio::spawn(state.price_feed.clone().run_book_mid_refresh_loop());

    {
        let match_id = state.game_match.id();
        let price_feed = state.price_feed.clone();
        let broadcast_tx = state.broadcast_tx.clone();
        state.game_match.on_price_tick(Arc::new(move |update| {
            price_feed.publish(update.nav, &update.market_time, update.progress);
            let _ = broadcast_tx.send(Envelope::PriceTick {
                match_id: match_id.clone(),
                nav: update.nav,
                market_time: update.market_time.clone(),
                remaining_sec: 0,
                progress: update.progress,
            });
        }));
    }

    {
        let book = state.book.clone();
        let broadcast_tx = state.broadcast_tx.clone();
        state.book.on_trade(Arc::new(move |trade| {
            let _ = broadcast_tx.send(Envelope::Trade { trade: trade.clone() });
            let _ = broadcast_tx.send(Envelope::Book { book: book.snapshot(Some(20)) });
        }));
    }

    state.bots.start_all();
    tokio::spawn(state.game_match.clone().run_price_tick_loop());
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct SubmitOrderRequest {
    user_id: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    price: Option<i64>,
    quantity: i64,
}

async fn submit_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitOrderRequest>,
) -> impl IntoResponse {
    let side = match request.side.as_str() {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        _ => return bad_request("side must be \"buy\" or \"sell\""),
    };
    let order_type = match request.order_type.as_str() {
        "limit" => OrderType::Limit,
        "market" => OrderType::Market,
        _ => return bad_request("type must be \"limit\" or \"market\""),
    };
    let price = request.price.unwrap_or(0);
    if request.quantity <= 0 {
        return bad_request("quantity must be positive");
    }
    if order_type == OrderType::Limit && price <= 0 {
        return bad_request("price must be positive for limit orders");
    }

    ensure_account(&state, &request.user_id);
    if let Some(account) = state.account_store.get(&request.user_id) {
        let estimate = if price > 0 { price } else { state.game_match.current_nav() };
        if account
            .check_margin("SIM", side, request.quantity, estimate)
            .is_err()
        {
            return bad_request("insufficient margin for this order");
        }
    }

    let order = CoreOrder::new(&request.user_id, "SIM", side, order_type, price, request.quantity);
    match state.book.submit(order.clone()) {
        Ok(trades) => {
            state.account_store.transaction(&request.user_id, |account| {
                for trade in &trades {
                    let (trade_side, price) = if trade.buyer_id == request.user_id {
                        (Side::Buy, trade.price)
                    } else {
                        (Side::Sell, trade.price)
                    };
                    account.apply_fill("SIM", trade_side, trade.quantity, price);
                }
            });
            Json(serde_json::json!({ "order_id": order.id, "trades": trades })).into_response()
        }
        Err(e) => bad_request(&e.to_string()),
    }
}

async fn cancel_order(State(state): State<Arc<AppState>>, Path(order_id): Path<String>) -> impl IntoResponse {
    match state.book.cancel(&order_id) {
        Ok(()) => Json(serde_json::json!({ "cancelled": order_id })).into_response(),
        Err(e) => (axum::http::StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

async fn book_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.book.snapshot(None))
}

#[derive(Debug, Deserialize)]
struct RedemptionRequest {
    user_id: String,
    quantity: Qty,
}

async fn create_shares(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RedemptionRequest>,
) -> impl IntoResponse {
    if request.quantity <= 0 {
        return bad_request("quantity must be positive");
    }
    ensure_account(&state, &request.user_id);
    let nav = state.game_match.current_nav();
    let price = state.redemption.create(nav, request.quantity);
    state.account_store.transaction(&request.user_id, |account| {
        account.apply_fill("SIM", Side::Buy, request.quantity, price);
    });
    Json(serde_json::json!({ "price": price, "quantity": request.quantity })).into_response()
}

async fn redeem_shares(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RedemptionRequest>,
) -> impl IntoResponse {
    if request.quantity <= 0 {
        return bad_request("quantity must be positive");
    }
    ensure_account(&state, &request.user_id);
    let nav = state.game_match.current_nav();
    let price = state.redemption.redeem(nav, request.quantity);
    state.account_store.transaction(&request.user_id, |account| {
        account.apply_fill("SIM", Side::Sell, request.quantity, price);
    });
    Json(serde_json::json!({ "price": price, "quantity": request.quantity })).into_response()
}

fn ensure_account(state: &AppState, user_id: &str) {
    if state.account_store.get(user_id).is_none() {
        state
            .account_store
            .upsert(Account::new(user_id, user_id, STARTING_BALANCE_CENTS));
    }
}

fn bad_request(message: &str) -> axum::response::Response {
    (axum::http::StatusCode::BAD_REQUEST, message.to_string()).into_response()
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_session(socket, state))
}

async fn ws_session(mut socket: WebSocket, state: Arc<AppState>) {
    let mut rx = state.broadcast_tx.subscribe();
    loop {
        match rx.recv().await {
            Ok(envelope) => {
                let Ok(text) = serde_json::to_string(&envelope) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "ws session lagged, dropping buffered frames");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paper_arcade_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
