use kraken_stream_rs::{Channel, ClientConfig, Runtime};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let url = std::env::var("KRAKEN_WS_URL").unwrap_or_else(|_| "wss://ws.kraken.com/v2".to_string());
    let symbol = std::env::var("KRAKEN_SYMBOL").unwrap_or_else(|_| "BTC/USD".to_string());

    let config = ClientConfig::new(url);
    let runtime = Runtime::new(config);

    runtime.on_book(|book| {
        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            tracing::info!(
                symbol = %book.symbol,
                bid = bid.price,
                ask = ask.price,
                mid = book.mid_price(),
                valid = book.is_valid,
                "book"
            );
        }
    });

    runtime.on_ticker(|t| {
        tracing::info!(symbol = %t.symbol, last = t.last, spread = t.spread(), "ticker");
    });

    runtime.on_error(|kind, message| {
        tracing::error!(?kind, message, "stream error");
    });

    runtime.on_reconnect(|attempt, delay, reason| {
        tracing::warn!(attempt, ?delay, reason, "reconnecting");
    });

    // Subscription handles unsubscribe on drop, so keep them alive for the
    // lifetime of the process.
    let _book_sub = runtime.subscribe(Channel::Book, vec![symbol.clone()], 10);
    let _ticker_sub = runtime.subscribe(Channel::Ticker, vec![symbol], 0);

    if let Err(e) = runtime.run() {
        tracing::error!(error = %e, "runtime exited with error");
        std::process::exit(1);
    }
}
