//! Wire codec: JSON <-> [`Event`] and outbound subscribe/unsubscribe frames.

use serde_json::Value;

use crate::error::ErrorKind;
use crate::types::{
    Channel, Event, Ohlc, OrderBook, PriceLevel, Side, SubscriptionAck, Ticker, Trade,
};

fn get_str(obj: &Value, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn get_f64(obj: &Value, key: &str) -> f64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn get_i64(obj: &Value, key: &str) -> i64 {
    obj.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn get_i32(obj: &Value, key: &str) -> i32 {
    obj.get(key).and_then(Value::as_i64).unwrap_or(0) as i32
}

fn parse_ticker(data: &Value, symbol: &str) -> Ticker {
    Ticker {
        symbol: symbol.to_string(),
        bid: get_f64(data, "bid"),
        ask: get_f64(data, "ask"),
        last: get_f64(data, "last"),
        volume_24h: get_f64(data, "volume"),
        high_24h: get_f64(data, "high"),
        low_24h: get_f64(data, "low"),
        timestamp: get_str(data, "timestamp"),
    }
}

fn parse_trade(data: &Value, symbol: &str) -> Trade {
    let side = get_str(data, "side");
    Trade {
        symbol: symbol.to_string(),
        price: get_f64(data, "price"),
        quantity: get_f64(data, "qty"),
        side: if side == "sell" { Side::Sell } else { Side::Buy },
        timestamp: get_str(data, "timestamp"),
    }
}

fn parse_levels(arr: &Value) -> Vec<PriceLevel> {
    let Some(arr) = arr.as_array() else {
        return Vec::new();
    };
    arr.iter()
        .filter(|item| item.is_object())
        .map(|item| PriceLevel {
            price: get_f64(item, "price"),
            quantity: get_f64(item, "qty"),
        })
        .collect()
}

struct ParsedBook {
    book: OrderBook,
    checksum: Option<u32>,
}

fn parse_book(data: &Value, symbol: &str) -> ParsedBook {
    let bids = data.get("bids").map(parse_levels).unwrap_or_default();
    let asks = data.get("asks").map(parse_levels).unwrap_or_default();
    let checksum = data.get("checksum").and_then(Value::as_u64).map(|c| c as u32);

    ParsedBook {
        book: OrderBook {
            symbol: symbol.to_string(),
            bids,
            asks,
            is_valid: true,
            checksum: checksum.unwrap_or(0),
        },
        checksum,
    }
}

/// `true` for a full-replacement snapshot, `false` for an incremental update.
/// The server signals this via a top-level `type` field; absence defaults to
/// `update` since the first message for a new symbol is always a snapshot in
/// practice and any ambiguity should merge rather than silently drop levels.
fn is_book_snapshot(doc: &Value) -> bool {
    get_str(doc, "type") == "snapshot"
}

fn parse_ohlc(data: &Value, symbol: &str) -> Ohlc {
    Ohlc {
        symbol: symbol.to_string(),
        open: get_f64(data, "open"),
        high: get_f64(data, "high"),
        low: get_f64(data, "low"),
        close: get_f64(data, "close"),
        volume: get_f64(data, "volume"),
        timestamp: get_i64(data, "timestamp"),
        interval: get_i32(data, "interval"),
    }
}

/// Sequence number extracted alongside the event, if the message carried one.
pub struct Decoded {
    pub event: Event,
    pub sequence: Option<u64>,
    /// Set only for `Event::Book` — the exchange-supplied checksum to
    /// validate the rendered book against, independent from decoding.
    pub book_checksum: Option<u32>,
    /// Set only for `Event::Book` — whether this message is a full snapshot
    /// (replace the ladder) or an incremental update (merge into it).
    pub book_is_snapshot: bool,
}

fn decoded(event: Event) -> Decoded {
    Decoded {
        event,
        sequence: None,
        book_checksum: None,
        book_is_snapshot: false,
    }
}

/// Decodes one raw WebSocket text frame into an [`Event`]. Never fails:
/// unparseable or unrecognized frames surface as `Event::Error` /
/// `Event::Heartbeat` rather than an `Err`, matching the "never drops the
/// connection over a single bad frame" design of the reconnect loop.
pub fn parse_message(raw_json: &str) -> Decoded {
    let doc: Value = match serde_json::from_str(raw_json) {
        Ok(v) => v,
        Err(_) => {
            return decoded(Event::Error(
                ErrorKind::ParseError,
                format!("failed to parse JSON: {raw_json}"),
            ));
        }
    };

    let method = get_str(&doc, "method");
    let channel_str = get_str(&doc, "channel");

    if method == "subscribe" || method == "unsubscribe" {
        let success = doc.get("success").and_then(Value::as_bool);
        return match success {
            Some(true) => {
                let ack = SubscriptionAck {
                    channel: get_str(&doc, "channel"),
                    symbols: doc
                        .get("symbol")
                        .and_then(Value::as_array)
                        .map(|a| {
                            a.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                };
                if method == "subscribe" {
                    decoded(Event::Subscribed(ack))
                } else {
                    decoded(Event::Unsubscribed(ack))
                }
            }
            Some(false) => {
                let message = doc
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("subscription failed")
                    .to_string();
                decoded(Event::Error(ErrorKind::InvalidSymbol, message))
            }
            None => decoded(Event::Heartbeat),
        };
    }

    if channel_str == "heartbeat" {
        return decoded(Event::Heartbeat);
    }

    let Some(data_arr) = doc.get("data").and_then(Value::as_array) else {
        return decoded(Event::Heartbeat);
    };
    let Some(data) = data_arr.first() else {
        return decoded(Event::Heartbeat);
    };

    let symbol = get_str(data, "symbol");
    let sequence = doc.get("sequence").and_then(Value::as_u64);

    let (event, book_checksum, book_is_snapshot) = match Channel::from_str(&channel_str) {
        Some(Channel::Ticker) => (Event::Ticker(parse_ticker(data, &symbol)), None, false),
        Some(Channel::Trade) => (Event::Trade(parse_trade(data, &symbol)), None, false),
        Some(Channel::Book) => {
            let parsed = parse_book(data, &symbol);
            (Event::Book(parsed.book), parsed.checksum, is_book_snapshot(&doc))
        }
        Some(Channel::Ohlc) => (Event::Ohlc(parse_ohlc(data, &symbol)), None, false),
        _ => (Event::Heartbeat, None, false),
    };

    Decoded {
        event,
        sequence,
        book_checksum,
        book_is_snapshot,
    }
}

fn build_subscription_message(
    method: &str,
    channel: Channel,
    symbols: &[String],
    depth: u32,
    auth_token: Option<&str>,
) -> String {
    let mut params = serde_json::Map::new();
    params.insert("channel".to_string(), Value::String(channel.as_str().to_string()));
    params.insert(
        "symbol".to_string(),
        Value::Array(symbols.iter().cloned().map(Value::String).collect()),
    );

    if method == "subscribe" && matches!(channel, Channel::Book) && depth > 0 {
        params.insert("depth".to_string(), Value::Number(depth.into()));
    }

    if channel.is_private() {
        if let Some(token) = auth_token {
            params.insert("token".to_string(), Value::String(token.to_string()));
        }
    }

    let msg = serde_json::json!({
        "method": method,
        "params": params,
    });
    msg.to_string()
}

pub fn build_subscribe_message(
    channel: Channel,
    symbols: &[String],
    depth: u32,
    auth_token: Option<&str>,
) -> String {
    build_subscription_message("subscribe", channel, symbols, depth, auth_token)
}

pub fn build_unsubscribe_message(
    channel: Channel,
    symbols: &[String],
    auth_token: Option<&str>,
) -> String {
    build_subscription_message("unsubscribe", channel, symbols, 0, auth_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ticker_message() {
        let raw = r#"{"channel":"ticker","data":[{"symbol":"BTC/USD","bid":50000.0,"ask":50010.0,"last":50005.0,"volume":100.0,"high":51000.0,"low":49000.0,"timestamp":"2024-01-01T00:00:00Z"}]}"#;
        let decoded = parse_message(raw);
        match decoded.event {
            Event::Ticker(t) => {
                assert_eq!(t.symbol, "BTC/USD");
                assert_eq!(t.bid, 50000.0);
            }
            other => panic!("expected Ticker, got {other:?}"),
        }
    }

    #[test]
    fn parses_book_with_checksum() {
        let raw = r#"{"channel":"book","type":"snapshot","data":[{"symbol":"BTC/USD","bids":[{"price":100.0,"qty":1.0}],"asks":[{"price":101.0,"qty":1.0}],"checksum":123}]}"#;
        let decoded = parse_message(raw);
        assert_eq!(decoded.book_checksum, Some(123));
        assert!(decoded.book_is_snapshot);
        match decoded.event {
            Event::Book(b) => assert_eq!(b.bids.len(), 1),
            other => panic!("expected Book, got {other:?}"),
        }
    }

    #[test]
    fn book_update_type_is_not_treated_as_snapshot() {
        let raw = r#"{"channel":"book","type":"update","data":[{"symbol":"BTC/USD","bids":[{"price":100.0,"qty":1.0}],"asks":[]}]}"#;
        let decoded = parse_message(raw);
        assert!(!decoded.book_is_snapshot);
    }

    #[test]
    fn heartbeat_channel_recognized() {
        let raw = r#"{"channel":"heartbeat"}"#;
        assert!(matches!(parse_message(raw).event, Event::Heartbeat));
    }

    #[test]
    fn unparseable_json_yields_error_event() {
        let decoded = parse_message("not json");
        match decoded.event {
            Event::Error(ErrorKind::ParseError, _) => {}
            other => panic!("expected ParseError, got {other:?}"),
        }
    }

    #[test]
    fn empty_data_array_falls_back_to_heartbeat() {
        let raw = r#"{"channel":"ticker","data":[]}"#;
        assert!(matches!(parse_message(raw).event, Event::Heartbeat));
    }

    #[test]
    fn subscribe_success_yields_subscribed_ack() {
        let raw = r#"{"method":"subscribe","success":true,"channel":"ticker","symbol":["BTC/USD"]}"#;
        match parse_message(raw).event {
            Event::Subscribed(ack) => {
                assert_eq!(ack.channel, "ticker");
                assert_eq!(ack.symbols, vec!["BTC/USD".to_string()]);
            }
            other => panic!("expected Subscribed, got {other:?}"),
        }
    }

    #[test]
    fn subscribe_failure_yields_invalid_symbol_error() {
        let raw = r#"{"method":"subscribe","success":false,"error":"bad symbol"}"#;
        match parse_message(raw).event {
            Event::Error(ErrorKind::InvalidSymbol, msg) => assert_eq!(msg, "bad symbol"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn build_subscribe_message_includes_depth_for_book_only() {
        let msg = build_subscribe_message(
            Channel::Book,
            &["BTC/USD".to_string()],
            10,
            None,
        );
        let parsed: Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["method"], "subscribe");
        assert_eq!(parsed["params"]["depth"], 10);

        let msg = build_subscribe_message(Channel::Ticker, &["BTC/USD".to_string()], 10, None);
        let parsed: Value = serde_json::from_str(&msg).unwrap();
        assert!(parsed["params"].get("depth").is_none());
    }

    #[test]
    fn build_subscribe_message_includes_token_for_private_channels() {
        let msg = build_subscribe_message(
            Channel::OwnTrades,
            &["BTC/USD".to_string()],
            0,
            Some("secret-token"),
        );
        let parsed: Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["params"]["token"], "secret-token");
    }

    #[test]
    fn build_unsubscribe_message_never_includes_depth() {
        let msg = build_unsubscribe_message(Channel::Book, &["BTC/USD".to_string()], None);
        let parsed: Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["method"], "unsubscribe");
        assert!(parsed["params"].get("depth").is_none());
    }
}
