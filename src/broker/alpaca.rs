// Alpaca-style REST broker client

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    Account, Bar, BarsQuery, Broker, BrokerError, BrokerOrderStatus, BrokerResult,
    LimitOrderRequest, Order, OrderSide, Position,
};
use crate::config::ApiConfig;

const KEY_HEADER: &str = "APCA-API-KEY-ID";
const SECRET_HEADER: &str = "APCA-API-SECRET-KEY";

#[derive(Debug, Clone)]
pub struct AlpacaClient {
    http: reqwest::Client,
    key_id: String,
    secret_key: String,
    base_url: String,
    data_url: String,
}

impl AlpacaClient {
    pub fn new(api: &ApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            key_id: api.key_id.clone(),
            secret_key: api.secret_key.clone(),
            base_url: api.base_url.trim_end_matches('/').to_string(),
            data_url: api.data_url.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(KEY_HEADER, &self.key_id)
            .header(SECRET_HEADER, &self.secret_key)
    }

    /// Map a non-success HTTP response onto the typed error taxonomy.
    async fn error_for_status(response: reqwest::Response) -> BrokerError {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return BrokerError::RateLimited { retry_after };
        }

        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 | 403 => BrokerError::Auth(body),
            404 => BrokerError::NotFound(body),
            400 | 422 => BrokerError::Rejected(body),
            _ => BrokerError::Transient(format!("HTTP {}: {}", status, body)),
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> BrokerResult<reqwest::Response> {
        let response = builder.send().await.map_err(map_reqwest_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::error_for_status(response).await)
        }
    }

    async fn json_body(response: reqwest::Response) -> BrokerResult<Value> {
        response
            .json::<Value>()
            .await
            .map_err(|e| BrokerError::Decode(e.to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> BrokerError {
    if err.is_timeout() || err.is_connect() {
        BrokerError::Transient(err.to_string())
    } else if err.is_decode() {
        BrokerError::Decode(err.to_string())
    } else {
        BrokerError::Transient(err.to_string())
    }
}

/// Numbers arrive as either JSON numbers or decimal strings.
fn parse_num(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn parse_order(value: &Value) -> BrokerResult<Order> {
    let id = value["id"]
        .as_str()
        .ok_or_else(|| BrokerError::Decode("order missing id".to_string()))?
        .to_string();

    let symbol = value["symbol"].as_str().unwrap_or_default().to_string();

    let side = match value["side"].as_str() {
        Some("sell") => OrderSide::Sell,
        _ => OrderSide::Buy,
    };

    let status = serde_json::from_value::<BrokerOrderStatus>(value["status"].clone())
        .unwrap_or(BrokerOrderStatus::Unknown);

    Ok(Order {
        id,
        client_order_id: value["client_order_id"].as_str().map(|s| s.to_string()),
        symbol,
        side,
        status,
        qty: parse_num(&value["qty"]).unwrap_or(0.0),
        limit_price: parse_num(&value["limit_price"]),
        filled_qty: parse_num(&value["filled_qty"]).unwrap_or(0.0),
        filled_avg_price: parse_num(&value["filled_avg_price"]),
    })
}

fn parse_bar(value: &Value) -> BrokerResult<Bar> {
    let timestamp = value["t"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| BrokerError::Decode("bar missing timestamp".to_string()))?;

    Ok(Bar {
        timestamp,
        open: parse_num(&value["o"]).unwrap_or(0.0),
        high: parse_num(&value["h"]).unwrap_or(0.0),
        low: parse_num(&value["l"]).unwrap_or(0.0),
        close: parse_num(&value["c"]).unwrap_or(0.0),
        volume: parse_num(&value["v"]).unwrap_or(0.0),
    })
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl Broker for AlpacaClient {
    async fn place_limit_order(&self, request: &LimitOrderRequest) -> BrokerResult<Order> {
        let url = format!("{}/v2/orders", self.base_url);
        let body = json!({
            "symbol": request.symbol,
            "qty": request.qty.to_string(),
            "side": request.side.as_str(),
            "type": "limit",
            "limit_price": request.limit_price.to_string(),
            "time_in_force": request.time_in_force.as_str(),
            "client_order_id": request.client_order_id,
        });

        let response = self
            .send(self.request(reqwest::Method::POST, url).json(&body))
            .await?;
        let order = parse_order(&Self::json_body(response).await?)?;

        info!(
            symbol = %request.symbol,
            side = request.side.as_str(),
            qty = request.qty,
            limit_price = request.limit_price,
            order_id = %order.id,
            client_order_id = %request.client_order_id,
            "limit order placed"
        );

        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> BrokerResult<()> {
        let url = format!("{}/v2/orders/{}", self.base_url, order_id);
        self.send(self.request(reqwest::Method::DELETE, url))
            .await?;
        debug!(order_id, "order cancelled");
        Ok(())
    }

    async fn get_open_orders(&self, symbol: &str) -> BrokerResult<Vec<Order>> {
        let url = format!(
            "{}/v2/orders?status=open&symbols={}&limit=500",
            self.base_url, symbol
        );
        let response = self.send(self.request(reqwest::Method::GET, url)).await?;
        let value = Self::json_body(response).await?;

        let entries = value
            .as_array()
            .ok_or_else(|| BrokerError::Decode("expected order array".to_string()))?;
        entries.iter().map(parse_order).collect()
    }

    async fn get_order(&self, order_id: &str) -> BrokerResult<Order> {
        let url = format!("{}/v2/orders/{}", self.base_url, order_id);
        let response = self.send(self.request(reqwest::Method::GET, url)).await?;
        parse_order(&Self::json_body(response).await?)
    }

    async fn get_positions(&self) -> BrokerResult<Vec<Position>> {
        let url = format!("{}/v2/positions", self.base_url);
        let response = self.send(self.request(reqwest::Method::GET, url)).await?;
        let value = Self::json_body(response).await?;

        let entries = value
            .as_array()
            .ok_or_else(|| BrokerError::Decode("expected position array".to_string()))?;

        entries
            .iter()
            .map(|p| {
                Ok(Position {
                    symbol: p["symbol"].as_str().unwrap_or_default().to_string(),
                    qty: parse_num(&p["qty"]).unwrap_or(0.0),
                    market_value: parse_num(&p["market_value"]).unwrap_or(0.0),
                })
            })
            .collect()
    }

    async fn close_position(&self, symbol: &str) -> BrokerResult<()> {
        let url = format!("{}/v2/positions/{}", self.base_url, symbol);
        self.send(self.request(reqwest::Method::DELETE, url))
            .await?;
        info!(symbol, "position closed");
        Ok(())
    }

    async fn get_account(&self) -> BrokerResult<Account> {
        let url = format!("{}/v2/account", self.base_url);
        let response = self.send(self.request(reqwest::Method::GET, url)).await?;
        let value = Self::json_body(response).await?;

        Ok(Account {
            portfolio_value: parse_num(&value["portfolio_value"]).unwrap_or(0.0),
            cash: parse_num(&value["cash"]).unwrap_or(0.0),
        })
    }

    async fn get_bars(&self, query: &BarsQuery) -> BrokerResult<Vec<Bar>> {
        // Crypto symbols carry a slash ("BTC/USD"); stocks do not.
        let is_crypto = query.symbol.contains('/');

        let url = if is_crypto {
            format!(
                "{}/v1beta3/crypto/us/bars?symbols={}&timeframe={}&start={}&end={}&limit={}",
                self.data_url,
                query.symbol,
                query.timeframe,
                rfc3339(query.start),
                rfc3339(query.end),
                query.limit
            )
        } else {
            format!(
                "{}/v2/stocks/{}/bars?timeframe={}&start={}&end={}&limit={}&feed=iex",
                self.data_url,
                query.symbol,
                query.timeframe,
                rfc3339(query.start),
                rfc3339(query.end),
                query.limit
            )
        };

        let response = self.send(self.request(reqwest::Method::GET, url)).await?;
        let value = Self::json_body(response).await?;

        let bars = if is_crypto {
            value["bars"][&query.symbol].as_array().cloned()
        } else {
            value["bars"].as_array().cloned()
        };

        match bars {
            Some(entries) => entries.iter().map(parse_bar).collect(),
            None => Ok(Vec::new()),
        }
    }
}
