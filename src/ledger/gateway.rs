//!
//! GraphQL client for the voting contract gateway.
//!
//! The gateway fronts the deployed contract: queries map one-to-one onto contract view
//! functions, the `submit` mutation sends a write and resolves once it has settled, and
//! the `contractEvents` subscription streams `VoteCast` / `winner` events over
//! `graphql-transport-ws`. Idempotent reads are retried with exponential backoff on
//! transport failures; writes are never retried.

use super::client::{LedgerClient, LedgerEventStream};
use super::types::*;
use backoff::{ExponentialBackoff, future::retry};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tokio_tungstenite::{
	connect_async,
	tungstenite::{Message, client::IntoClientRequest},
};
use tracing::{debug, error, info, warn};

/// Upper bound on how long a single read keeps retrying transport failures.
const READ_RETRY_WINDOW: Duration = Duration::from_secs(10);

/// Voting contract gateway client
#[derive(Clone)]
pub struct GatewayLedgerClient {
	/// The underlying HTTP client for GraphQL queries and mutations.
	http_client: Client,
	/// The gateway GraphQL HTTP endpoint.
	http_url: String,
	/// The WebSocket URL for the event subscription.
	ws_url: String,
	/// Address of the deployed voting contract.
	contract_address: Address,
}

impl GatewayLedgerClient {
	/// Create a new gateway client.
	///
	/// # Arguments
	/// * `http_url` - The HTTP endpoint for GraphQL queries.
	/// * `ws_url` - The WebSocket endpoint for subscriptions.
	/// * `contract_address` - The deployed voting contract.
	/// * `timeout` - Per-request timeout; a write that does not settle in time fails with `Timeout`.
	pub fn new(
		http_url: String,
		ws_url: String,
		contract_address: Address,
		timeout: Duration,
	) -> Result<Self, LedgerError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			http_url,
			ws_url,
			contract_address,
		})
	}

	/// Run a read-only query, retrying transport failures.
	async fn read<T: DeserializeOwned>(
		&self,
		field: &str,
		query: &str,
		variables: serde_json::Value,
	) -> Result<T, LedgerError> {
		let policy = ExponentialBackoff {
			max_elapsed_time: Some(READ_RETRY_WINDOW),
			..ExponentialBackoff::default()
		};

		let response = retry(policy, || async {
			self.execute_query(query, Some(variables.clone()))
				.await
				.map_err(|e| match e {
					LedgerError::HttpError(_) => {
						debug!("Transient gateway failure reading {}: {}", field, e);
						backoff::Error::transient(e)
					}
					other => backoff::Error::permanent(other),
				})
		})
		.await?;

		let value = response
			.get("data")
			.and_then(|data| data.get(field))
			.ok_or(LedgerError::NoData)?;

		Ok(serde_json::from_value(value.clone())?)
	}

	/// Execute a GraphQL query or mutation.
	///
	/// # Returns
	/// The JSON response from the gateway, or a `LedgerError` if the request fails.
	pub async fn execute_query(
		&self,
		query: &str,
		variables: Option<serde_json::Value>,
	) -> Result<serde_json::Value, LedgerError> {
		let request_body = json!({
			"query": query,
			"variables": variables
		});

		let response = self
			.http_client
			.post(&self.http_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await
			.map_err(|e| {
				if e.is_timeout() {
					LedgerError::Timeout
				} else {
					LedgerError::HttpError(e)
				}
			})?;

		if !response.status().is_success() {
			return Err(LedgerError::GraphQLError(format!(
				"HTTP error: {}",
				response.status()
			)));
		}

		let response_json: serde_json::Value = response.json().await?;

		if let Some(errors) = response_json.get("errors") {
			return Err(LedgerError::GraphQLError(format!(
				"GraphQL errors: {}",
				errors
			)));
		}

		Ok(response_json)
	}
}

#[async_trait::async_trait]
impl LedgerClient for GatewayLedgerClient {
	async fn project_manager(&self) -> Result<Address, LedgerError> {
		self.read(
			"projectManager",
			"query ProjectManager($contract: String!) { projectManager(contract: $contract) }",
			json!({ "contract": self.contract_address.as_str() }),
		)
		.await
	}

	async fn balance(&self) -> Result<Wei, LedgerError> {
		// Balances exceed the JSON number range, so the gateway sends decimal strings.
		let raw: String = self
			.read(
				"balance",
				"query Balance($address: String!) { balance(address: $address) }",
				json!({ "address": self.contract_address.as_str() }),
			)
			.await?;

		raw.parse::<Wei>()
			.map_err(|e| LedgerError::GraphQLError(format!("Invalid balance '{}': {}", raw, e)))
	}

	async fn user_votes(&self, account: &Address) -> Result<u32, LedgerError> {
		self.read(
			"userVotes",
			"query UserVotes($contract: String!, $account: String!) { userVotes(contract: $contract, account: $account) }",
			json!({ "contract": self.contract_address.as_str(), "account": account.as_str() }),
		)
		.await
	}

	async fn vote_count(&self, candidate: usize) -> Result<u64, LedgerError> {
		self.read(
			"voteCount",
			"query VoteCount($contract: String!, $index: Int!) { voteCount(contract: $contract, index: $index) }",
			json!({ "contract": self.contract_address.as_str(), "index": candidate }),
		)
		.await
	}

	async fn voting_open(&self) -> Result<bool, LedgerError> {
		self.read(
			"votingOpen",
			"query VotingOpen($contract: String!) { votingOpen(contract: $contract) }",
			json!({ "contract": self.contract_address.as_str() }),
		)
		.await
	}

	async fn recent_results(&self) -> Result<RecentResults, LedgerError> {
		self.read(
			"recentResults",
			r#"
            query RecentResults($contract: String!) {
                recentResults(contract: $contract) {
                    roundNumbers
                    winningNames
                    winningCounts
                }
            }
            "#,
			json!({ "contract": self.contract_address.as_str() }),
		)
		.await
	}

	async fn submit(&self, call: LedgerCall, options: TxOptions) -> Result<TxReceipt, LedgerError> {
		info!(
			"Submitting {} from {:?} with value {:?}",
			call.method_name(),
			options.from.as_ref().map(Address::as_str),
			options.value
		);

		let mutation = r#"
            mutation Submit($contract: String!, $method: String!, $args: [JSON!]!, $from: String, $value: String) {
                submit(contract: $contract, method: $method, args: $args, from: $from, value: $value) {
                    hash
                    status
                    reason
                }
            }
        "#;

		let variables = json!({
			"contract": self.contract_address.as_str(),
			"method": call.method_name(),
			"args": call.args(),
			"from": options.from.as_ref().map(Address::as_str),
			"value": options.value.map(|v| v.to_string()),
		});

		let response = self.execute_query(mutation, Some(variables)).await?;
		let receipt: TxReceipt = serde_json::from_value(
			response
				.get("data")
				.and_then(|data| data.get("submit"))
				.cloned()
				.ok_or(LedgerError::NoData)?,
		)?;

		let reason = receipt
			.reason
			.clone()
			.unwrap_or_else(|| format!("transaction {}", receipt.hash));
		match receipt.status {
			TxStatus::Success => {
				info!("{} settled in {}", call.method_name(), receipt.hash);
				Ok(receipt)
			}
			TxStatus::Reverted => Err(LedgerError::Reverted(reason)),
			TxStatus::Rejected => Err(LedgerError::Rejected(reason)),
		}
	}

	async fn subscribe_events(&self) -> Result<LedgerEventStream, LedgerError> {
		debug!("Attempting WebSocket connection to: {}", self.ws_url);

		// Create WebSocket request with required subprotocol
		let mut request = self.ws_url.clone().into_client_request()?;
		request.headers_mut().insert(
			"Sec-WebSocket-Protocol",
			"graphql-transport-ws".parse().map_err(|_| {
				LedgerError::GraphQLError("Invalid WebSocket subprotocol header value".to_string())
			})?,
		);

		let (ws_stream, response) = connect_async(request).await?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();

		ws_sender
			.send(Message::Text(json!({ "type": "connection_init" }).to_string()))
			.await?;

		// Wait for connection ack
		match ws_receiver.next().await {
			Some(msg) => match msg? {
				Message::Text(text) => {
					let parsed: serde_json::Value = serde_json::from_str(&text)?;
					if parsed.get("type").and_then(|t| t.as_str()) != Some("connection_ack") {
						return Err(LedgerError::SessionError(
							"Connection not acknowledged".to_string(),
						));
					}
				}
				_ => {
					return Err(LedgerError::SessionError(
						"Unexpected message type during handshake".to_string(),
					));
				}
			},
			None => {
				return Err(LedgerError::SessionError(
					"Connection closed during handshake".to_string(),
				));
			}
		}

		let subscription_query = r#"
            subscription ContractEvents($contract: String!) {
                contractEvents(contract: $contract) {
                    __typename
                    ... on VoteCast {
                        voter
                        proposalIndex
                    }
                    ... on Winner {
                        winnerName
                    }
                }
            }
        "#;

		let subscription_id = format!("contract-events-{:08x}", rand::random::<u32>());
		let start_message = json!({
			"id": subscription_id,
			"type": "subscribe",
			"payload": {
				"query": subscription_query,
				"variables": { "contract": self.contract_address.as_str() }
			}
		});

		ws_sender
			.send(Message::Text(start_message.to_string()))
			.await?;

		info!(
			"Subscribed to contract events for {} ({})",
			self.contract_address, subscription_id
		);

		let stream = ws_receiver.filter_map(|msg| async move {
			match msg {
				Ok(Message::Text(text)) => parse_subscription_message(&text),
				Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
				Ok(Message::Close(frame)) => {
					warn!("Contract event subscription closed: {:?}", frame);
					None
				}
				Ok(_) => Some(Err(LedgerError::GraphQLError(
					"Unexpected message type".to_string(),
				))),
				Err(e) => {
					error!("Contract event subscription error: {}", e);
					Some(Err(LedgerError::WebSocketError(e)))
				}
			}
		});

		Ok(Box::pin(stream))
	}
}

/// Decode one `graphql-transport-ws` frame into a contract event.
///
/// Returns `None` for frames that carry no event (keep-alives, completion).
fn parse_subscription_message(text: &str) -> Option<Result<LedgerEvent, LedgerError>> {
	let parsed = match serde_json::from_str::<serde_json::Value>(text) {
		Ok(parsed) => parsed,
		Err(e) => return Some(Err(LedgerError::JsonError(e))),
	};

	let Some(msg_type) = parsed.get("type").and_then(|t| t.as_str()) else {
		return Some(Err(LedgerError::GraphQLError(
			"Message missing type field".to_string(),
		)));
	};

	match msg_type {
		"next" => {
			let Some(event) = parsed
				.get("payload")
				.and_then(|p| p.get("data"))
				.and_then(|d| d.get("contractEvents"))
			else {
				return Some(Err(LedgerError::NoData));
			};
			debug!("Raw contract event: {}", event);
			Some(serde_json::from_value(event.clone()).map_err(LedgerError::from))
		}
		"error" => {
			let error_msg = parsed
				.get("payload")
				.and_then(|p| p.as_array())
				.and_then(|errors| errors.first())
				.and_then(|e| e.get("message"))
				.and_then(|m| m.as_str())
				.unwrap_or("Unknown subscription error");
			Some(Err(LedgerError::GraphQLError(error_msg.to_string())))
		}
		"complete" => {
			info!("Contract event subscription completed");
			None
		}
		_ => {
			debug!("Ignoring message type: {}", msg_type);
			None
		}
	}
}
