mod config;
mod ledger;
mod session;
mod utils;
mod wallet;

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::SessionConfig;
use crate::ledger::{Address, GatewayLedgerClient};
use crate::session::{CANDIDATE_COUNT, Notification, SessionController, SessionState};
use crate::wallet::{LocalWallet, WalletProvider};

/// A line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
	Vote(usize),
	Declare,
	Reset,
	Withdraw,
	Owner(String),
	Destroy,
	History,
	Account(String),
	Disconnect,
	Dismiss(u64),
	Status,
	Quit,
}

impl Command {
	fn parse(line: &str) -> Result<Self, String> {
		let mut parts = line.split_whitespace();
		let verb = parts.next().ok_or_else(|| "empty command".to_string())?;
		let arg = parts.next();

		let command = match (verb, arg) {
			("vote", Some(n)) => Command::Vote(
				n.parse()
					.map_err(|_| format!("candidate must be 0..{}", CANDIDATE_COUNT))?,
			),
			("declare", None) => Command::Declare,
			("reset", None) => Command::Reset,
			("withdraw", None) => Command::Withdraw,
			("owner", Some(address)) => Command::Owner(address.to_string()),
			("destroy", None) => Command::Destroy,
			("history", None) => Command::History,
			("account", Some(address)) => Command::Account(address.to_string()),
			("disconnect", None) => Command::Disconnect,
			("status", None) => Command::Status,
			("dismiss", Some(id)) => {
				Command::Dismiss(id.parse().map_err(|_| "notification id must be a number")?)
			}
			("quit" | "exit", None) => Command::Quit,
			_ => return Err(format!("unknown command: {}", line.trim())),
		};
		Ok(command)
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting ballot session");

	let config = match SessionConfig::load() {
		Ok(config) => config,
		Err(e) => {
			error!("Failed to load configuration: {}", e);
			return;
		}
	};

	let contract_address = match Address::parse(&config.contract_address) {
		Ok(address) => address,
		Err(e) => {
			error!("Invalid contract address {:?}: {}", config.contract_address, e);
			return;
		}
	};

	let ledger = match GatewayLedgerClient::new(
		config.gateway_http_url.clone(),
		config.gateway_ws_url.clone(),
		contract_address,
		config.request_timeout(),
	) {
		Ok(client) => Arc::new(client),
		Err(e) => {
			error!("Failed to create gateway client: {}", e);
			return;
		}
	};

	info!("Created gateway client for {}", config.gateway_http_url);

	let local_wallet = config
		.wallet_enabled
		.then(|| Arc::new(LocalWallet::new(config.wallet_accounts())));
	let wallet = local_wallet
		.clone()
		.map(|wallet| wallet as Arc<dyn WalletProvider>);

	let controller = SessionController::new(ledger, wallet, &config);
	let view = tokio::spawn(render(
		controller.subscribe(),
		controller.notifications().subscribe(),
		config.clone(),
	));

	controller.initialize().await;

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		let line = tokio::select! {
			line = lines.next_line() => line,
			_ = tokio::signal::ctrl_c() => {
				info!("Interrupted");
				break;
			}
		};

		let line = match line {
			Ok(Some(line)) if line.trim().is_empty() => continue,
			Ok(Some(line)) => line,
			Ok(None) => break,
			Err(e) => {
				error!("Failed to read input: {}", e);
				break;
			}
		};

		let command = match Command::parse(&line) {
			Ok(command) => command,
			Err(e) => {
				warn!("{}", e);
				continue;
			}
		};

		match command {
			Command::Vote(candidate) => controller.cast_vote(candidate).await,
			Command::Declare => controller.declare_winner().await,
			Command::Reset => controller.reset_vote().await,
			Command::Withdraw => controller.withdraw().await,
			Command::Owner(address) => controller.change_owner(&address).await,
			Command::Destroy => controller.destroy_contract().await,
			Command::History => controller.refresh_history().await,
			Command::Account(address) => match (&local_wallet, Address::parse(&address)) {
				(Some(wallet), Ok(account)) => wallet.switch_account(account),
				(None, _) => warn!("No wallet provider installed"),
				(_, Err(e)) => warn!("Invalid account {}: {}", address, e),
			},
			Command::Disconnect => match &local_wallet {
				Some(wallet) => wallet.disconnect(),
				None => warn!("No wallet provider installed"),
			},
			Command::Dismiss(id) => controller.dismiss_notification(id),
			Command::Status => log_status(&controller, &config),
			Command::Quit => break,
		}
	}

	view.abort();
	info!("Ballot session stopped");
}

/// Log every snapshot and notification change until both sources close.
async fn render(
	mut state: watch::Receiver<SessionState>,
	mut notifications: watch::Receiver<Vec<Notification>>,
	config: SessionConfig,
) {
	loop {
		tokio::select! {
			changed = state.changed() => {
				if changed.is_err() {
					break;
				}
				let snapshot = state.borrow_and_update().clone();
				log_snapshot(&snapshot, &config);
			}
			changed = notifications.changed() => {
				if changed.is_err() {
					break;
				}
				for notification in notifications.borrow_and_update().iter() {
					info!("[notification {}] {}", notification.id, notification.message);
				}
			}
		}
	}
}

/// Print the full session on demand, including notifications still on screen.
fn log_status(controller: &SessionController, config: &SessionConfig) {
	info!(
		"connection={:?} lifecycle={:?}",
		controller.connection(),
		controller.lifecycle()
	);
	log_snapshot(&controller.state(), config);

	let notifications = controller.notifications();
	if notifications.is_empty() {
		info!("No notifications");
		return;
	}
	info!("{} notification(s):", notifications.len());
	for notification in notifications.snapshot() {
		info!(
			"[notification {} at {}] {}",
			notification.id,
			notification.created_at.format("%H:%M:%S"),
			notification.message
		);
	}
}

fn log_snapshot(snapshot: &SessionState, config: &SessionConfig) {
	let tallies: Vec<String> = snapshot
		.vote_counts
		.iter()
		.enumerate()
		.map(|(i, count)| format!("{}#{}={}", config.candidate_name(i), i, count))
		.collect();

	info!(
		"account={} connection={:?} manager={} balance={} ETH open={} remaining={} can_vote={} tallies=[{}] destroyed={}",
		snapshot
			.current_account
			.as_ref()
			.map(ToString::to_string)
			.unwrap_or_else(|| "-".to_string()),
		snapshot.connection,
		snapshot
			.project_manager
			.as_ref()
			.map(ToString::to_string)
			.unwrap_or_else(|| "-".to_string()),
		snapshot.balance_ether(),
		snapshot.voting_open,
		snapshot
			.votes_remaining
			.map(|r| r.to_string())
			.unwrap_or_else(|| "-".to_string()),
		snapshot.can_vote(),
		tallies.join(", "),
		snapshot.is_destroyed,
	);

	if let Some(round) = snapshot.latest_round() {
		info!(
			"Last round {}: {} with {} votes",
			round.round_number, round.winning_proposal_name, round.winning_vote_count
		);
	}
	if !snapshot.message.is_empty() {
		info!("{}", snapshot.message);
	}
}
