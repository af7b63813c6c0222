use std::{collections::HashMap, fmt};

use futures::{Stream, StreamExt};
use log::{debug, error, info};
use thiserror::Error;
use tonic::{codegen::InterceptedService, transport::Channel, Status, Streaming};
use yellowstone_grpc_proto::{
    geyser::{geyser_client::GeyserClient, SubscribeRequestFilterTransactions},
    prelude::{
        subscribe_update::UpdateOneof, CommitmentLevel, SubscribeRequest, SubscribeUpdate,
        SubscribeUpdateTransaction,
    },
};

use crate::{
    token_authenticator::{create_grpc_channel, GeyserConnectionError, XTokenInterceptor},
    GeyserMonitorError,
};

pub type AuthenticatedGeyserClient = GeyserClient<InterceptedService<Channel, XTokenInterceptor>>;

/// Target address plus the flag differences between the wallet-monitor and
/// pool-monitor deployments.
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub address: String,
    pub exclude_failed: bool,
    pub exclude_vote: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("update is missing transaction info")]
    MissingTransactionInfo,
    #[error("transaction info is missing the transaction body")]
    MissingTransaction,
    #[error("transaction has an empty signatures list")]
    EmptySignatures,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSummary {
    pub slot: u64,
    pub signature: String,
    pub first_signature: String,
}

impl fmt::Display for TransactionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slot={} signature={} first_signature={}",
            self.slot, self.signature, self.first_signature
        )
    }
}

/// Outcome of classifying a single inbound update.
#[derive(Debug, PartialEq, Eq)]
pub enum UpdateKind {
    Ping,
    Transaction(Result<TransactionSummary, DecodeError>),
    Other,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub transactions: u64,
    pub decode_failures: u64,
    pub pings: u64,
    pub others: u64,
}

impl fmt::Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transactions, {} decode failures, {} pings, {} other updates",
            self.transactions, self.decode_failures, self.pings, self.others
        )
    }
}

fn decode_transaction(update: SubscribeUpdateTransaction) -> Result<TransactionSummary, DecodeError> {
    let info = update
        .transaction
        .ok_or(DecodeError::MissingTransactionInfo)?;
    let signature = bs58::encode(&info.signature).into_string();
    let transaction = info.transaction.ok_or(DecodeError::MissingTransaction)?;
    let first = transaction
        .signatures
        .first()
        .ok_or(DecodeError::EmptySignatures)?;
    Ok(TransactionSummary {
        slot: update.slot,
        signature,
        first_signature: bs58::encode(first).into_string(),
    })
}

/// Classifies one update. Decode failures are captured per message so a
/// malformed update never tears down the stream.
pub fn handle_update(update: SubscribeUpdate) -> UpdateKind {
    match update.update_oneof {
        Some(UpdateOneof::Ping(_)) => UpdateKind::Ping,
        Some(UpdateOneof::Transaction(txn)) => UpdateKind::Transaction(decode_transaction(txn)),
        Some(_) | None => UpdateKind::Other,
    }
}

/// Drains the subscription stream in arrival order, one message at a time.
/// Returns on natural stream end; a stream-level status error is propagated.
pub async fn process_stream<S>(
    mut updates: S,
    stats: &mut StreamStats,
) -> Result<(), GeyserMonitorError>
where
    S: Stream<Item = Result<SubscribeUpdate, Status>> + Unpin,
{
    while let Some(update) = updates.next().await {
        match handle_update(update?) {
            UpdateKind::Ping => {
                stats.pings += 1;
                info!("ignoring keep-alive ping");
            }
            UpdateKind::Transaction(Ok(summary)) => {
                stats.transactions += 1;
                println!("{summary}");
            }
            UpdateKind::Transaction(Err(err)) => {
                stats.decode_failures += 1;
                println!("error: {err}");
            }
            UpdateKind::Other => {
                stats.others += 1;
                debug!("ignoring non-transaction update");
            }
        }
    }
    Ok(())
}

pub struct GeyserMonitor {
    endpoint: String,
    interceptor: XTokenInterceptor,
    filter: TransactionFilter,
}

impl GeyserMonitor {
    /// Strips any scheme prefix off the endpoint and validates credentials.
    pub fn new(
        endpoint: &str,
        token: &str,
        filter: TransactionFilter,
    ) -> Result<Self, GeyserConnectionError> {
        let endpoint = endpoint
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .to_string();
        if endpoint.is_empty() {
            return Err(GeyserConnectionError::EmptyEndpoint);
        }
        let interceptor = XTokenInterceptor::new(token)?;
        Ok(Self {
            endpoint,
            interceptor,
            filter,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn connect(&self) -> Result<AuthenticatedGeyserClient, GeyserMonitorError> {
        let channel = create_grpc_channel(&self.endpoint).await?;
        Ok(GeyserClient::with_interceptor(
            channel,
            self.interceptor.clone(),
        ))
    }

    /// One request, one filter named "all" over the target address. The
    /// request stream is one-shot: after this the client only reads.
    pub fn build_subscribe_request(&self) -> SubscribeRequest {
        let mut transactions = HashMap::new();
        transactions.insert(
            "all".to_owned(),
            SubscribeRequestFilterTransactions {
                failed: self.filter.exclude_failed.then_some(false),
                vote: self.filter.exclude_vote.then_some(false),
                account_include: vec![self.filter.address.clone()],
                ..Default::default()
            },
        );
        SubscribeRequest {
            transactions,
            commitment: Some(CommitmentLevel::Confirmed as i32),
            ..Default::default()
        }
    }

    pub async fn subscribe(
        &self,
        client: &mut AuthenticatedGeyserClient,
    ) -> Result<Streaming<SubscribeUpdate>, GeyserMonitorError> {
        let requests = futures::stream::iter(vec![self.build_subscribe_request()]);
        let response = client.subscribe(tonic::Request::new(requests)).await?;
        Ok(response.into_inner())
    }

    /// Runs one monitoring session to completion: connect, subscribe, drain.
    /// The channel is released on every exit path; a stream error terminates
    /// the session after cleanup, with no reconnect.
    pub async fn run(&self) -> Result<(), GeyserMonitorError> {
        let mut client = self.connect().await?;
        info!("connected to {}", self.endpoint);
        let stream = self.subscribe(&mut client).await?;
        info!("subscribed, watching {}", self.filter.address);

        let mut stats = StreamStats::default();
        let result = tokio::select! {
            res = process_stream(stream, &mut stats) => res,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                Ok(())
            }
        };
        if let Err(err) = &result {
            error!("stream terminated: {err}");
        }
        drop(client);
        info!("channel closed, session saw {stats}");
        result
    }
}
