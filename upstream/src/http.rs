//! HTTP client for a node's REST API and Tendermint RPC.

use async_trait::async_trait;
use cmon_types::{DataSources, RoundStep};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, warn};

use crate::source::{
    ActiveValidator, ChainSource, RoundVoteRecord, StakingPage, StakingValidator,
    ValidatorSetPage,
};
use crate::UpstreamError;

const API_ENDPOINT_VALIDATORS: &str = "/cosmos/staking/v1beta1/validators";
const RPC_ENDPOINT_VALIDATORS: &str = "/validators";
const RPC_ENDPOINT_ABCI_INFO: &str = "/abci_info";
const RPC_ENDPOINT_BLOCK: &str = "/block";
const RPC_ENDPOINT_CONSENSUS: &str = "/consensus_state";

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// First delay between retries of an unreachable endpoint; doubles each attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Settings for [`HttpChainSource`].
#[derive(Clone, Debug)]
pub struct HttpSourceConfig {
    /// REST API base URL (staking registry).
    pub api_url: String,
    /// Tendermint RPC base URL.
    pub rpc_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Extra attempts after a connect failure or timeout.
    pub retries: u32,
}

/// [`ChainSource`] backed by `reqwest`.
pub struct HttpChainSource {
    api_url: String,
    rpc_url: String,
    retries: u32,
    http_client: reqwest::Client,
}

impl HttpChainSource {
    pub fn new(config: HttpSourceConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(config.timeout))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "HTTP client build failed, falling back to one without timeouts");
                reqwest::Client::new()
            });
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            rpc_url: config.rpc_url.trim_end_matches('/').to_string(),
            retries: config.retries,
            http_client,
        }
    }

    /// GET `url` and decode the JSON body, retrying unreachable endpoints.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 0;
        loop {
            match self.try_get_json(url, query).await {
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(url, attempt, error = %e, "retrying upstream request");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                other => return other,
            }
        }
    }

    async fn try_get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        debug!(url, "upstream GET");
        let response = self
            .http_client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Unreachable(format!("request timed out: {e}"))
                } else if e.is_connect() {
                    UpstreamError::Unreachable(format!("connection failed: {e}"))
                } else {
                    UpstreamError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(format!("{url}: {e}")))
    }

    fn rpc(&self, endpoint: &str) -> String {
        format!("{}{}", self.rpc_url, endpoint)
    }
}

#[async_trait]
impl ChainSource for HttpChainSource {
    async fn staking_validators(
        &self,
        page_key: Option<&str>,
    ) -> Result<StakingPage, UpstreamError> {
        let url = format!("{}{}", self.api_url, API_ENDPOINT_VALIDATORS);
        let query: Vec<(&str, String)> = page_key
            .map(|k| vec![("pagination.key", k.to_string())])
            .unwrap_or_default();
        let response: StakingValidatorsResponse = self.get_json(&url, &query).await?;
        Ok(response.into_page())
    }

    async fn active_validators(&self, page: u32) -> Result<ValidatorSetPage, UpstreamError> {
        let response: RpcResponse<ValidatorsResult> = self
            .get_json(&self.rpc(RPC_ENDPOINT_VALIDATORS), &[("page", page.to_string())])
            .await?;
        Ok(response.result.into_page())
    }

    async fn node_version(&self) -> Result<String, UpstreamError> {
        let response: RpcResponse<AbciInfoResult> =
            self.get_json(&self.rpc(RPC_ENDPOINT_ABCI_INFO), &[]).await?;
        Ok(response.result.response.version)
    }

    async fn block_height(&self) -> Result<u64, UpstreamError> {
        let response: RpcResponse<BlockResult> =
            self.get_json(&self.rpc(RPC_ENDPOINT_BLOCK), &[]).await?;
        Ok(response.result.block.header.height)
    }

    async fn round_vote_record(&self) -> Result<RoundVoteRecord, UpstreamError> {
        let response: RpcResponse<ConsensusStateResult> =
            self.get_json(&self.rpc(RPC_ENDPOINT_CONSENSUS), &[]).await?;
        response.result.round_state.into_record()
    }

    fn data_sources(&self) -> DataSources {
        DataSources {
            api: self.api_url.clone(),
            rpc: self.rpc_url.clone(),
        }
    }
}

// ── Wire formats ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct StakingValidatorsResponse {
    validators: Vec<StakingValidatorJson>,
    #[serde(default)]
    pagination: Option<PaginationJson>,
}

#[derive(Debug, Deserialize)]
struct StakingValidatorJson {
    consensus_pubkey: PubKeyJson,
    description: DescriptionJson,
}

#[derive(Debug, Deserialize)]
struct PubKeyJson {
    key: String,
}

#[derive(Debug, Deserialize)]
struct DescriptionJson {
    moniker: String,
}

#[derive(Debug, Deserialize)]
struct PaginationJson {
    #[serde(default)]
    next_key: Option<String>,
}

impl StakingValidatorsResponse {
    fn into_page(self) -> StakingPage {
        let next_key = self
            .pagination
            .and_then(|p| p.next_key)
            .filter(|k| !k.is_empty());
        StakingPage {
            validators: self
                .validators
                .into_iter()
                .map(|v| StakingValidator {
                    consensus_pubkey: v.consensus_pubkey.key,
                    moniker: v.description.moniker,
                })
                .collect(),
            next_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValidatorsResult {
    validators: Vec<ValidatorJson>,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    count: u64,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ValidatorJson {
    address: String,
    pub_key: ValidatorPubKeyJson,
}

#[derive(Debug, Deserialize)]
struct ValidatorPubKeyJson {
    value: String,
}

impl ValidatorsResult {
    fn into_page(self) -> ValidatorSetPage {
        ValidatorSetPage {
            validators: self
                .validators
                .into_iter()
                .map(|v| ActiveValidator {
                    address: v.address,
                    pub_key: v.pub_key.value,
                })
                .collect(),
            count: self.count,
            total: self.total,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AbciInfoResult {
    response: AbciInfoResponse,
}

#[derive(Debug, Deserialize)]
struct AbciInfoResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct BlockResult {
    block: BlockJson,
}

#[derive(Debug, Deserialize)]
struct BlockJson {
    header: HeaderJson,
}

#[derive(Debug, Deserialize)]
struct HeaderJson {
    #[serde(deserialize_with = "u64_from_str_or_num")]
    height: u64,
}

#[derive(Debug, Deserialize)]
struct ConsensusStateResult {
    round_state: RoundStateJson,
}

#[derive(Debug, Deserialize)]
struct RoundStateJson {
    #[serde(rename = "height/round/step", default)]
    height_round_step: Option<String>,
    #[serde(default)]
    height_vote_set: Vec<HeightVoteSetJson>,
}

#[derive(Debug, Deserialize)]
struct HeightVoteSetJson {
    #[serde(default)]
    round: u32,
    prevotes: Vec<Option<String>>,
    prevotes_bit_array: String,
    precommits: Vec<Option<String>>,
    precommits_bit_array: String,
}

impl RoundStateJson {
    fn into_record(self) -> Result<RoundVoteRecord, UpstreamError> {
        let step = self.height_round_step.as_deref().and_then(parse_step_status);
        let first = self
            .height_vote_set
            .into_iter()
            .next()
            .ok_or(UpstreamError::MissingField("round_state.height_vote_set[0]"))?;
        Ok(RoundVoteRecord {
            step,
            round: first.round,
            prevotes: first.prevotes,
            prevotes_bit_array: first.prevotes_bit_array,
            precommits: first.precommits,
            precommits_bit_array: first.precommits_bit_array,
        })
    }
}

/// Decode the step out of a `height/round/step` status such as `"1234/0/4"`.
pub(crate) fn parse_step_status(status: &str) -> Option<RoundStep> {
    let step = status.split('/').nth(2)?;
    RoundStep::from_step_number(step.trim().parse().ok()?)
}

/// Tendermint renders 64-bit integers as JSON strings.
fn u64_from_str_or_num<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(u64),
    }
    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Num(n) => Ok(n),
        StrOrNum::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
