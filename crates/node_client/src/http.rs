use l2_sync_types::{BlockHeader, BlockLogs, BlockNumber, L2Block, Snapshot, TreeId};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::client::{LogKind, NodeClient};
use crate::error::NodeClientError;

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u32,
    method: &'static str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Talks to a real remote node over JSON-RPC. One request per `NodeClient` call; retries on
/// transient failure are the caller's responsibility (the synchronizer's serial queue and
/// ticker already provide that at a coarser grain).
pub struct HttpNodeClient {
    client: Client,
    endpoint: Url,
}

impl HttpNodeClient {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value, NodeClientError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 0,
            method,
            params,
        };
        tracing::debug!(method, "calling node");
        let response: JsonRpcResponse = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(NodeClientError::MalformedResponse(format!(
                "node returned error {}: {}",
                error.code, error.message
            )));
        }
        response
            .result
            .ok_or_else(|| NodeClientError::MalformedResponse(format!("{method} returned no result")))
    }
}

#[async_trait::async_trait]
impl NodeClient for HttpNodeClient {
    async fn get_block_number(&self) -> Result<BlockNumber, NodeClientError> {
        let value = self.call("getBlockNumber", json!([])).await?;
        let number: u64 = serde_json::from_value(value)
            .map_err(|e| NodeClientError::MalformedResponse(e.to_string()))?;
        Ok(BlockNumber::new(number))
    }

    async fn get_block_header(&self) -> Result<BlockHeader, NodeClientError> {
        let value = self.call("getBlockHeader", json!([])).await?;
        serde_json::from_value(value).map_err(|e| NodeClientError::MalformedResponse(e.to_string()))
    }

    async fn get_blocks(&self, from: BlockNumber, limit: u32) -> Result<Vec<L2Block>, NodeClientError> {
        let value = self.call("getBlocks", json!([from.0, limit])).await?;
        serde_json::from_value(value).map_err(|e| NodeClientError::MalformedResponse(e.to_string()))
    }

    async fn get_logs(
        &self,
        from: BlockNumber,
        limit: u32,
        kind: LogKind,
    ) -> Result<Vec<BlockLogs>, NodeClientError> {
        let kind_str = match kind {
            LogKind::Encrypted => "encrypted",
            LogKind::Unencrypted => "unencrypted",
        };
        let value = self
            .call("getLogs", json!([from.0, limit, kind_str]))
            .await?;
        serde_json::from_value(value).map_err(|e| NodeClientError::MalformedResponse(e.to_string()))
    }

    async fn find_leaf_index(
        &self,
        snapshot: Snapshot,
        tree_id: TreeId,
        leaf: [u8; 32],
    ) -> Result<Option<u64>, NodeClientError> {
        let snapshot_param = match snapshot {
            Snapshot::Latest => json!("latest"),
            Snapshot::AtBlock(block) => json!(block.0),
        };
        let tree_param = match tree_id {
            TreeId::NoteHash => "note_hash",
            TreeId::Nullifier => "nullifier",
            TreeId::Contract => "contract",
            TreeId::L1ToL2Messages => "l1_to_l2_messages",
            TreeId::Archive => "archive",
            TreeId::PublicData => "public_data",
        };
        let value = self
            .call(
                "findLeafIndex",
                json!([snapshot_param, tree_param, hex::encode(leaf)]),
            )
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        let index: u64 = serde_json::from_value(value)
            .map_err(|e| NodeClientError::MalformedResponse(e.to_string()))?;
        Ok(Some(index))
    }
}
