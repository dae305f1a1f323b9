//! `warden call`

use super::supervisor_for;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use warden_core::config::WardenConfig;
use warden_core::error::{WardenError, WardenResult};

pub struct CallArgs {
    pub server: String,
    pub method: String,
    pub params: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Connect one server, send one request, print the result
pub async fn call(config: &WardenConfig, args: CallArgs) -> WardenResult<()> {
    let entry = config.mcp.servers.get(&args.server).ok_or_else(|| {
        WardenError::invalid_input(format!("no server named '{}' is configured", args.server))
    })?;
    let server_config = entry.to_server_config()?;
    let params = parse_params(args.params.as_deref())?;

    let supervisor = supervisor_for(config, false)?;
    let outcome = async {
        supervisor.connect(&args.server, server_config).await?;
        debug!(server = %args.server, method = %args.method, "sending request");
        match args.timeout_ms {
            Some(ms) => {
                let timeout = Duration::from_millis(ms);
                supervisor
                    .request_with_timeout(&args.server, &args.method, params, timeout)
                    .await
            }
            None => supervisor.request(&args.server, &args.method, params).await,
        }
    }
    .await;
    supervisor.cleanup().await;

    let result = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn parse_params(raw: Option<&str>) -> WardenResult<Option<Value>> {
    raw.map(|raw| {
        serde_json::from_str(raw)
            .map_err(|e| WardenError::invalid_input(format!("--params is not valid JSON: {}", e)))
    })
    .transpose()
}
