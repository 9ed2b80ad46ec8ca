//! Node invocation and TLS material.
//!
//! The TLS directory is laid out as:
//!
//! ```text
//! <tls>/server/{ca.crt, server.crt, server.key}   passed to the node
//! <tls>/client/{ca.crt, client.pem, client.key}   handed to API consumers
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use nl_protocol::config_models::LauncherConfig;
use nl_protocol::node_models::{FaultInjection, TlsConfig};

use crate::error::{NodeError, NodeResult};
use crate::process::ProcessController;

/// Command line of the node for one spawn.
///
/// Faults are appended as `--fault-injection <name>`, one pair per fault.
pub fn node_args(config: &LauncherConfig, faults: &BTreeSet<FaultInjection>) -> Vec<String> {
    let server = config.tls_path.join("server");
    let mut args = vec![
        "--network".to_string(),
        config.network.clone(),
        "--tlsca".to_string(),
        path_arg(&server.join("ca.crt")),
        "--tlscert".to_string(),
        path_arg(&server.join("server.crt")),
        "--tlskey".to_string(),
        path_arg(&server.join("server.key")),
        "--logs-prefix".to_string(),
        path_arg(&config.logs_prefix),
    ];

    if let Some(port) = config.api_port {
        args.push("--wallet-address".to_string());
        args.push(format!("127.0.0.1:{port}"));
    }

    args.extend(config.extra_args.iter().cloned());

    for fault in faults {
        args.push("--fault-injection".to_string());
        args.push(fault.as_str().to_string());
    }

    args
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Read and validate the client TLS material for a node listening on `port`.
///
/// # Errors
///
/// - `NodeError::Process` if a file cannot be read
/// - `NodeError::Protocol` if a file is not valid PEM
pub async fn load_tls_config(
    controller: &dyn ProcessController,
    tls_path: &Path,
    port: u16,
) -> NodeResult<TlsConfig> {
    let client = tls_path.join("client");
    let ca = controller.read_file(&client.join("ca.crt")).await?;
    let cert = controller.read_file(&client.join("client.pem")).await?;
    let key = controller.read_file(&client.join("client.key")).await?;

    require_certificate(&ca, "ca.crt")?;
    require_certificate(&cert, "client.pem")?;
    require_private_key(&key, "client.key")?;

    Ok(TlsConfig {
        port,
        ca,
        cert,
        key,
    })
}

fn require_certificate(pem: &[u8], name: &str) -> NodeResult<()> {
    let mut reader = pem;
    let mut count = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        cert.map_err(|e| NodeError::Protocol(format!("invalid certificate in {name}: {e}")))?;
        count += 1;
    }
    if count == 0 {
        return Err(NodeError::Protocol(format!("no certificate found in {name}")));
    }
    Ok(())
}

fn require_private_key(pem: &[u8], name: &str) -> NodeResult<()> {
    let mut reader = pem;
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(NodeError::Protocol(format!("no private key found in {name}"))),
        Err(e) => Err(NodeError::Protocol(format!(
            "invalid private key in {name}: {e}"
        ))),
    }
}
