use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// One-packet ICMP echo against a host. A pure reachability signal,
/// independent of discovery: it answers "is anything there" without
/// touching the control-plane program or the credential.
pub async fn probe_host(host: &str, wait: Duration) -> bool {
    let wait_secs = wait.as_secs().max(1).to_string();

    let status = Command::new("ping")
        .args(["-c", "1", "-W", &wait_secs])
        .arg(host)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    // ping -W bounds the echo wait; the outer deadline covers resolver
    // stalls and a wedged binary.
    match tokio::time::timeout(wait + Duration::from_secs(2), status).await {
        Ok(Ok(exit)) => exit.success(),
        Ok(Err(e)) => {
            debug!("probe of {} failed to spawn ping: {}", host, e);
            false
        }
        Err(_) => {
            debug!("probe of {} timed out", host);
            false
        }
    }
}
