use anyhow::anyhow;
use std::error::Error as StdError;
use std::io::ErrorKind;

/// Walks the source chain looking for an io error of `kind`, or failing that
/// a message containing `needle` (hyper and rustls often wrap the io error
/// in a string).
fn error_chain_matches(err: &(dyn StdError + 'static), kind: ErrorKind, needle: &str) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if source
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io_err| io_err.kind() == kind)
        {
            return true;
        }
        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }
        current = source.source();
    }
    false
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::TimedOut, "timed out")
}

fn is_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::ConnectionRefused, "connection refused")
}

pub(crate) fn model_api_request_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> anyhow::Error {
    if err.is_timeout() || is_timeout(&err) {
        return anyhow!(
            "No reply from '{}' within {}s. Raise MODEL_TIMEOUT_SECS or retry later.",
            api_url,
            timeout_secs
        );
    }

    if err.is_connect() {
        let reason = if is_connection_refused(&err) {
            "connection refused"
        } else {
            "could not connect"
        };
        return anyhow!(
            "Cannot reach the model API at '{}' ({}). Check OPENAI_BASE_URL and your network.",
            api_url,
            reason
        );
    }

    anyhow!("Model API call to '{}' failed: {}", api_url, err)
}
