//! Stream URL construction.

use url::form_urlencoded;

/// Path of the code-worker log stream, relative to the backend base URL
pub const STREAM_PATH: &str = "/logs/code-worker/stream";

/// Builds `{base}/logs/code-worker/stream[?jobId=<id>]`.
///
/// Trailing slashes on the base URL are dropped and a blank job id adds no
/// query. Blank base URLs must be rejected by the caller.
pub fn build_stream_url(base_url: &str, job_id: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let endpoint = format!("{}{}", base, STREAM_PATH);

    let job_id = job_id.trim();
    if job_id.is_empty() {
        return endpoint;
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("jobId", job_id)
        .finish();

    format!("{}?{}", endpoint, query)
}
