use crate::operation::Operation;
use crate::transport::ApiClient;

pub const STDERR_MARKER: &str = "STDERR:";

/// Gathers the recorded stdout/stderr of a finished operation.
///
/// Recorded output paths from the operation metadata are tried first; the
/// `/operations/<id>/logs/*` endpoints are only consulted when those yield
/// nothing. Individual stream failures are dropped so partial output still
/// reaches the caller. Returns an empty string when nothing could be read.
pub(crate) fn collect(api: &ApiClient, operation: &Operation) -> String {
    let paths = operation.output_paths();
    let mut segments = Vec::new();
    if !paths.is_empty() {
        append_stream_segments(
            &mut segments,
            paths.stdout.as_deref().and_then(|path| fetch_stream(api, path)),
            paths.stderr.as_deref().and_then(|path| fetch_stream(api, path)),
        );
    }

    if segments.is_empty() {
        let logs = api.api_path(&format!("operations/{}/logs", operation.id));
        append_stream_segments(
            &mut segments,
            fetch_stream(api, &format!("{logs}/stdout")),
            fetch_stream(api, &format!("{logs}/stderr")),
        );
    }

    segments.join("\n")
}

fn fetch_stream(api: &ApiClient, path: &str) -> Option<String> {
    match api.get_text(path) {
        Ok(text) => Some(text),
        Err(error) => {
            tracing::debug!(path = path, error = %error, "lxd output stream unavailable");
            None
        }
    }
}

/// Stdout counts whenever it was fetched, even empty; stderr only when non-blank.
pub(crate) fn append_stream_segments(
    segments: &mut Vec<String>,
    stdout: Option<String>,
    stderr: Option<String>,
) {
    if let Some(stdout) = stdout {
        segments.push(stdout);
    }
    if let Some(stderr) = stderr {
        if !stderr.trim().is_empty() {
            segments.push(format!("{STDERR_MARKER} {stderr}"));
        }
    }
}
