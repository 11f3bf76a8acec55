//! Shell reproductions of webhook calls, for pasting from logs.

use reqwest::header::HeaderMap;
use url::Url;

/// Builds a `curl` invocation equivalent to a webhook POST.
pub fn curl_command(url: &Url, headers: &HeaderMap, body: &str) -> String {
    let mut command = format!("curl -sS -X POST {}", shell_quote(url.as_str()));
    for (name, value) in headers {
        let header = format!(
            "{}: {}",
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes())
        );
        command.push_str(" -H ");
        command.push_str(&shell_quote(&header));
    }
    command.push_str(" --data-raw ");
    command.push_str(&shell_quote(body));
    command
}

// POSIX single quoting: nothing is special inside '...' except the quote itself.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
