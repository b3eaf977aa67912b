use url::Url;

use super::error::Result;
use super::params::{decode_parameter, AuraParams};
use super::types::CapturedRequest;

/// Renders captured requests as multi-line cURL commands.
///
/// Header order is fixed. When the body carries the standard Aura `message`
/// parameter, the parameters are emitted decoded: `message` as `--data-raw`
/// and `aura.context`, `aura.pageURI`, `aura.token` as `--data-urlencode`
/// (cURL re-encodes those). Any other body is passed through raw.
pub struct CurlSynthesizer {
    params: AuraParams,
}

impl CurlSynthesizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            params: AuraParams::compile()?,
        })
    }

    pub fn synthesize(&self, record: &CapturedRequest, credential: &str) -> String {
        let mut args: Vec<String> = vec![
            format!("curl '{}'", record.url),
            format!("-X {}", record.method),
            header("Accept", "application/json"),
            header(
                "Content-Type",
                "application/x-www-form-urlencoded; charset=UTF-8",
            ),
            header("Origin", &origin_of(record)),
            header("Referer", &record.referer),
            header("User-Agent", &record.user_agent),
            header("Accept-Language", &record.accept_language),
            header("Cache-Control", "no-cache"),
            header("Pragma", "no-cache"),
            header("Cookie", credential),
        ];

        let raw = self.params.extract(&record.body);
        match raw.message {
            Some(message) => {
                args.push(format!("--data-raw '{}'", decode_parameter(message)));
                for pair in [raw.context, raw.page_uri, raw.token].into_iter().flatten() {
                    args.push(format!("--data-urlencode '{}'", decode_parameter(pair)));
                }
            }
            None => {
                args.push(format!("--data-raw '{}'", escape_single_quotes(&record.body)));
            }
        }

        args.join(" \\\n  ")
    }
}

/// Render `record` with a one-off synthesizer.
pub fn synthesize(record: &CapturedRequest, credential: &str) -> Result<String> {
    Ok(CurlSynthesizer::new()?.synthesize(record, credential))
}

fn header(name: &str, value: &str) -> String {
    format!("-H '{name}: {value}'")
}

/// Close the quote, emit an escaped quote, reopen.
fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', r"'\''")
}

/// Origin of the request URL, falling back to the referer's.
fn origin_of(record: &CapturedRequest) -> String {
    Url::parse(&record.url)
        .or_else(|_| Url::parse(&record.referer))
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_else(|_| "null".to_string())
}
