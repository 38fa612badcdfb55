use futures::future::FutureExt;
use rpcprims_events::{listen, BoxError, Event};
use rpcprims_server::{Channel, SendRequest};
use serde_json::Value;
use tracing::debug;

use crate::cmd::{parse_duration, parse_endpoint, CallArgs};
use crate::exit::{server_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_replies, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let requests = parse_requests(&args.json)?;
    let headers = parse_headers(&args.headers)?;
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

    let mut channel = Channel::new(endpoint);
    if !headers.is_empty() {
        listen(channel.events_mut(), move |mut event: Event<SendRequest>| {
            for (key, value) in &headers {
                event.payload_mut().insert(key.clone(), value.clone());
            }
            async move { Ok::<_, BoxError>(event) }.boxed()
        });
    }

    debug!(method = %args.method, requests = requests.len(), ?timeout, "calling");
    // A single request is a unary call: ending without a reply is an error.
    let replies: Vec<Value> = match requests.as_slice() {
        [request] => channel
            .unary(&args.method, request, timeout)
            .await
            .map(|reply| vec![reply]),
        _ => channel.stream(&args.method, &requests, timeout).await,
    }
    .map_err(|err| server_error("call failed", err))?;

    print_replies(
        &args.method,
        &channel.endpoint().to_string(),
        &replies,
        format,
    );
    Ok(SUCCESS)
}

fn parse_requests(raw: &[String]) -> CliResult<Vec<Value>> {
    raw.iter()
        .map(|json| {
            serde_json::from_str(json)
                .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))
        })
        .collect()
}

fn parse_headers(raw: &[String]) -> CliResult<Vec<(String, String)>> {
    raw.iter()
        .map(|header| match header.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(CliError::new(
                USAGE,
                format!("--header must be KEY=VALUE, got {header:?}"),
            )),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_must_be_json() {
        let ok = parse_requests(&["{\"a\":1}".to_string(), "\"b\"".to_string()]).unwrap();
        assert_eq!(ok, [serde_json::json!({"a": 1}), serde_json::json!("b")]);

        let err = parse_requests(&["{nope".to_string()]).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn headers_split_on_first_equals() {
        let headers = parse_headers(&["x-token=a=b".to_string()]).unwrap();
        assert_eq!(headers, [("x-token".to_string(), "a=b".to_string())]);
        assert!(parse_headers(&["=v".to_string()]).is_err());
        assert!(parse_headers(&["novalue".to_string()]).is_err());
    }
}
